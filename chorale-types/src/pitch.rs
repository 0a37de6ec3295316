//! Pitch math for allocation and intonation scoring.
//!
//! All pitch conversion and distance functions live here — pure
//! functions, no audio dependencies. Note numbers follow the MIDI
//! convention (69 = A4) but are `f64` throughout because detected
//! pitch is continuous.

/// Standard concert pitch reference for A4 (MIDI 69).
pub const A4_HZ: f64 = 440.0;

/// Standard 12-TET conversion at A4 = 440 Hz.
pub fn note_to_hz(note: f64) -> f64 {
    note_to_hz_a4(note, A4_HZ)
}

/// 12-TET conversion with an explicit A4 reference.
pub fn note_to_hz_a4(note: f64, tuning_a4: f64) -> f64 {
    tuning_a4 * 2.0_f64.powf((note - 69.0) / 12.0)
}

/// Inverse 12-TET conversion: frequency to fractional note number.
/// `hz` must be positive.
pub fn hz_to_note(hz: f64) -> f64 {
    hz_to_note_a4(hz, A4_HZ)
}

/// Inverse 12-TET conversion with an explicit A4 reference.
pub fn hz_to_note_a4(hz: f64, tuning_a4: f64) -> f64 {
    69.0 + 12.0 * (hz / tuning_a4).log2()
}

/// Octave-folded chroma distance between a reference note and a
/// detected (possibly fractional) note, in semitones.
///
/// The reference is folded toward the detected pitch in octave steps
/// as long as each step strictly reduces the distance, so octave
/// errors cost nothing and only pitch-class deviation is measured.
/// The result is at most 6 semitones.
pub fn chroma_distance(reference: f64, detected: f64) -> f64 {
    let mut best = (reference - detected).abs();
    let step = if reference > detected { -12.0 } else { 12.0 };
    let mut folded = reference;
    while (step < 0.0 && folded > detected) || (step > 0.0 && folded < detected) {
        folded += step;
        let diff = (folded - detected).abs();
        if diff < best {
            best = diff;
        } else {
            break;
        }
    }
    best
}

/// Map a folded distance (semitones, >= 0) to a normalized error.
///
/// Deviations within a semitone are penalized sub-linearly; beyond a
/// semitone the error grows linearly, reaching 1.0 only at a residual
/// distance of a full octave. Since `chroma_distance` caps its result
/// at a tritone, the practical ceiling is error(6) ≈ 0.8636.
pub fn intonation_error(distance: f64) -> f64 {
    if distance < 1.0 {
        0.75 * distance.powf(1.2)
    } else {
        0.75 + 0.25 * ((distance - 1.0) / 11.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_is_440() {
        assert!((note_to_hz(69.0) - 440.0).abs() < 1e-10);
    }

    #[test]
    fn octave_doubles() {
        assert!((note_to_hz(81.0) - 880.0).abs() < 1e-6);
    }

    #[test]
    fn middle_c() {
        assert!((note_to_hz(60.0) - 261.6256).abs() < 0.001);
    }

    #[test]
    fn custom_tuning_a4() {
        assert!((note_to_hz_a4(69.0, 432.0) - 432.0).abs() < 1e-10);
    }

    #[test]
    fn hz_round_trip() {
        for note in [40.0, 60.0, 69.0, 72.5, 100.0] {
            let back = hz_to_note(note_to_hz(note));
            assert!((back - note).abs() < 1e-9, "note {} came back as {}", note, back);
        }
    }

    #[test]
    fn chroma_octave_is_free() {
        assert_eq!(chroma_distance(60.0, 72.0), 0.0);
        assert_eq!(chroma_distance(60.0, 48.0), 0.0);
        assert_eq!(chroma_distance(60.0, 96.0), 0.0);
    }

    #[test]
    fn chroma_semitone() {
        assert!((chroma_distance(60.0, 61.0) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn chroma_tritone_is_maximal() {
        assert!((chroma_distance(60.0, 66.0) - 6.0).abs() < 1e-10);
    }

    #[test]
    fn chroma_folds_the_shorter_way() {
        // 60 -> 67 is 7 semitones up but only 5 down from the octave above
        assert!((chroma_distance(60.0, 67.0) - 5.0).abs() < 1e-10);
    }

    #[test]
    fn chroma_fractional_inputs() {
        let d = chroma_distance(60.0, 72.4);
        assert!((d - 0.4).abs() < 1e-9);
        let d = chroma_distance(60.0, 59.5);
        assert!((d - 0.5).abs() < 1e-9);
    }

    #[test]
    fn chroma_is_symmetric_in_direction() {
        // Folding works whether the reference is above or below
        assert!((chroma_distance(72.0, 60.0) - 0.0).abs() < 1e-10);
        assert!((chroma_distance(67.0, 60.0) - 5.0).abs() < 1e-10);
    }

    #[test]
    fn error_zero_at_zero() {
        assert_eq!(intonation_error(0.0), 0.0);
    }

    #[test]
    fn error_knee_at_semitone() {
        assert!((intonation_error(1.0) - 0.75).abs() < 1e-10);
    }

    #[test]
    fn error_at_tritone() {
        assert!((intonation_error(6.0) - 0.8636).abs() < 1e-3);
    }

    #[test]
    fn error_strictly_increasing() {
        let mut prev = intonation_error(0.0);
        let mut v = 0.05;
        while v <= 6.0 {
            let e = intonation_error(v);
            assert!(e > prev, "error not increasing at {}", v);
            prev = e;
            v += 0.05;
        }
    }
}
