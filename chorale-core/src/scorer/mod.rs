//! Intonation scoring: compares each slot's reference pitch against the
//! live-detected pitch and accumulates bounded error samples over a
//! measure.
//!
//! The scorer owns per-slot reference notes and measure accumulators but
//! performs no I/O; the caller forwards its realtime and per-measure
//! vectors to the network layer.

use chorale_types::pitch::{chroma_distance, intonation_error};

/// Seam to the external pitch detector.
pub trait PitchSource {
    /// Latest detector estimate for a slot as a fractional MIDI note
    /// number, or `None` when the input is silent or untracked.
    fn detected_note(&self, slot: usize) -> Option<f64>;
}

pub struct IntonationScorer {
    /// Reference note per slot; `None` means the slot is silent and
    /// contributes no samples.
    references: Vec<Option<u8>>,
    /// Error samples collected since the last measure boundary.
    measure: Vec<Vec<f64>>,
}

impl IntonationScorer {
    pub fn new(voices: usize) -> Self {
        Self {
            references: vec![None; voices],
            measure: vec![Vec::new(); voices],
        }
    }

    pub fn voice_count(&self) -> usize {
        self.references.len()
    }

    pub fn set_reference(&mut self, slot: usize, note: Option<u8>) {
        if let Some(reference) = self.references.get_mut(slot) {
            *reference = note;
        }
    }

    /// Refresh all references at once from the allocator's assignments.
    pub fn set_references(&mut self, notes: &[Option<u8>]) {
        for (slot, note) in notes.iter().enumerate().take(self.references.len()) {
            self.references[slot] = *note;
        }
    }

    /// One realtime sampling pass. For each slot with a sounding
    /// reference and an available detector estimate, computes the
    /// folded-distance error, appends it to the measure accumulator,
    /// and includes it in the returned vector. Silent slots are omitted.
    pub fn tick(&mut self, detector: &dyn PitchSource) -> Vec<(usize, f64)> {
        let mut errors = Vec::new();
        for slot in 0..self.references.len() {
            let Some(reference) = self.references[slot] else {
                continue;
            };
            let Some(detected) = detector.detected_note(slot) else {
                continue;
            };
            let distance = chroma_distance(f64::from(reference), detected);
            let error = intonation_error(distance);
            self.measure[slot].push(error);
            errors.push((slot, error));
        }
        errors
    }

    /// Measure boundary: arithmetic mean of each slot's accumulator
    /// (0.0 when empty — absence of singing is not penalized), then all
    /// accumulators are cleared.
    pub fn measure_report(&mut self) -> Vec<f64> {
        let report = self
            .measure
            .iter()
            .map(|samples| {
                if samples.is_empty() {
                    0.0
                } else {
                    samples.iter().sum::<f64>() / samples.len() as f64
                }
            })
            .collect();
        for samples in &mut self.measure {
            samples.clear();
        }
        report
    }
}
