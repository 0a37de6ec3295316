//! Thin event demultiplexer: turns normalized MIDI and network events
//! into engine calls and outbound reports.
//!
//! The router owns the two engine mutexes. Each lock is held only for
//! the duration of the state transition; synthesis and network sends
//! happen after the lock is released.

use std::sync::Mutex;

use chorale_types::pitch::note_to_hz_a4;
use chorale_types::PerformerId;

use crate::allocator::{VoiceAllocator, VoiceCommand};
use crate::midi::{DeviceEvent, MidiEventKind};
use crate::scorer::{IntonationScorer, PitchSource};
use crate::synth::SynthControl;

/// Conductor cue: meter change followed by the new tempo.
const CC_METER_CHANGE: u8 = 102;
/// Conductor cue: reset tempo and start the piece.
const CC_START: u8 = 73;

/// Outbound reports to the remote controller. Implementations are
/// fire-and-forget.
pub trait ReportSink {
    /// Per-tick error stream; one entry per currently singing slot.
    fn realtime_errors(&self, errors: &[(usize, f64)]);
    /// Per-measure averages, one per slot.
    fn measure_errors(&self, errors: &[f64]);
    fn meter_changed(&self);
    fn tempo(&self, bpm: f64);
    fn start(&self);
    /// Pitch cue for a remote singer, addressed through the `/send`
    /// envelope rather than local synthesis.
    fn performer_freq(&self, target: &PerformerId, hz: f64);
    fn performer_mute(&self, target: &PerformerId);
}

pub struct EventRouter {
    allocator: Mutex<VoiceAllocator>,
    scorer: Mutex<IntonationScorer>,
    /// MIDI channel carrying measure-boundary and conductor-cue events
    /// rather than performance notes.
    trigger_channel: u8,
    tuning_a4: f64,
}

impl EventRouter {
    pub fn new(
        allocator: VoiceAllocator,
        scorer: IntonationScorer,
        trigger_channel: u8,
        tuning_a4: f64,
    ) -> Self {
        Self {
            allocator: Mutex::new(allocator),
            scorer: Mutex::new(scorer),
            trigger_channel,
            tuning_a4,
        }
    }

    /// Dispatch one normalized MIDI event. Trigger-channel events drive
    /// the scorer's measure cycle; everything else is a note event for
    /// the allocator. Unhandled combinations are dropped.
    pub fn handle_midi(
        &self,
        event: &DeviceEvent,
        synth: &dyn SynthControl,
        reports: &dyn ReportSink,
    ) {
        match event.kind {
            MidiEventKind::NoteOn { channel, .. } if channel == self.trigger_channel => {
                let report = {
                    let Ok(mut scorer) = self.scorer.lock() else {
                        return;
                    };
                    scorer.measure_report()
                };
                reports.measure_errors(&report);
            }
            MidiEventKind::NoteOff { channel, .. } if channel == self.trigger_channel => {}
            MidiEventKind::ControlChange { channel, value, .. }
                if channel == self.trigger_channel =>
            {
                match value {
                    CC_METER_CHANGE => {
                        reports.meter_changed();
                        reports.tempo(102.4);
                    }
                    CC_START => {
                        reports.tempo(64.0);
                        reports.start();
                    }
                    _ => {}
                }
            }
            MidiEventKind::NoteOn { note, .. } => {
                self.note_event(event.device, note, true, synth, reports);
            }
            MidiEventKind::NoteOff { note, .. } => {
                self.note_event(event.device, note, false, synth, reports);
            }
            MidiEventKind::ControlChange { .. } => {}
        }
    }

    /// Apply a roster update from the network layer.
    pub fn handle_roster(
        &self,
        ids: Vec<PerformerId>,
        synth: &dyn SynthControl,
        reports: &dyn ReportSink,
    ) {
        let (commands, assignments, owners) = {
            let Ok(mut allocator) = self.allocator.lock() else {
                return;
            };
            let commands = allocator.update_roster(ids);
            (commands, allocator.assignments(), slot_owners(&allocator))
        };
        self.refresh_references(&assignments);
        self.dispatch_commands(&commands, &owners, synth, reports);
    }

    /// One realtime scoring pass, emitted as the `/error_realtime`
    /// stream.
    pub fn tick(&self, detector: &dyn PitchSource, reports: &dyn ReportSink) {
        let errors = {
            let Ok(mut scorer) = self.scorer.lock() else {
                return;
            };
            scorer.tick(detector)
        };
        reports.realtime_errors(&errors);
    }

    fn note_event(
        &self,
        device: usize,
        note: u8,
        on: bool,
        synth: &dyn SynthControl,
        reports: &dyn ReportSink,
    ) {
        let (commands, assignments, owners) = {
            let Ok(mut allocator) = self.allocator.lock() else {
                return;
            };
            let commands = if on {
                allocator.note_on(device, note)
            } else {
                allocator.note_off(device, note)
            };
            (commands, allocator.assignments(), slot_owners(&allocator))
        };
        self.refresh_references(&assignments);
        self.dispatch_commands(&commands, &owners, synth, reports);
    }

    /// Slots owned by named network participants are remote singers:
    /// their commands go out as `/send` pitch cues instead of local
    /// synthesis.
    fn dispatch_commands(
        &self,
        commands: &[VoiceCommand],
        owners: &[Option<PerformerId>],
        synth: &dyn SynthControl,
        reports: &dyn ReportSink,
    ) {
        let mut local = Vec::new();
        for command in commands {
            let slot = match *command {
                VoiceCommand::Retune { slot, .. }
                | VoiceCommand::Play { slot }
                | VoiceCommand::Stop { slot } => slot,
            };
            match owners.get(slot).and_then(|p| p.as_ref()) {
                Some(id @ PerformerId::Name(_)) => match *command {
                    VoiceCommand::Retune { note, .. } => {
                        reports.performer_freq(id, note_to_hz_a4(f64::from(note), self.tuning_a4));
                    }
                    // The freq cue already starts the remote voice.
                    VoiceCommand::Play { .. } => {}
                    VoiceCommand::Stop { .. } => reports.performer_mute(id),
                },
                _ => local.push(*command),
            }
        }
        synth.apply(&local);
    }

    fn refresh_references(&self, assignments: &[Option<u8>]) {
        if let Ok(mut scorer) = self.scorer.lock() {
            scorer.set_references(assignments);
        }
    }
}

fn slot_owners(allocator: &VoiceAllocator) -> Vec<Option<PerformerId>> {
    allocator.slots().iter().map(|s| s.performer.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::{AllocationPolicy, VoiceCommand};

    /// Records every command the router forwards.
    #[derive(Default)]
    struct RecordingSynth(Mutex<Vec<VoiceCommand>>);

    impl RecordingSynth {
        fn commands(&self) -> Vec<VoiceCommand> {
            self.0.lock().unwrap().clone()
        }
    }

    impl SynthControl for RecordingSynth {
        fn apply(&self, commands: &[VoiceCommand]) {
            self.0.lock().unwrap().extend_from_slice(commands);
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Report {
        Realtime(Vec<(usize, f64)>),
        Measure(Vec<f64>),
        MeterChanged,
        Tempo(f64),
        Start,
        PerformerFreq(PerformerId, f64),
        PerformerMute(PerformerId),
    }

    #[derive(Default)]
    struct RecordingReports(Mutex<Vec<Report>>);

    impl RecordingReports {
        fn reports(&self) -> Vec<Report> {
            self.0.lock().unwrap().clone()
        }
    }

    impl ReportSink for RecordingReports {
        fn realtime_errors(&self, errors: &[(usize, f64)]) {
            self.0.lock().unwrap().push(Report::Realtime(errors.to_vec()));
        }
        fn measure_errors(&self, errors: &[f64]) {
            self.0.lock().unwrap().push(Report::Measure(errors.to_vec()));
        }
        fn meter_changed(&self) {
            self.0.lock().unwrap().push(Report::MeterChanged);
        }
        fn tempo(&self, bpm: f64) {
            self.0.lock().unwrap().push(Report::Tempo(bpm));
        }
        fn start(&self) {
            self.0.lock().unwrap().push(Report::Start);
        }
        fn performer_freq(&self, target: &PerformerId, hz: f64) {
            self.0
                .lock()
                .unwrap()
                .push(Report::PerformerFreq(target.clone(), hz));
        }
        fn performer_mute(&self, target: &PerformerId) {
            self.0.lock().unwrap().push(Report::PerformerMute(target.clone()));
        }
    }

    struct FixedDetector(Vec<Option<f64>>);

    impl PitchSource for FixedDetector {
        fn detected_note(&self, slot: usize) -> Option<f64> {
            self.0.get(slot).copied().flatten()
        }
    }

    fn router() -> EventRouter {
        EventRouter::new(
            VoiceAllocator::new(4, AllocationPolicy::Ordered),
            IntonationScorer::new(4),
            4,
            440.0,
        )
    }

    fn note_on(device: usize, channel: u8, note: u8) -> DeviceEvent {
        DeviceEvent {
            device,
            kind: MidiEventKind::NoteOn {
                channel,
                note,
                velocity: 100,
            },
        }
    }

    fn note_off(device: usize, channel: u8, note: u8) -> DeviceEvent {
        DeviceEvent {
            device,
            kind: MidiEventKind::NoteOff { channel, note },
        }
    }

    #[test]
    fn note_event_reaches_synth_and_scorer() {
        let router = router();
        let synth = RecordingSynth::default();
        let reports = RecordingReports::default();

        router.handle_midi(&note_on(0, 0, 60), &synth, &reports);
        assert_eq!(
            synth.commands(),
            vec![
                VoiceCommand::Retune { slot: 0, note: 60 },
                VoiceCommand::Play { slot: 0 },
            ]
        );

        // The scorer now tracks the assigned reference.
        let detector = FixedDetector(vec![Some(60.0)]);
        router.tick(&detector, &reports);
        assert_eq!(reports.reports(), vec![Report::Realtime(vec![(0, 0.0)])]);
    }

    #[test]
    fn measure_trigger_flushes_report() {
        let router = router();
        let synth = RecordingSynth::default();
        let reports = RecordingReports::default();

        router.handle_midi(&note_on(0, 0, 60), &synth, &reports);
        let detector = FixedDetector(vec![Some(61.0)]);
        router.tick(&detector, &reports);

        // Note-on on the trigger channel marks the new measure.
        router.handle_midi(&note_on(0, 4, 1), &synth, &reports);
        let flushed = reports.reports();
        match &flushed[1] {
            Report::Measure(errors) => {
                assert!((errors[0] - 0.75).abs() < 1e-10);
                assert_eq!(&errors[1..], &[0.0, 0.0, 0.0]);
            }
            other => panic!("Expected Measure, got {:?}", other),
        }

        // Accumulators were cleared: an empty measure reports zeros.
        router.handle_midi(&note_on(0, 4, 1), &synth, &reports);
        assert_eq!(
            reports.reports()[2],
            Report::Measure(vec![0.0, 0.0, 0.0, 0.0])
        );
    }

    #[test]
    fn conductor_cues_emit_reports() {
        let router = router();
        let synth = RecordingSynth::default();
        let reports = RecordingReports::default();

        let cue = |value| DeviceEvent {
            device: 0,
            kind: MidiEventKind::ControlChange {
                channel: 4,
                controller: 1,
                value,
            },
        };
        router.handle_midi(&cue(102), &synth, &reports);
        router.handle_midi(&cue(73), &synth, &reports);
        router.handle_midi(&cue(50), &synth, &reports); // unknown code dropped
        assert_eq!(
            reports.reports(),
            vec![
                Report::MeterChanged,
                Report::Tempo(102.4),
                Report::Tempo(64.0),
                Report::Start,
            ]
        );
    }

    #[test]
    fn roster_removal_stops_voice_and_silences_reference() {
        let router = router();
        let synth = RecordingSynth::default();
        let reports = RecordingReports::default();

        router.handle_midi(&note_on(0, 0, 60), &synth, &reports);
        router.handle_midi(&note_on(0, 0, 64), &synth, &reports);
        router.handle_roster(vec![PerformerId::Number(1)], &synth, &reports);
        assert!(synth.commands().contains(&VoiceCommand::Stop { slot: 1 }));

        // Slot 1 no longer has a reference, so it stops being scored.
        let detector = FixedDetector(vec![Some(60.0), Some(64.0), None, None]);
        router.tick(&detector, &reports);
        assert_eq!(reports.reports(), vec![Report::Realtime(vec![(0, 0.0)])]);
    }

    #[test]
    fn named_performer_is_driven_over_the_send_envelope() {
        let router = EventRouter::new(
            VoiceAllocator::new(2, AllocationPolicy::Random),
            IntonationScorer::new(2),
            4,
            440.0,
        );
        let synth = RecordingSynth::default();
        let reports = RecordingReports::default();

        router.handle_roster(vec![PerformerId::Name("alto".into())], &synth, &reports);
        router.handle_midi(&note_on(0, 0, 69), &synth, &reports);
        router.handle_midi(&note_off(0, 0, 69), &synth, &reports);

        // A remote singer never reaches the local synthesis engine.
        assert!(synth.commands().is_empty());
        assert_eq!(
            reports.reports(),
            vec![
                Report::PerformerFreq(PerformerId::Name("alto".into()), 440.0),
                Report::PerformerMute(PerformerId::Name("alto".into())),
            ]
        );
    }

    #[test]
    fn control_change_off_trigger_channel_dropped() {
        let router = router();
        let synth = RecordingSynth::default();
        let reports = RecordingReports::default();

        let event = DeviceEvent {
            device: 0,
            kind: MidiEventKind::ControlChange {
                channel: 0,
                controller: 1,
                value: 102,
            },
        };
        router.handle_midi(&event, &synth, &reports);
        assert!(synth.commands().is_empty());
        assert!(reports.reports().is_empty());
    }
}
