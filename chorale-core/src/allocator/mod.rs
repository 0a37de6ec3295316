//! Voice allocation: maps live note events onto the fixed slot table.
//!
//! The allocator owns the note-to-slot mapping but does not send OSC
//! messages. Every mutating call returns the `VoiceCommand`s the caller
//! should forward to the synthesis engine.

use chorale_types::PerformerId;

/// Number of reference voices in the usual quartet setup.
pub const DEFAULT_VOICE_COUNT: usize = 4;

/// Command for the synthesis engine, addressed by slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceCommand {
    Retune { slot: usize, note: u8 },
    Play { slot: usize },
    Stop { slot: usize },
}

/// Which assignment policy the allocator runs under. Selected at
/// construction; policies are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocationPolicy {
    /// Ascending held-note list mapped onto slots in roster order.
    #[default]
    Ordered,
    /// Each input device owns a pair of adjacent slots.
    DualPair,
    /// New pitches land on a uniformly random open slot. Used when slot
    /// order is not meaningful (remote performers identified by name).
    Random,
}

/// Uniform random source for the `Random` policy. Pluggable so tests
/// can supply a deterministic stub.
pub trait RandomSource: Send {
    fn next_u64(&mut self) -> u64;
}

/// Xorshift PRNG seeded from the clock.
pub struct XorShiftSource {
    state: u64,
}

impl XorShiftSource {
    pub fn new() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self {
            state: seed ^ 0x1234567890abcdef,
        }
    }
}

impl Default for XorShiftSource {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for XorShiftSource {
    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }
}

/// One of the fixed output voice channels a reference pitch can be
/// routed to. Slots are created once at startup and only ever
/// deactivated, never destroyed.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSlot {
    /// The performer this slot belongs to, if any.
    pub performer: Option<PerformerId>,
    /// The note currently sounding on this slot.
    pub note: Option<u8>,
    /// Whether the slot is part of the current roster.
    pub active: bool,
}

pub struct VoiceAllocator {
    slots: Vec<VoiceSlot>,
    /// Currently depressed notes awaiting assignment, kept ascending.
    /// Only the Ordered policy uses this.
    held: Vec<u8>,
    policy: AllocationPolicy,
    rng: Box<dyn RandomSource>,
}

impl VoiceAllocator {
    pub fn new(voices: usize, policy: AllocationPolicy) -> Self {
        Self::with_random_source(voices, policy, Box::new(XorShiftSource::new()))
    }

    pub fn with_random_source(
        voices: usize,
        policy: AllocationPolicy,
        rng: Box<dyn RandomSource>,
    ) -> Self {
        let slots = (0..voices)
            .map(|i| VoiceSlot {
                performer: Some(PerformerId::Number(i as i32 + 1)),
                note: None,
                active: true,
            })
            .collect();
        Self {
            slots,
            held: Vec::new(),
            policy,
            rng,
        }
    }

    pub fn voice_count(&self) -> usize {
        self.slots.len()
    }

    pub fn policy(&self) -> AllocationPolicy {
        self.policy
    }

    pub fn slots(&self) -> &[VoiceSlot] {
        &self.slots
    }

    /// Current per-slot notes, used to refresh the scorer's reference
    /// pitches after any mutation.
    pub fn assignments(&self) -> Vec<Option<u8>> {
        self.slots.iter().map(|s| s.note).collect()
    }

    pub fn note_on(&mut self, device: usize, note: u8) -> Vec<VoiceCommand> {
        match self.policy {
            AllocationPolicy::Ordered => self.ordered_note(note, true),
            AllocationPolicy::DualPair => self.pair_event(device, note, true),
            AllocationPolicy::Random => self.random_note_on(note),
        }
    }

    pub fn note_off(&mut self, device: usize, note: u8) -> Vec<VoiceCommand> {
        match self.policy {
            AllocationPolicy::Ordered => self.ordered_note(note, false),
            AllocationPolicy::DualPair => self.pair_event(device, note, false),
            AllocationPolicy::Random => self.random_note_off(note),
        }
    }

    /// Apply a roster update from the controller. Sentinel ids are
    /// filtered out and the list is capped at the slot count. The order
    /// of ids defines slot precedence for the Ordered policy. Removed
    /// performers have their slot cleared and stopped immediately; a
    /// performer who merely changed position keeps their note.
    pub fn update_roster(&mut self, ids: Vec<PerformerId>) -> Vec<VoiceCommand> {
        let ids: Vec<PerformerId> = ids
            .into_iter()
            .filter(|id| !id.is_sentinel())
            .take(self.slots.len())
            .collect();

        // Notes keyed by their current owner, so a surviving performer's
        // assignment follows them to their new slot.
        let previous: Vec<(PerformerId, u8)> = self
            .slots
            .iter()
            .filter_map(|s| Some((s.performer.clone()?, s.note?)))
            .collect();

        let mut commands = Vec::new();
        for (i, slot) in self.slots.iter_mut().enumerate() {
            match ids.get(i) {
                Some(id) => {
                    if slot.performer.as_ref() != Some(id) {
                        let carried = previous
                            .iter()
                            .find(|(p, _)| p == id)
                            .map(|&(_, note)| note);
                        if slot.note != carried {
                            if slot.note.take().is_some() {
                                commands.push(VoiceCommand::Stop { slot: i });
                            }
                            if let Some(note) = carried {
                                slot.note = Some(note);
                                commands.push(VoiceCommand::Retune { slot: i, note });
                                commands.push(VoiceCommand::Play { slot: i });
                            }
                        }
                        slot.performer = Some(id.clone());
                    }
                    slot.active = true;
                }
                None => {
                    if slot.note.take().is_some() {
                        commands.push(VoiceCommand::Stop { slot: i });
                    }
                    slot.performer = None;
                    slot.active = false;
                }
            }
        }

        if self.policy == AllocationPolicy::Ordered {
            commands.extend(self.reassign());
        }
        commands
    }

    // --- Ordered single-stream assignment ---

    fn ordered_note(&mut self, note: u8, on: bool) -> Vec<VoiceCommand> {
        if on {
            if self.held.contains(&note) || self.held.len() >= self.slots.len() {
                return Vec::new();
            }
            self.held.push(note);
            self.held.sort_unstable();
        } else {
            // Note-off for an absent pitch is a caller error; guard with
            // a presence check rather than removing by index.
            let Some(pos) = self.held.iter().position(|&n| n == note) else {
                return Vec::new();
            };
            self.held.remove(pos);
        }
        self.reassign()
    }

    /// Map the i-th held note onto the i-th active slot in roster order.
    /// A slot whose pitch is unchanged emits nothing, so sustained
    /// voices are not audibly retriggered.
    fn reassign(&mut self) -> Vec<VoiceCommand> {
        let active: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.active)
            .map(|(i, _)| i)
            .collect();

        let mut commands = Vec::new();
        for (i, &slot) in active.iter().enumerate() {
            match self.held.get(i).copied() {
                Some(note) if self.slots[slot].note == Some(note) => {}
                Some(note) => {
                    if self.slots[slot].note.is_some() {
                        commands.push(VoiceCommand::Stop { slot });
                    }
                    self.slots[slot].note = Some(note);
                    commands.push(VoiceCommand::Retune { slot, note });
                    commands.push(VoiceCommand::Play { slot });
                }
                None => {
                    if self.slots[slot].note.take().is_some() {
                        commands.push(VoiceCommand::Stop { slot });
                    }
                }
            }
        }
        commands
    }

    // --- Dual-device pair arbitration ---

    fn pair_event(&mut self, device: usize, note: u8, on: bool) -> Vec<VoiceCommand> {
        let lower = device * 2;
        let upper = lower + 1;
        if upper >= self.slots.len() {
            log::debug!(target: "allocator", "dropping note event for out-of-range device {}", device);
            return Vec::new();
        }
        // A roster update may have deactivated the pair; its owner's
        // events stay dead until the roster brings it back.
        if !self.slots[lower].active || !self.slots[upper].active {
            log::debug!(target: "allocator", "dropping note event for deactivated pair of device {}", device);
            return Vec::new();
        }

        let a = self.slots[lower].note;
        let b = self.slots[upper].note;
        if on {
            match (a, b) {
                // Two distinct notes already held: a third is rejected
                // outright, without feedback to the performer.
                (Some(p), Some(q)) if p != q => return Vec::new(),
                // Unison pair: admit the new note in the member that
                // keeps the lower-valued note as anchor.
                (Some(anchor), Some(_)) => {
                    if note > anchor {
                        self.slots[upper].note = Some(note);
                    } else {
                        self.slots[lower].note = Some(note);
                    }
                }
                // Empty pair: unison default.
                _ => {
                    self.slots[lower].note = Some(note);
                    self.slots[upper].note = Some(note);
                }
            }
        } else {
            match (a, b) {
                (Some(p), Some(q)) if p == note && q == note => {
                    self.slots[lower].note = None;
                    self.slots[upper].note = None;
                }
                // The surviving note becomes the pair's new anchor for
                // both outputs.
                (Some(p), _) if p == note => self.slots[lower].note = b,
                (_, Some(q)) if q == note => self.slots[upper].note = a,
                _ => {}
            }
        }
        self.resync()
    }

    /// Full rescan of the slot table after a pair mutation. Re-issues
    /// play/stop for every slot so output state always matches the
    /// mapping; redundant commands are idempotent at the synthesis
    /// boundary.
    fn resync(&self) -> Vec<VoiceCommand> {
        let mut commands = Vec::new();
        for (i, slot) in self.slots.iter().enumerate() {
            match slot.note {
                Some(note) => {
                    commands.push(VoiceCommand::Retune { slot: i, note });
                    commands.push(VoiceCommand::Play { slot: i });
                }
                None => commands.push(VoiceCommand::Stop { slot: i }),
            }
        }
        commands
    }

    // --- Random fallback assignment ---

    fn random_note_on(&mut self, note: u8) -> Vec<VoiceCommand> {
        if self.slots.iter().any(|s| s.note == Some(note)) {
            return Vec::new();
        }
        let open: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.active && s.note.is_none())
            .map(|(i, _)| i)
            .collect();
        if open.is_empty() {
            return Vec::new();
        }
        let pick = open[(self.rng.next_u64() % open.len() as u64) as usize];
        self.slots[pick].note = Some(note);
        vec![
            VoiceCommand::Retune { slot: pick, note },
            VoiceCommand::Play { slot: pick },
        ]
    }

    fn random_note_off(&mut self, note: u8) -> Vec<VoiceCommand> {
        let mut commands = Vec::new();
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.note == Some(note) {
                slot.note = None;
                commands.push(VoiceCommand::Stop { slot: i });
            }
        }
        commands
    }
}
