//! # chorale-core
//!
//! Coordination engines for a small ensemble of live singers performing
//! against synthesized reference voices — independent of any particular
//! input device or transport.
//!
//! ## Module Overview
//!
//! - [`allocator`] — `VoiceAllocator`: maps live note events onto the
//!   fixed slot table under one of three policies (ordered single-stream,
//!   dual-device pair arbitration, random). Owns mapping state only;
//!   every mutation returns the `VoiceCommand`s for the caller to forward.
//! - [`scorer`] — `IntonationScorer`: compares detector estimates against
//!   each slot's reference pitch, accumulates bounded error samples, and
//!   reports per-measure averages.
//! - [`router`] — `EventRouter`: demultiplexes normalized MIDI and
//!   network events into the two engines and the report sender.
//! - [`midi`] — `midir`-based multi-device input funneled through one
//!   channel polled by the run loop.
//! - [`synth`] — OSC client for the external synthesis engine
//!   (retune/play/stop per slot, fire-and-forget).
//! - [`config`] — TOML configuration (embedded defaults + user override).

pub mod allocator;
pub mod config;
pub mod midi;
pub mod router;
pub mod scorer;
pub mod synth;
