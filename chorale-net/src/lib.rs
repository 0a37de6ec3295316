//! Network layer between the chorale coordinator and the remote
//! controller.
//!
//! Outbound: per-tick and per-measure error reports plus addressed
//! `/send` envelopes, all fire-and-forget OSC over UDP. Inbound: a
//! listener thread decoding roster updates and pitch-detector
//! estimates.

pub mod listener;
pub mod reports;

pub use listener::{NetListener, PitchMonitor};
pub use reports::ReportSender;
