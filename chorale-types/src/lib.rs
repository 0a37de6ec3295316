//! # chorale-types
//!
//! Shared type definitions for the Chorale ensemble coordinator.
//! This crate contains data structures and pitch math used across
//! chorale-core, chorale-net, and the chorale binary.

pub mod pitch;

/// Identifier for a performer eligible for slot assignment.
///
/// Roster updates from the controller carry either ordinal singer numbers
/// or named network participants. The values `0` and `-1` are sentinels
/// meaning "no selection" and must be filtered before use.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum PerformerId {
    Number(i32),
    Name(String),
}

impl PerformerId {
    /// Whether this is the controller's "no selection" placeholder.
    pub fn is_sentinel(&self) -> bool {
        matches!(self, PerformerId::Number(0) | PerformerId::Number(-1))
    }
}

impl std::fmt::Display for PerformerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PerformerId::Number(n) => write!(f, "{}", n),
            PerformerId::Name(name) => write!(f, "{}", name),
        }
    }
}
