//! Error types for roundtable-core
//!
//! Only precondition violations surface as `Err` from a turn. Per-agent
//! failures are values ([`InvocationError`]) collected into the turn report.

use thiserror::Error;

/// Reasons a turn is refused before any state is touched
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TurnError {
    #[error("message is empty")]
    EmptyMessage,

    #[error("room '{room_id}' is already processing a turn")]
    TurnInProgress { room_id: String },

    #[error("orchestrator has been shut down")]
    ShutDown,
}

/// Why a single agent produced no message
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvocationError {
    /// The backend call itself failed (transport, panic-free error return)
    #[error("backend call failed: {0}")]
    CallFailed(String),

    /// The backend answered but flagged the call as unsuccessful
    #[error("backend reported an unsuccessful call")]
    Unsuccessful,

    /// The backend answered but no text could be extracted from the payload
    #[error("backend reply contained no usable text")]
    EmptyReply,

    #[error("backend call timed out after {0}s")]
    TimedOut(u64),
}

/// Roster configuration problems, caught when a room is built
#[derive(Debug, Error, PartialEq)]
pub enum RosterError {
    #[error("agent '{name}' has an empty id")]
    EmptyId { name: String },

    #[error("agent '{id}' has an empty name")]
    EmptyName { id: String },

    #[error("agent name '{name}' cannot be mentioned; use only letters, digits and underscores")]
    UnmentionableName { name: String },

    #[error("duplicate agent id '{id}'")]
    DuplicateId { id: String },

    #[error("duplicate agent name '{name}' (names are matched case-insensitively)")]
    DuplicateName { name: String },

    #[error("agent '{name}': {field} = {value} is out of range")]
    OutOfRange {
        name: String,
        field: &'static str,
        value: f32,
    },
}
