//! Errors raised by the record store.

use thiserror::Error;

pub type StateResult<T> = Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    /// The database file could not be created or opened.
    #[error("cannot open store: {0}")]
    Open(String),

    /// redb refused a step of a transaction. `op` names the step
    /// (`begin`, `commit`, `open table`, `read`, `write`).
    #[error("store {op} failed: {message}")]
    Storage { op: &'static str, message: String },

    /// A stored value did not encode to, or decode from, JSON.
    #[error("bad {kind} record: {message}")]
    Codec { kind: &'static str, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate record: {0}")]
    Duplicate(String),

    /// A store call moved off the async runtime never returned.
    #[error("store call did not complete: {0}")]
    Interrupted(String),
}
