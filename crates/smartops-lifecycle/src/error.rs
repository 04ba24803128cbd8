//! Error types for lifecycle handlers.

use smartops_blueprint::BlueprintError;
use smartops_state::{AppId, StateError};
use thiserror::Error;

use crate::task::QueueError;

/// Result type alias for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid parameter: {0}")]
    Validation(String),

    /// The app is in an in-flight (`*ING`) state.
    #[error("{0}")]
    NotEditable(String),

    /// The app is in `ERROR` and only an operator reset may move it.
    #[error("app {0} is in ERROR state; reset its status first")]
    Absorbed(AppId),

    #[error("{0}")]
    Duplicate(String),

    #[error(transparent)]
    Blueprint(#[from] BlueprintError),

    #[error("state store error: {0}")]
    State(StateError),

    #[error("failed to enqueue task: {0}")]
    Queue(#[from] QueueError),
}

impl From<StateError> for LifecycleError {
    fn from(e: StateError) -> Self {
        match e {
            StateError::NotFound(what) => LifecycleError::NotFound(what),
            StateError::Duplicate(what) => LifecycleError::Duplicate(what),
            other => LifecycleError::State(other),
        }
    }
}
