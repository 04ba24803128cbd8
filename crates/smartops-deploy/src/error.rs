//! Error types for the deploy pipeline.

use std::time::Duration;

use smartops_cluster::{BuildError, ClusterApiError};
use smartops_lifecycle::{LifecycleError, QueueError};
use smartops_state::StateError;
use thiserror::Error;

pub type DeployResult<T> = Result<T, DeployError>;

#[derive(Debug, Error)]
pub enum DeployError {
    /// A structural problem with the blueprint; aborts the deploy.
    #[error("deployment failed: {0}")]
    Deployment(String),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Cluster(#[from] ClusterApiError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

#[derive(Debug, Error)]
pub enum LockError {
    /// Someone else holds the lock; the action should be abandoned.
    #[error("lock {name} is already held (waited {waited:?})")]
    Unavailable { name: String, waited: Duration },

    #[error("lock store error: {0}")]
    State(#[from] StateError),
}
