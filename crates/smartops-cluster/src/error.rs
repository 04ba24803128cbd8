//! Error types for the cluster client and resource builders.

use std::time::Duration;

use smartops_blueprint::UnknownKind;
use thiserror::Error;

/// A cluster create/list call failed.
#[derive(Debug, Clone, Error)]
pub enum ClusterApiError {
    #[error("invalid cluster endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("cannot reach cluster api at {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("cluster api call timed out after {0:?}")]
    Timeout(Duration),

    #[error("cluster api returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("cannot decode cluster api response: {0}")]
    Decode(String),

    #[error("cluster rejected request: {0}")]
    Rejected(String),
}

/// A document could not be turned into a create call.
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    #[error(transparent)]
    UnsupportedKind(#[from] UnknownKind),

    #[error("malformed {kind} {name}: {reason}")]
    Malformed {
        kind: &'static str,
        name: String,
        reason: String,
    },
}
