//! Blueprint ingestion errors.

use thiserror::Error;

/// Result type alias for blueprint operations.
pub type BlueprintResult<T> = Result<T, BlueprintError>;

/// Errors raised while ingesting a blueprint.
#[derive(Debug, Error)]
pub enum BlueprintError {
    /// A document segment is not well-formed structured data.
    #[error("failed to parse yaml content: {0}")]
    Parse(String),

    /// A document is structurally incomplete or inconsistent.
    #[error("validation failed: {0}")]
    Validation(String),
}
