//! Projection error types.

use thiserror::Error;

/// Errors that can occur while projecting a block.
///
/// None of these terminate the subscriber loop; a failed batch rolls back
/// and is retried on redelivery.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// A state payload failed to decode against its address-space schema.
    #[error("decode error: {0}")]
    Decode(#[from] domain::DecodeError),

    /// A database error occurred; the enclosing transaction is rolled back.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A nested JSON payload failed to parse.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The state-delta payload framing is corrupt.
    #[error("malformed state-delta payload: {0}")]
    MalformedDelta(String),
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
