//! Subscriber error types.

use thiserror::Error;

/// Errors from the feed connection and the subscriber loop.
#[derive(Debug, Error)]
pub enum SubscriberError {
    #[error("feed i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed feed frame: {0}")]
    Frame(#[from] serde_json::Error),

    #[error("feed frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    #[error("feed is not connected")]
    NotConnected,
}

pub type Result<T> = std::result::Result<T, SubscriberError>;
