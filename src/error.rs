//! Error types for segue
//!
//! Defines module-specific error types using thiserror for clear error
//! propagation. Failures inside the decode worker are never surfaced through
//! this type to consumers; they are logged and the stream ends instead.

use thiserror::Error;

/// Main error type for the segue engine
#[derive(Error, Debug)]
pub enum Error {
    /// Filter graph construction or configuration failed
    #[error("Filter graph build failed: {0}")]
    GraphBuild(String),

    /// Frame-level decode error
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A seek request could not be satisfied
    #[error("Seek failed: {0}")]
    Seek(String),

    /// Sink is already attached to a playlist
    #[error("Sink is already attached to a playlist")]
    SinkAlreadyAttached,

    /// Operation requires an attached sink
    #[error("Sink is not attached to a playlist")]
    SinkNotAttached,

    /// Sink not found in the playlist's sink map
    #[error("Sink not found")]
    SinkNotFound,

    /// Playlist item handle does not name a current item
    #[error("Playlist item not found")]
    ItemNotFound,

    /// Queue operation after abort
    #[error("Queue is aborted")]
    QueueAborted,

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Convenience Result type using the segue Error
pub type Result<T> = std::result::Result<T, Error>;
