//! Error types for the engine crate.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised inside the engine.
///
/// None of these reach the renderer: settings readers substitute defaults and
/// the rotation controller never fails. They exist so storage backends can
/// report what went wrong to the layer that logs it.
#[derive(Debug, Error)]
pub enum Error {
    /// The durable settings store could not be read or written.
    #[error("Settings storage error: {0}")]
    Storage(String),

    /// Underlying file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The settings file could not be watched for outside changes.
    #[error("File watch error: {0}")]
    Watch(#[from] notify::Error),
}

impl Error {
    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }
}
