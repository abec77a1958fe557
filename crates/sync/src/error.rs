//! Error types for the sync crate.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for network-boundary operations.
pub type Result<T> = std::result::Result<T, FetchError>;

/// Why a poll could not produce a payload.
///
/// These never reach the renderer; they are logged by the fallback layer and
/// then replaced by the last good payload or the static fallback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The client-side deadline expired before a response arrived.
    #[error("Request to {path} timed out after {timeout:?}")]
    Timeout { path: String, timeout: Duration },

    /// The request never produced an HTTP response (refused, reset, DNS...).
    #[error("Connection failed for {path}: {message}")]
    Connection { path: String, message: String },

    /// The server answered with a status the sync engine does not accept.
    #[error("Unexpected status {status} from {path}")]
    Status { path: String, status: u16 },

    /// The body was not the JSON shape expected for this source.
    #[error("Malformed payload from {path}: {message}")]
    Decode { path: String, message: String },

    /// The request could not be built (bad header value, bad base URL).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Coarse failure classes, used to tell operators what went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    Connection,
    UpstreamStatus,
    MalformedPayload,
    InvalidRequest,
    /// The caller gave up before the transport answered (timeout or teardown).
    Cancelled,
}

impl FailureKind {
    /// Timeouts and connection failures mean the backend could not be reached at all.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Connection)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Timeout => "timeout",
            Self::Connection => "connection failure",
            Self::UpstreamStatus => "unexpected status",
            Self::MalformedPayload => "malformed payload",
            Self::InvalidRequest => "invalid request",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Connection { .. } => FailureKind::Connection,
            Self::Status { .. } => FailureKind::UpstreamStatus,
            Self::Decode { .. } => FailureKind::MalformedPayload,
            Self::InvalidRequest(_) => FailureKind::InvalidRequest,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn timeout(path: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            path: path.into(),
            timeout,
        }
    }

    pub fn connection(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn status(path: impl Into<String>, status: u16) -> Self {
        Self::Status {
            path: path.into(),
            status,
        }
    }

    pub fn decode(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Classify a reqwest failure for `path`.
    pub fn from_reqwest(path: &str, timeout: Duration, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::timeout(path, timeout)
        } else if error.is_decode() || error.is_body() {
            Self::decode(path, error.to_string())
        } else {
            Self::connection(path, error.to_string())
        }
    }
}
