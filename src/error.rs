//! Error types for upload and download sessions

use std::path::PathBuf;
use std::time::Duration;

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, UploadError>;

/// Errors produced while planning, transferring or finalizing an upload.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// Missing or malformed input (target URL, file path, chunk size...)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The local file could not be inspected, opened or read
    #[error("filesystem error on {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Network or transport failure on a single attempt
    #[error("transfer error: {0}")]
    Transfer(String),

    /// A single attempt exceeded its time budget
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Well-formed response that reports failure
    #[error("server rejected request ({status}): {message}")]
    ServerRejection { status: u16, message: String },

    /// API misuse, e.g. starting a session twice
    #[error("usage error: {0}")]
    Usage(String),

    /// One or more chunks never reached the server
    #[error("{} of {total} chunks failed to upload (first error: {first_error})", failed.len())]
    ChunksFailed {
        failed: Vec<usize>,
        total: usize,
        first_error: String,
    },
}

impl UploadError {
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub fn rejection(status: u16, message: impl Into<String>) -> Self {
        Self::ServerRejection {
            status,
            message: message.into(),
        }
    }

    /// Whether RetryPolicy may attempt the same chunk again after this error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transfer(_) | Self::Timeout(_) | Self::ServerRejection { .. }
        )
    }

    /// Map a failed HTTP exchange; a client-side deadline becomes `Timeout(limit)`
    pub fn from_http(e: reqwest::Error, limit: Duration) -> Self {
        if e.is_timeout() {
            return Self::Timeout(limit);
        }
        e.into()
    }

    /// Whether a single chunk hitting this error ends the whole upload session
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Filesystem { .. })
    }

    /// Upload session phase this error is normally raised from.
    ///
    /// Only meaningful for upload sessions; a download has a single phase
    /// and reports a 404 as `ServerRejection` like any other rejection.
    pub fn phase(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) | Self::Usage(_) => "setup",
            Self::Filesystem { .. } => "planning",
            Self::Transfer(_) | Self::Timeout(_) | Self::ChunksFailed { .. } => "uploading",
            Self::ServerRejection { .. } => "completing",
        }
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return Self::rejection(status.as_u16(), e.to_string());
        }
        Self::Transfer(e.to_string())
    }
}
