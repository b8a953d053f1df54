//! Progress event types

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::upload::Chunk;

/// Status carried by an upload progress event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressStatus {
    /// First attempt for a chunk is starting
    Uploading,
    /// A further attempt for a chunk is starting
    Retrying,
    /// Chunk accepted by the server
    Uploaded,
    /// An attempt failed at the transport level
    ErrorRetrying,
    /// An attempt got a response without a success indicator
    ErrorDuringRetry,
    /// Chunk exhausted its attempts
    Failed,
    /// Completion request is about to be sent
    Completing,
    /// Completion request succeeded
    Completed,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploading => "uploading",
            Self::Retrying => "retrying",
            Self::Uploaded => "uploaded",
            Self::ErrorRetrying => "error-retrying",
            Self::ErrorDuringRetry => "error-during-retry",
            Self::Failed => "failed",
            Self::Completing => "completing",
            Self::Completed => "completed",
        }
    }

    /// Whether no further event follows for the same chunk or session
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Uploaded | Self::Failed | Self::Completed)
    }
}

impl std::fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable snapshot delivered to upload listeners
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub status: ProgressStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
    /// Index of the last chunk (total parts - 1)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_indexes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
}

impl ProgressEvent {
    pub fn for_chunk(status: ProgressStatus, chunk: &Chunk) -> Self {
        Self {
            status,
            chunk_index: Some(chunk.index),
            total_indexes: Some(chunk.total_parts.saturating_sub(1)),
            total_size: Some(chunk.total_file_size),
            error: None,
            response: None,
        }
    }

    pub fn chunk_error(status: ProgressStatus, chunk: &Chunk, error: impl ToString) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::for_chunk(status, chunk)
        }
    }

    /// Terminal event for a session that ended in an error
    pub fn session_failed(error: impl ToString) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::session(ProgressStatus::Failed)
        }
    }

    pub fn completing() -> Self {
        Self::session(ProgressStatus::Completing)
    }

    pub fn completed(response: serde_json::Value) -> Self {
        Self {
            response: Some(response),
            ..Self::session(ProgressStatus::Completed)
        }
    }

    fn session(status: ProgressStatus) -> Self {
        Self {
            status,
            chunk_index: None,
            total_indexes: None,
            total_size: None,
            error: None,
            response: None,
        }
    }
}

/// Download progress snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadProgress {
    /// 0.0-100.0, `None` when the server sent no content length
    pub percent: Option<f64>,
    pub transferred_bytes: u64,
    pub total_bytes: Option<u64>,
    pub time_elapsed: Duration,
}

/// Event delivered to download listeners
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum DownloadEvent {
    Progress(DownloadProgress),
    Completed { path: PathBuf },
    Error { message: String },
}

impl DownloadEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress(_))
    }
}
