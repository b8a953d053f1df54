//! vev-upload library - chunked, concurrent, retrying uploads to video hosts

pub mod config;
pub mod download;
pub mod error;
pub mod http_logger;
pub mod progress;
pub mod upload;

// Re-export commonly used types
pub use config::{Config, ConfigOptions};
pub use download::DownloadSession;
pub use error::{Result, UploadError};
pub use progress::{DownloadEvent, ProgressBus, ProgressEvent, ProgressStatus};
pub use upload::{
    plan_chunks, Chunk, ChunkTransport, CompletionResult, HttpTransport, SessionState,
    UploadSession,
};
