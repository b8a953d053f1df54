//! Chunked upload engine

mod chunk;
mod completion;
mod retry;
mod session;
mod transport;
mod uploader;

pub use chunk::{chunk_count, plan_chunks, Chunk};
pub use completion::{CompletionHandshake, CompletionResult};
pub use retry::{ChunkOutcome, ChunkState, RetryPolicy};
pub use session::{SessionState, UploadSession};
pub use transport::{ChunkResponse, ChunkTransport, HttpTransport};
pub use uploader::{BatchReport, ConcurrentUploader};
