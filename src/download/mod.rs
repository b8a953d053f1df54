//! Single-stream file download

mod session;

pub use session::{DownloadSession, DEFAULT_READ_TIMEOUT_SECS};
