//! Progress reporting module
//!
//! Process-local fan-out of upload and download progress to registered listeners.

mod bus;
mod events;
mod throttle;

pub use bus::{Listener, ProgressBus};
pub use events::{DownloadEvent, DownloadProgress, ProgressEvent, ProgressStatus};
pub use throttle::{ProgressThrottler, DEFAULT_THROTTLE_INTERVAL_MS};
