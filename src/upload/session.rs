//! Upload session - plans, uploads and finalizes one file

use std::sync::{Arc, Mutex};

use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{Result, UploadError};
use crate::progress::{ProgressBus, ProgressEvent};
use crate::upload::{
    plan_chunks, ChunkTransport, CompletionHandshake, CompletionResult, ConcurrentUploader,
    HttpTransport, RetryPolicy,
};

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Planning,
    Uploading,
    Completing,
    Done,
    Failed,
}

/// One logical upload of a whole file
pub struct UploadSession<T: ChunkTransport = HttpTransport> {
    config: Arc<Config>,
    transport: T,
    progress: ProgressBus<ProgressEvent>,
    state: Mutex<SessionState>,
}

impl UploadSession<HttpTransport> {
    /// Create a session that talks HTTP to `config.target_url`
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let transport = HttpTransport::new(config.clone())?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: ChunkTransport> UploadSession<T> {
    pub fn with_transport(config: Arc<Config>, transport: T) -> Self {
        Self {
            config,
            transport,
            progress: ProgressBus::new(),
            state: Mutex::new(SessionState::Created),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn state(&self) -> SessionState {
        *self.lock_state()
    }

    /// Register a progress listener
    pub fn on_progress<F>(&self, listener: F)
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        self.progress.subscribe(listener);
    }

    pub fn progress(&self) -> &ProgressBus<ProgressEvent> {
        &self.progress
    }

    /// Run the upload to completion and return the server's descriptor.
    ///
    /// May only be called once per session; later calls fail with
    /// `UploadError::Usage` without touching the network. A failed run ends
    /// with a one-shot session-level `failed` event instead of `completed`.
    pub async fn start(&self) -> Result<CompletionResult> {
        {
            let mut state = self.lock_state();
            if *state != SessionState::Created {
                return Err(UploadError::Usage(format!(
                    "upload session already started (state: {:?})",
                    *state
                )));
            }
            *state = SessionState::Planning;
        }

        let result = self.run().await;
        match &result {
            Ok(_) => self.set_state(SessionState::Done),
            Err(e) => {
                self.set_state(SessionState::Failed);
                self.progress.publish_final(&ProgressEvent::session_failed(e));
            }
        }
        result
    }

    async fn run(&self) -> Result<CompletionResult> {
        let file_path = &self.config.file_path;
        info!("Starting upload: {:?} -> {}", file_path, self.config.target_url);

        let metadata = tokio::fs::metadata(file_path)
            .await
            .map_err(|e| UploadError::filesystem(file_path, e))?;
        if !metadata.is_file() {
            return Err(UploadError::filesystem(
                file_path,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }

        let chunks = plan_chunks(metadata.len(), self.config.chunk_size)?;
        info!(
            "Planned {} chunks for {} bytes (chunk size: {} bytes)",
            chunks.len(),
            metadata.len(),
            self.config.chunk_size
        );

        self.set_state(SessionState::Uploading);
        let uploader = ConcurrentUploader::new(
            self.config.concurrency,
            RetryPolicy::from_config(&self.config),
        );
        let mut report = uploader
            .upload_all(&chunks, &self.transport, &self.progress)
            .await;

        // A fatal chunk error skips the completion request
        if let Some(err) = report.take_fatal() {
            error!("Upload aborted before completion: {}", err);
            return Err(err);
        }

        let failure = report.failure();
        self.set_state(SessionState::Completing);
        let completion =
            CompletionHandshake::run(&self.transport, &self.progress, failure.as_ref()).await;

        if let Some(err) = failure {
            if let Err(e) = &completion {
                warn!("Completion also failed after chunk failures: {}", e);
            }
            return Err(err);
        }
        completion
    }

    fn set_state(&self, next: SessionState) {
        *self.lock_state() = next;
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
