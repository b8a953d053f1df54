//! Bounded-concurrency chunk uploader

use futures::stream::{self, StreamExt};
use tracing::info;

use crate::error::UploadError;
use crate::progress::{ProgressBus, ProgressEvent};
use crate::upload::{Chunk, ChunkOutcome, ChunkTransport, RetryPolicy};

/// Outcomes of one batch, ordered by chunk index
#[derive(Debug)]
pub struct BatchReport {
    pub outcomes: Vec<ChunkOutcome>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn uploaded_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_uploaded()).count()
    }

    pub fn failed_indexes(&self) -> Vec<usize> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_uploaded())
            .map(|o| o.index)
            .collect()
    }

    pub fn all_uploaded(&self) -> bool {
        self.outcomes.iter().all(|o| o.is_uploaded())
    }

    /// Take the first session-ending error a chunk hit, lowest index first
    pub fn take_fatal(&mut self) -> Option<UploadError> {
        self.outcomes
            .iter_mut()
            .find(|o| o.last_error.as_ref().is_some_and(UploadError::is_fatal))?
            .last_error
            .take()
    }

    /// Aggregated error when any chunk failed
    pub fn failure(&self) -> Option<UploadError> {
        let failed = self.failed_indexes();
        let first = failed.first()?;
        let first_error = self
            .outcomes
            .iter()
            .find(|o| o.index == *first)
            .and_then(|o| o.last_error.as_ref())
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string());

        Some(UploadError::ChunksFailed {
            failed,
            total: self.total(),
            first_error,
        })
    }
}

/// Runs chunks through a RetryPolicy with at most `concurrency` in flight
#[derive(Debug, Clone)]
pub struct ConcurrentUploader {
    concurrency: usize,
    policy: RetryPolicy,
}

impl ConcurrentUploader {
    pub fn new(concurrency: usize, policy: RetryPolicy) -> Self {
        Self {
            concurrency: concurrency.max(1),
            policy,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Upload every chunk and wait until all of them settle.
    ///
    /// Chunks are started in slice order; completion order is arbitrary. A
    /// failed chunk never cancels or delays the others.
    pub async fn upload_all<T: ChunkTransport>(
        &self,
        chunks: &[Chunk],
        transport: &T,
        progress: &ProgressBus<ProgressEvent>,
    ) -> BatchReport {
        info!(
            "Uploading {} chunks (concurrency: {}, retries: {})",
            chunks.len(),
            self.concurrency,
            self.policy.max_retries()
        );

        let mut outcomes: Vec<ChunkOutcome> = stream::iter(
            chunks
                .iter()
                .map(|chunk| self.policy.run(chunk, transport, progress)),
        )
        .buffer_unordered(self.concurrency)
        .collect()
        .await;

        outcomes.sort_by_key(|o| o.index);
        let report = BatchReport { outcomes };

        info!(
            "Chunk upload finished: {}/{} uploaded",
            report.uploaded_count(),
            report.total()
        );
        report
    }
}
