//! Per-chunk retry policy

use std::time::Duration;

use serde_json::Value;
use tracing::{error, warn};

use crate::config::Config;
use crate::error::{Result, UploadError};
use crate::progress::{ProgressBus, ProgressEvent, ProgressStatus};
use crate::upload::{Chunk, ChunkTransport};

/// Maximum exponent for retry backoff (base * 2^6)
const MAX_BACKOFF_SHIFT: u32 = 6;

/// Lifecycle of one chunk; only ever moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    Pending,
    Uploading,
    Retrying,
    Uploaded,
    Failed,
}

impl ChunkState {
    pub fn can_advance_to(self, next: ChunkState) -> bool {
        use ChunkState::*;
        matches!(
            (self, next),
            (Pending, Uploading)
                | (Uploading, Retrying)
                | (Retrying, Retrying)
                | (Uploading | Retrying, Uploaded | Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Uploaded | Self::Failed)
    }
}

/// Terminal result of running a chunk through the retry policy
#[derive(Debug)]
pub struct ChunkOutcome {
    pub index: usize,
    state: ChunkState,
    pub attempts_used: u32,
    pub last_error: Option<UploadError>,
    /// Body of the accepted reply
    pub response: Option<Value>,
}

impl ChunkOutcome {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            state: ChunkState::Pending,
            attempts_used: 0,
            last_error: None,
            response: None,
        }
    }

    pub fn state(&self) -> ChunkState {
        self.state
    }

    pub fn is_uploaded(&self) -> bool {
        self.state == ChunkState::Uploaded
    }

    fn advance(&mut self, next: ChunkState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "chunk {} cannot move from {:?} to {:?}",
            self.index,
            self.state,
            next
        );
        self.state = next;
    }
}

/// Bounded retries around a single chunk transfer
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    attempt_timeout: Duration,
    backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, attempt_timeout: Duration, backoff: Duration) -> Self {
        Self {
            max_retries,
            attempt_timeout,
            backoff,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.max_retries,
            config.attempt_timeout(),
            config.retry_backoff(),
        )
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Initial attempt plus retries
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before the attempt following attempt number `attempts_used`
    pub fn backoff_for(&self, attempts_used: u32) -> Duration {
        let shift = attempts_used.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
        self.backoff.saturating_mul(1 << shift)
    }

    /// Drive one chunk to a terminal outcome, publishing its lifecycle events.
    ///
    /// Attempts run strictly one after another. An error status is only
    /// published for attempts that will be retried. The last event published
    /// for the chunk is `uploaded` or `failed`, matching the outcome.
    pub async fn run<T: ChunkTransport>(
        &self,
        chunk: &Chunk,
        transport: &T,
        progress: &ProgressBus<ProgressEvent>,
    ) -> ChunkOutcome {
        let mut outcome = ChunkOutcome::new(chunk.index);
        let max_attempts = self.max_attempts();

        loop {
            let (state, status) = if outcome.attempts_used == 0 {
                (ChunkState::Uploading, ProgressStatus::Uploading)
            } else {
                (ChunkState::Retrying, ProgressStatus::Retrying)
            };
            outcome.advance(state);
            progress.publish(&ProgressEvent::for_chunk(status, chunk));
            outcome.attempts_used += 1;

            let err = match self.attempt(chunk, transport).await {
                Ok(payload) => {
                    outcome.advance(ChunkState::Uploaded);
                    outcome.last_error = None;
                    outcome.response = Some(payload);
                    progress.publish(&ProgressEvent::for_chunk(ProgressStatus::Uploaded, chunk));
                    return outcome;
                }
                Err(e) => e,
            };

            if !err.is_retryable() || outcome.attempts_used >= max_attempts {
                error!(
                    "Chunk {}/{} failed after {} attempt(s): {}",
                    chunk.index + 1,
                    chunk.total_parts,
                    outcome.attempts_used,
                    err
                );
                progress.publish(&ProgressEvent::chunk_error(
                    ProgressStatus::Failed,
                    chunk,
                    &err,
                ));
                outcome.advance(ChunkState::Failed);
                outcome.last_error = Some(err);
                return outcome;
            }

            let status = match err {
                UploadError::ServerRejection { .. } => ProgressStatus::ErrorDuringRetry,
                _ => ProgressStatus::ErrorRetrying,
            };
            progress.publish(&ProgressEvent::chunk_error(status, chunk, &err));

            let wait = self.backoff_for(outcome.attempts_used);
            warn!(
                "Chunk {}/{} failed (attempt {}/{}): {}, retrying in {}ms...",
                chunk.index + 1,
                chunk.total_parts,
                outcome.attempts_used,
                max_attempts,
                err,
                wait.as_millis()
            );
            outcome.last_error = Some(err);
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
        }
    }

    /// One bounded attempt; a reply without a success indicator is an error
    async fn attempt<T: ChunkTransport>(&self, chunk: &Chunk, transport: &T) -> Result<Value> {
        let response = tokio::time::timeout(self.attempt_timeout, transport.send_chunk(chunk))
            .await
            .map_err(|_| UploadError::Timeout(self.attempt_timeout))??;

        if response.success {
            Ok(response.payload)
        } else {
            Err(UploadError::rejection(
                response.status,
                "invalid response from upload server",
            ))
        }
    }
}
