//! Completion handshake

use serde_json::Value;
use tracing::{error, info};

use crate::error::{Result, UploadError};
use crate::progress::{ProgressBus, ProgressEvent};
use crate::upload::ChunkTransport;

/// Server-assigned metadata returned by a successful completion
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResult {
    /// Resource descriptor from the `video` field
    pub video: Value,
    /// Full completion response body
    pub response: Value,
}

/// Finalizes an upload once every chunk has settled
pub struct CompletionHandshake;

impl CompletionHandshake {
    /// Send the completion request once; failures are returned, never retried.
    ///
    /// Listeners get `completing` before the request. The one-shot
    /// `completed` event (after which they are unsubscribed) is only
    /// published when the server accepted and no chunk failed; otherwise
    /// the caller owns the terminal event.
    pub async fn run<T: ChunkTransport>(
        transport: &T,
        progress: &ProgressBus<ProgressEvent>,
        chunk_failure: Option<&UploadError>,
    ) -> Result<CompletionResult> {
        progress.publish(&ProgressEvent::completing());

        let result = transport.complete().await.and_then(Self::parse);
        match result {
            Ok(result) if chunk_failure.is_some() => {
                info!("Server accepted completion, but some chunks failed");
                Ok(result)
            }
            Ok(result) => {
                info!("Upload completed");
                progress.publish_final(&ProgressEvent::completed(result.response.clone()));
                Ok(result)
            }
            Err(e) => {
                error!("Completion failed: {}", e);
                Err(e)
            }
        }
    }

    /// Extract the video descriptor from a completion response
    pub fn parse(response: Value) -> Result<CompletionResult> {
        if response.get("success") == Some(&Value::Bool(false)) {
            let message = response
                .get("message")
                .or_else(|| response.get("error"))
                .and_then(Value::as_str)
                .unwrap_or("server reported unsuccessful completion")
                .to_string();
            return Err(UploadError::rejection(200, message));
        }

        match response.get("video") {
            Some(video) if !video.is_null() => Ok(CompletionResult {
                video: video.clone(),
                response,
            }),
            _ => Err(UploadError::rejection(
                200,
                "completion response has no video descriptor",
            )),
        }
    }
}
