//! Chunk transport - the network seam of the upload engine

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use serde_json::Value;
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Result, UploadError};
use crate::http_logger::{self, HttpResponseLog};
use crate::upload::Chunk;

/// Maximum response text kept in error messages
const MAX_ERROR_BODY: usize = 512;

/// Server reply to one chunk submission
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkResponse {
    /// HTTP status of the reply
    pub status: u16,
    /// Whether the body carried an explicit success indicator
    pub success: bool,
    pub payload: Value,
}

impl ChunkResponse {
    /// Interpret a reply body; anything without `"success": true` (or 1) is a failure
    pub fn from_body(status: u16, body: &str) -> Self {
        let payload = serde_json::from_str::<Value>(body)
            .unwrap_or_else(|_| Value::String(body.to_string()));
        let success = match payload.get("success") {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_u64() == Some(1),
            _ => false,
        };
        Self {
            status,
            success,
            payload,
        }
    }

    pub fn accepted(payload: Value) -> Self {
        Self {
            status: 200,
            success: true,
            payload,
        }
    }
}

/// Sends chunks and the completion request for one upload target.
///
/// Calls for the same chunk are never issued concurrently; calls for
/// distinct chunks may be.
pub trait ChunkTransport: Send + Sync {
    /// Submit one chunk; transport failures are errors, negative replies are not
    fn send_chunk(&self, chunk: &Chunk) -> impl Future<Output = Result<ChunkResponse>> + Send;

    /// Tell the server every part has been sent and return its reply
    fn complete(&self) -> impl Future<Output = Result<Value>> + Send;
}

impl<T: ChunkTransport> ChunkTransport for Arc<T> {
    fn send_chunk(&self, chunk: &Chunk) -> impl Future<Output = Result<ChunkResponse>> + Send {
        (**self).send_chunk(chunk)
    }

    fn complete(&self) -> impl Future<Output = Result<Value>> + Send {
        (**self).complete()
    }
}

/// Multipart-over-HTTP transport
pub struct HttpTransport {
    client: Client,
    config: Arc<Config>,
}

impl HttpTransport {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.attempt_timeout())
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client, config })
    }

    /// Build the multipart form for a chunk, streaming its byte range from disk
    async fn build_form(&self, chunk: &Chunk) -> Result<Form> {
        let reader = chunk.open_reader(&self.config.file_path).await?;
        let body = Body::wrap_stream(ReaderStream::new(reader));

        let file_name = self
            .config
            .file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "blob".to_string());

        let part = Part::stream_with_length(body, chunk.size())
            .file_name(file_name)
            .mime_str("application/octet-stream")?;

        Ok(Form::new()
            .part("file_part", part)
            .text("part_index", chunk.index.to_string())
            .text("total_parts", chunk.total_parts.to_string())
            .text("total_file_size", chunk.total_file_size.to_string()))
    }

    /// POST a request and return status plus body text, logging both when enabled
    async fn post(
        &self,
        url: &str,
        form: Option<Form>,
        log_body: Option<String>,
    ) -> Result<(u16, String)> {
        let request_id = Uuid::new_v4().to_string();
        let request_log = http_logger::build_request_log_if_enabled(
            "POST",
            url,
            &self.config.user_agent,
            &request_id,
            log_body,
        );

        let mut request = self.client.post(url).header("x-request-id", &request_id);
        if let Some(form) = form {
            request = request.multipart(form);
        }

        let started = Instant::now();
        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                if let Some(log) = &request_log {
                    http_logger::log_request(
                        log,
                        None,
                        started.elapsed().as_millis() as u64,
                        Some(&e.to_string()),
                    );
                }
                return Err(UploadError::from_http(e, self.config.attempt_timeout()));
            }
        };

        let status = response.status().as_u16();
        let headers = if request_log.is_some() {
            http_logger::extract_response_headers(&response)
        } else {
            Vec::new()
        };
        let text = response
            .text()
            .await
            .map_err(|e| UploadError::from_http(e, self.config.attempt_timeout()))?;

        if let Some(log) = &request_log {
            http_logger::log_request(
                log,
                Some(&HttpResponseLog {
                    status,
                    headers,
                    body: Some(text.clone()),
                }),
                started.elapsed().as_millis() as u64,
                None,
            );
        }

        Ok((status, text))
    }
}

impl ChunkTransport for HttpTransport {
    async fn send_chunk(&self, chunk: &Chunk) -> Result<ChunkResponse> {
        let form = self.build_form(chunk).await?;
        let log_body = http_logger::describe_chunk_form(
            chunk.index,
            chunk.total_parts,
            chunk.total_file_size,
            chunk.size(),
        );

        let (status, text) = self
            .post(&self.config.target_url, Some(form), Some(log_body))
            .await?;

        debug!(
            "Chunk response: part={}, status={}, body={}",
            chunk.index,
            status,
            http_logger::truncate_utf8_safe(&text, MAX_ERROR_BODY)
        );

        if !(200..300).contains(&status) {
            return Err(UploadError::rejection(
                status,
                http_logger::truncate_utf8_safe(&text, MAX_ERROR_BODY),
            ));
        }

        Ok(ChunkResponse::from_body(status, &text))
    }

    async fn complete(&self) -> Result<Value> {
        let url = self.config.completion_url();
        let (status, text) = self.post(&url, None, None).await?;

        if !(200..300).contains(&status) {
            return Err(UploadError::rejection(
                status,
                http_logger::truncate_utf8_safe(&text, MAX_ERROR_BODY),
            ));
        }

        serde_json::from_str(&text).map_err(|e| {
            UploadError::rejection(status, format!("invalid completion response: {}", e))
        })
    }
}
