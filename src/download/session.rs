//! Download session - streams a URL straight into a local file

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use futures::StreamExt;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::{validate_url, DEFAULT_USER_AGENT};
use crate::error::{Result, UploadError};
use crate::http_logger::{self, HttpResponseLog};
use crate::progress::{
    DownloadEvent, DownloadProgress, ProgressBus, ProgressThrottler, DEFAULT_THROTTLE_INTERVAL_MS,
};

/// Maximum idle time between body reads, in seconds
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Default)]
struct DownloadStatus {
    started: bool,
    completed: bool,
    last_progress: Option<DownloadProgress>,
    last_error: Option<String>,
}

/// One download of `download_url` into `file_path`
pub struct DownloadSession {
    download_url: String,
    file_path: PathBuf,
    client: Client,
    throttle_interval: Duration,
    progress: ProgressBus<DownloadEvent>,
    status: Mutex<DownloadStatus>,
}

impl DownloadSession {
    pub fn new(download_url: impl Into<String>, file_path: impl Into<PathBuf>) -> Result<Self> {
        let download_url = validate_url(&download_url.into())?;
        let file_path = file_path.into();
        if file_path.as_os_str().is_empty() {
            return Err(UploadError::InvalidArgument(
                "file path is required to start the download".to_string(),
            ));
        }

        let client = Client::builder()
            .read_timeout(read_timeout())
            .user_agent(DEFAULT_USER_AGENT)
            .build()?;

        Ok(Self {
            download_url,
            file_path,
            client,
            throttle_interval: Duration::from_millis(DEFAULT_THROTTLE_INTERVAL_MS),
            progress: ProgressBus::new(),
            status: Mutex::new(DownloadStatus::default()),
        })
    }

    /// Minimum spacing between progress events
    pub fn with_throttle_interval(mut self, interval: Duration) -> Self {
        self.throttle_interval = interval;
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn download_url(&self) -> &str {
        &self.download_url
    }

    pub fn file_path(&self) -> &PathBuf {
        &self.file_path
    }

    /// Register a progress listener
    pub fn on_progress<F>(&self, listener: F)
    where
        F: Fn(&DownloadEvent) + Send + Sync + 'static,
    {
        self.progress.subscribe(listener);
    }

    pub fn has_completed(&self) -> bool {
        self.lock_status().completed
    }

    pub fn last_progress(&self) -> Option<DownloadProgress> {
        self.lock_status().last_progress.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock_status().last_error.clone()
    }

    /// Download the whole body and return the destination path
    pub async fn start(&self) -> Result<PathBuf> {
        {
            let mut status = self.lock_status();
            if status.started {
                return Err(UploadError::Usage(
                    "download session already started".to_string(),
                ));
            }
            status.started = true;
        }

        match self.run().await {
            Ok(path) => {
                info!("Download completed: {:?}", path);
                self.lock_status().completed = true;
                self.progress
                    .publish_final(&DownloadEvent::Completed { path: path.clone() });
                Ok(path)
            }
            Err(e) => {
                error!("Download failed: {}", e);
                let message = e.to_string();
                self.lock_status().last_error = Some(message.clone());
                self.progress.publish_final(&DownloadEvent::Error { message });
                Err(e)
            }
        }
    }

    async fn run(&self) -> Result<PathBuf> {
        info!("Starting download: {} -> {:?}", self.download_url, self.file_path);

        let request_id = Uuid::new_v4().to_string();
        let request_log = http_logger::build_request_log_if_enabled(
            "GET",
            &self.download_url,
            DEFAULT_USER_AGENT,
            &request_id,
            None,
        );

        let started = Instant::now();
        let response = self
            .client
            .get(&self.download_url)
            .header("x-request-id", &request_id)
            .send()
            .await
            .map_err(|e| UploadError::from_http(e, read_timeout()))?;

        let status = response.status();
        if let Some(log) = &request_log {
            http_logger::log_request(
                log,
                Some(&HttpResponseLog {
                    status: status.as_u16(),
                    headers: http_logger::extract_response_headers(&response),
                    body: None,
                }),
                started.elapsed().as_millis() as u64,
                None,
            );
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(UploadError::rejection(
                status.as_u16(),
                http_logger::truncate_utf8_safe(&text, 512),
            ));
        }

        let total_bytes = response.content_length();
        let mut file = File::create(&self.file_path)
            .await
            .map_err(|e| UploadError::filesystem(&self.file_path, e))?;

        let throttler = ProgressThrottler::new(self.throttle_interval);
        let mut transferred_bytes = 0u64;
        let mut body = response.bytes_stream();

        while let Some(bytes) = body.next().await {
            let bytes = bytes.map_err(|e| UploadError::from_http(e, read_timeout()))?;
            file.write_all(&bytes)
                .await
                .map_err(|e| UploadError::filesystem(&self.file_path, e))?;
            transferred_bytes += bytes.len() as u64;

            if throttler.should_emit() {
                self.emit_progress(transferred_bytes, total_bytes, started.elapsed());
            }
        }

        file.flush()
            .await
            .map_err(|e| UploadError::filesystem(&self.file_path, e))?;

        self.emit_progress(transferred_bytes, total_bytes, started.elapsed());

        Ok(self.file_path.clone())
    }

    fn emit_progress(&self, transferred_bytes: u64, total_bytes: Option<u64>, elapsed: Duration) {
        let snapshot = DownloadProgress {
            percent: percent_of(transferred_bytes, total_bytes),
            transferred_bytes,
            total_bytes,
            time_elapsed: elapsed,
        };
        self.lock_status().last_progress = Some(snapshot.clone());
        self.progress.publish(&DownloadEvent::Progress(snapshot));
    }

    fn lock_status(&self) -> std::sync::MutexGuard<'_, DownloadStatus> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn read_timeout() -> Duration {
    Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS)
}

fn percent_of(transferred: u64, total: Option<u64>) -> Option<f64> {
    match total {
        Some(0) => Some(100.0),
        Some(total) => Some((transferred as f64 / total as f64 * 100.0).min(100.0)),
        None => None,
    }
}
