//! Configuration module - upload session settings

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;

use crate::error::{Result, UploadError};

/// Default chunk size in bytes (10MiB)
pub const DEFAULT_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

/// Default number of chunk transfers in flight
pub const DEFAULT_CONCURRENCY: usize = 1;

/// Default retry budget per chunk (attempts after the first one)
pub const DEFAULT_MAX_RETRIES: u32 = 1;

/// Default per-attempt timeout in seconds
pub const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 120;

/// Default base delay before a retry, doubled on each further attempt
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

/// User-Agent header value
pub const DEFAULT_USER_AGENT: &str = concat!("vev-upload/", env!("CARGO_PKG_VERSION"), "/rust");

/// Optional configuration parameters for Config::new()
#[derive(Debug, Clone, Default)]
pub struct ConfigOptions {
    pub chunk_size: Option<u64>,
    pub concurrency: Option<usize>,
    pub max_retries: Option<u32>,
    pub attempt_timeout_secs: Option<u64>,
    pub retry_backoff_ms: Option<u64>,
    pub user_agent: Option<String>,
}

/// Immutable settings for one upload run
#[derive(Debug, Clone)]
pub struct Config {
    pub target_url: String,
    pub file_path: PathBuf,
    pub chunk_size: u64,
    pub concurrency: usize,
    pub max_retries: u32,
    pub attempt_timeout_secs: u64,
    pub retry_backoff_ms: u64,
    pub user_agent: String,
}

impl Config {
    /// Create a new Config with required target URL and file path, plus optional settings
    pub fn new(
        target_url: impl Into<String>,
        file_path: impl Into<PathBuf>,
        options: ConfigOptions,
    ) -> Result<Arc<Self>> {
        let target_url = normalize_url(&target_url.into())?;

        let file_path = file_path.into();
        if file_path.as_os_str().is_empty() {
            return Err(UploadError::InvalidArgument(
                "file path is required to start the upload".to_string(),
            ));
        }

        let chunk_size = options.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);
        if chunk_size == 0 {
            return Err(UploadError::InvalidArgument(
                "chunk size must be greater than zero".to_string(),
            ));
        }

        let concurrency = options.concurrency.unwrap_or(DEFAULT_CONCURRENCY);
        if concurrency == 0 {
            return Err(UploadError::InvalidArgument(
                "concurrency must be at least 1".to_string(),
            ));
        }

        let attempt_timeout_secs = options
            .attempt_timeout_secs
            .unwrap_or(DEFAULT_ATTEMPT_TIMEOUT_SECS);
        if attempt_timeout_secs == 0 {
            return Err(UploadError::InvalidArgument(
                "attempt timeout must be greater than zero".to_string(),
            ));
        }

        Ok(Arc::new(Self {
            target_url,
            file_path,
            chunk_size,
            concurrency,
            max_retries: options.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            attempt_timeout_secs,
            retry_backoff_ms: options.retry_backoff_ms.unwrap_or(DEFAULT_RETRY_BACKOFF_MS),
            user_agent: options
                .user_agent
                .filter(|ua| !ua.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        }))
    }

    /// Strictly sequential uploads without retries
    pub fn legacy_sequential(
        target_url: impl Into<String>,
        file_path: impl Into<PathBuf>,
    ) -> Result<Arc<Self>> {
        Self::new(
            target_url,
            file_path,
            ConfigOptions {
                concurrency: Some(1),
                max_retries: Some(0),
                ..Default::default()
            },
        )
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// URL of the completion endpoint
    pub fn completion_url(&self) -> String {
        format!("{}/completed", self.target_url)
    }
}

/// Validate an http(s) URL and strip trailing slashes
pub fn normalize_url(raw: &str) -> Result<String> {
    validate_url(raw.trim().trim_end_matches('/'))
}

/// Validate an http(s) URL, keeping its path exactly as given
pub fn validate_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(UploadError::InvalidArgument(
            "url required for all requests".to_string(),
        ));
    }

    let parsed = Url::parse(trimmed)
        .map_err(|e| UploadError::InvalidArgument(format!("invalid url '{}': {}", trimmed, e)))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(UploadError::InvalidArgument(format!(
            "unsupported url scheme '{}'",
            parsed.scheme()
        )));
    }

    Ok(trimmed.to_string())
}
