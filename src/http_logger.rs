//! HTTP Request Logger
//!
//! Appends every chunk, completion and download request to a log file when
//! enabled via environment variable.
//! Set `VEV_HTTP_LOG=1` or `VEV_HTTP_LOG=true` to enable, and optionally
//! `VEV_HTTP_LOG_DIR` to choose the directory (defaults to `.vev-upload`).

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use chrono::Local;
use tracing::warn;

/// Environment variable to control HTTP logging
const ENV_HTTP_LOG: &str = "VEV_HTTP_LOG";

/// Environment variable overriding the log directory
const ENV_HTTP_LOG_DIR: &str = "VEV_HTTP_LOG_DIR";

/// Default log directory, relative to the working directory
const DEFAULT_LOG_DIR: &str = ".vev-upload";

/// Log file name
const LOG_FILE_NAME: &str = "http_requests.log";

/// Maximum body size to log (10KB)
const MAX_BODY_SIZE: usize = 10000;

/// Sensitive headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "set-cookie",
    "cookie",
    "x-api-key",
    "x-auth-token",
    "proxy-authorization",
];

/// Query parameters whose values are masked in logged URLs
const SENSITIVE_QUERY_PARAMS: &[&str] = &["api_token", "token", "access_token", "key", "sig"];

/// Global mutex for thread-safe log writing
static LOG_MUTEX: Mutex<()> = Mutex::new(());

/// Check if HTTP logging is enabled
pub fn is_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| {
        std::env::var(ENV_HTTP_LOG)
            .map(|v| is_truthy(&v))
            .unwrap_or(false)
    })
}

fn is_truthy(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v == "1" || v == "true" || v == "yes" || v == "on"
}

/// Resolve the log file path, creating its directory when missing
fn get_log_file_path() -> PathBuf {
    let log_dir = std::env::var(ENV_HTTP_LOG_DIR)
        .ok()
        .filter(|d| !d.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR));

    if !log_dir.exists() {
        if let Err(e) = fs::create_dir_all(&log_dir) {
            warn!("Failed to create {} directory: {}", log_dir.display(), e);
        }
    }
    log_dir.join(LOG_FILE_NAME)
}

/// HTTP request log entry
pub struct HttpRequestLog {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// HTTP response log entry
pub struct HttpResponseLog {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// Log an HTTP request and response
pub fn log_request(
    request: &HttpRequestLog,
    response: Option<&HttpResponseLog>,
    duration_ms: u64,
    error: Option<&str>,
) {
    if !is_enabled() {
        return;
    }

    let content = render_entry(request, response, duration_ms, error);
    if let Err(e) = write_log(&get_log_file_path(), &content) {
        warn!("Failed to write HTTP log: {}", e);
    }
}

/// Render one log entry
pub fn render_entry(
    request: &HttpRequestLog,
    response: Option<&HttpResponseLog>,
    duration_ms: u64,
    error: Option<&str>,
) -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
    let separator = "=".repeat(80);

    let mut log_content = String::new();
    log_content.push_str(&format!(
        "\n{}\n[{}] {} {}\n{}\n",
        separator,
        timestamp,
        request.method,
        mask_url(&request.url),
        separator
    ));

    log_content.push_str("\n--- Request Headers ---\n");
    for (name, value) in &request.headers {
        let display_value = mask_sensitive_header(name, value);
        log_content.push_str(&format!("{}: {}\n", name, display_value));
    }

    if let Some(body) = &request.body {
        log_content.push_str("\n--- Request Body ---\n");
        log_content.push_str(&format_body(body));
        log_content.push('\n');
    }

    if let Some(resp) = response {
        log_content.push_str(&format!("\n--- Response ({}ms) ---\n", duration_ms));
        log_content.push_str(&format!("Status: {}\n", resp.status));

        log_content.push_str("\n--- Response Headers ---\n");
        for (name, value) in &resp.headers {
            let display_value = mask_sensitive_header(name, value);
            log_content.push_str(&format!("{}: {}\n", name, display_value));
        }

        if let Some(body) = &resp.body {
            log_content.push_str("\n--- Response Body ---\n");
            log_content.push_str(&format_body(body));
            log_content.push('\n');
        }
    }

    if let Some(err) = error {
        log_content.push_str(&format!("\n--- Error ({}ms) ---\n", duration_ms));
        log_content.push_str(err);
        log_content.push('\n');
    }

    log_content.push_str(&format!("\n{}\n", separator));
    log_content
}

/// Write log content to file (thread-safe)
fn write_log(path: &Path, content: &str) -> std::io::Result<()> {
    // Acquire lock to prevent interleaved writes from concurrent chunk uploads
    let _guard = LOG_MUTEX.lock().unwrap_or_else(|e| e.into_inner());

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

/// Check if a header is sensitive and should be masked
pub fn is_sensitive_header(name: &str) -> bool {
    let name_lower = name.to_lowercase();
    SENSITIVE_HEADERS.iter().any(|h| name_lower == *h)
}

/// Mask sensitive header values
pub fn mask_sensitive_header(name: &str, value: &str) -> String {
    if is_sensitive_header(name) {
        mask_token(value)
    } else {
        value.to_string()
    }
}

/// Mask authorization token for security
pub fn mask_token(value: &str) -> String {
    if let Some(token) = value.strip_prefix("Bearer ") {
        match mask_middle(token) {
            Some(masked) => format!("Bearer {}", masked),
            None => "Bearer ****".to_string(),
        }
    } else {
        mask_middle(value).unwrap_or_else(|| "****".to_string())
    }
}

/// Keep the first and last four characters of values longer than eight (UTF-8 safe)
fn mask_middle(value: &str) -> Option<String> {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        return None;
    }
    let prefix: String = chars[..4].iter().collect();
    let suffix: String = chars[chars.len() - 4..].iter().collect();
    Some(format!("{}...{}", prefix, suffix))
}

/// Mask token-like query parameter values in a URL
pub fn mask_url(url: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };

    let masked: Vec<String> = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((name, value))
                if SENSITIVE_QUERY_PARAMS
                    .iter()
                    .any(|p| name.eq_ignore_ascii_case(p)) =>
            {
                format!("{}={}", name, mask_token(value))
            }
            _ => pair.to_string(),
        })
        .collect();

    format!("{}?{}", base, masked.join("&"))
}

/// Format body for logging with truncation (UTF-8 safe)
fn format_body(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        let pretty = serde_json::to_string_pretty(&json).unwrap_or_else(|_| body.to_string());
        truncate_utf8_safe(&pretty, MAX_BODY_SIZE)
    } else {
        truncate_utf8_safe(body, MAX_BODY_SIZE)
    }
}

/// Truncate string at UTF-8 character boundary (safe for multi-byte chars)
pub fn truncate_utf8_safe(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }

    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}...\n[truncated, total {} bytes]", &s[..end], s.len())
}

/// Summary line standing in for a multipart chunk body
pub fn describe_chunk_form(
    part_index: usize,
    total_parts: usize,
    total_file_size: u64,
    part_bytes: u64,
) -> String {
    format!(
        "multipart/form-data: file_part=<{} bytes> part_index={} total_parts={} total_file_size={}",
        part_bytes, part_index, total_parts, total_file_size
    )
}

/// Build a request log entry, or None when logging is disabled
pub fn build_request_log_if_enabled(
    method: &str,
    url: &str,
    user_agent: &str,
    request_id: &str,
    body: Option<String>,
) -> Option<HttpRequestLog> {
    if !is_enabled() {
        return None;
    }

    Some(HttpRequestLog {
        method: method.to_string(),
        url: url.to_string(),
        headers: vec![
            ("User-Agent".to_string(), user_agent.to_string()),
            ("x-request-id".to_string(), request_id.to_string()),
        ],
        body,
    })
}

/// Extract headers from reqwest Response
pub fn extract_response_headers(response: &reqwest::Response) -> Vec<(String, String)> {
    response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                value.to_str().unwrap_or("<binary>").to_string(),
            )
        })
        .collect()
}
