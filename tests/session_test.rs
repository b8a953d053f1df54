//! End-to-end upload session tests against a mock HTTP server

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{record, temp_file, ScriptedTransport, Step};
use serde_json::json;
use tempfile::TempDir;
use vev_upload::config::{Config, ConfigOptions};
use vev_upload::progress::{ProgressEvent, ProgressStatus};
use vev_upload::{SessionState, UploadError, UploadSession};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const UPLOAD_PATH: &str = "/upload/abc123";
const COMPLETION_PATH: &str = "/upload/abc123/completed";

fn options(chunk_size: u64, concurrency: usize, max_retries: u32) -> ConfigOptions {
    ConfigOptions {
        chunk_size: Some(chunk_size),
        concurrency: Some(concurrency),
        max_retries: Some(max_retries),
        attempt_timeout_secs: Some(5),
        retry_backoff_ms: Some(0),
        ..Default::default()
    }
}

async fn mount_chunk_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(UPLOAD_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .mount(server)
        .await;
}

async fn mount_completion_ok(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path(COMPLETION_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": true, "video": {"code": "v-42"}})),
        )
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn body_text(request: &Request) -> String {
    String::from_utf8_lossy(&request.body).to_string()
}

fn chunk_requests(requests: &[Request]) -> Vec<&Request> {
    requests
        .iter()
        .filter(|r| r.url.path() == UPLOAD_PATH)
        .collect()
}

#[tokio::test]
async fn test_single_byte_file_end_to_end() {
    let server = MockServer::start().await;
    mount_chunk_ok(&server).await;
    mount_completion_ok(&server, 1).await;

    let dir = TempDir::new().unwrap();
    let file = temp_file(&dir, "clip.bin", 1);
    let config = Config::new(
        format!("{}{}", server.uri(), UPLOAD_PATH),
        &file,
        options(1024, 1, 0),
    )
    .unwrap();

    let session = UploadSession::new(config).unwrap();
    let result = session.start().await.unwrap();

    assert_eq!(result.video, json!({"code": "v-42"}));
    assert_eq!(session.state(), SessionState::Done);

    let requests = server.received_requests().await.unwrap();
    let chunks = chunk_requests(&requests);
    assert_eq!(chunks.len(), 1);

    let body = body_text(chunks[0]);
    assert!(body.contains("name=\"file_part\""));
    assert!(body.contains("filename=\"clip.bin\""));
    assert!(body.contains("name=\"part_index\"\r\n\r\n0"));
    assert!(body.contains("name=\"total_parts\"\r\n\r\n1"));
    assert!(body.contains("name=\"total_file_size\"\r\n\r\n1"));
    assert!(chunks[0].headers.contains_key("x-request-id"));

    assert_eq!(requests.last().unwrap().url.path(), COMPLETION_PATH);
}

#[tokio::test]
async fn test_concurrent_upload_sends_every_part_then_completes() {
    let server = MockServer::start().await;
    mount_chunk_ok(&server).await;
    mount_completion_ok(&server, 1).await;

    let dir = TempDir::new().unwrap();
    let file = temp_file(&dir, "movie.mp4", 25);
    let config = Config::new(
        format!("{}{}", server.uri(), UPLOAD_PATH),
        &file,
        options(10, 2, 1),
    )
    .unwrap();

    let session = UploadSession::new(config).unwrap();
    let events = Arc::new(Mutex::new(Vec::<ProgressEvent>::new()));
    let sink = events.clone();
    session.on_progress(move |e| sink.lock().unwrap().push(e.clone()));

    session.start().await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let chunks = chunk_requests(&requests);
    assert_eq!(chunks.len(), 3);
    for index in 0..3 {
        let marker = format!("name=\"part_index\"\r\n\r\n{}", index);
        assert!(
            chunks.iter().any(|r| body_text(r).contains(&marker)),
            "part {} missing",
            index
        );
    }
    assert!(chunks
        .iter()
        .all(|r| body_text(r).contains("name=\"total_file_size\"\r\n\r\n25")));
    assert_eq!(requests.last().unwrap().url.path(), COMPLETION_PATH);

    let events = events.lock().unwrap();
    let uploaded = events
        .iter()
        .filter(|e| e.status == ProgressStatus::Uploaded)
        .count();
    assert_eq!(uploaded, 3);
    assert_eq!(events.last().unwrap().status, ProgressStatus::Completed);
    assert!(events
        .iter()
        .filter(|e| e.chunk_index.is_some())
        .all(|e| e.total_indexes == Some(2) && e.total_size == Some(25)));
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(UPLOAD_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_chunk_ok(&server).await;
    mount_completion_ok(&server, 1).await;

    let dir = TempDir::new().unwrap();
    let file = temp_file(&dir, "clip.bin", 8);
    let config = Config::new(
        format!("{}{}", server.uri(), UPLOAD_PATH),
        &file,
        options(1024, 1, 1),
    )
    .unwrap();

    let session = UploadSession::new(config).unwrap();
    let result = session.start().await;

    assert!(result.is_ok(), "{:?}", result.err());
    let requests = server.received_requests().await.unwrap();
    assert_eq!(chunk_requests(&requests).len(), 2);
}

#[tokio::test]
async fn test_reply_without_success_fails_upload_but_completion_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(UPLOAD_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .mount(&server)
        .await;
    mount_completion_ok(&server, 1).await;

    let dir = TempDir::new().unwrap();
    let file = temp_file(&dir, "clip.bin", 4);
    let config = Config::new(
        format!("{}{}", server.uri(), UPLOAD_PATH),
        &file,
        options(1024, 1, 0),
    )
    .unwrap();

    let session = UploadSession::new(config).unwrap();
    let err = session.start().await.unwrap_err();

    match err {
        UploadError::ChunksFailed { failed, total, .. } => {
            assert_eq!(failed, vec![0]);
            assert_eq!(total, 1);
        }
        other => panic!("expected ChunksFailed, got {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Failed);
}

#[tokio::test]
async fn test_completion_rejection() {
    let server = MockServer::start().await;
    mount_chunk_ok(&server).await;
    Mock::given(method("POST"))
        .and(path(COMPLETION_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_string("upload incomplete"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let file = temp_file(&dir, "clip.bin", 16);
    let config = Config::new(
        format!("{}{}", server.uri(), UPLOAD_PATH),
        &file,
        options(8, 2, 0),
    )
    .unwrap();

    let session = UploadSession::new(config).unwrap();
    let err = session.start().await.unwrap_err();

    match err {
        UploadError::ServerRejection { status, message } => {
            assert_eq!(status, 400);
            assert!(message.contains("upload incomplete"));
        }
        other => panic!("expected ServerRejection, got {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(session.progress().listener_count(), 0);
}

#[tokio::test]
async fn test_slow_completion_reports_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETION_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"video": {"code": "late"}}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let file = temp_file(&dir, "empty.bin", 0);
    let config = Config::new(
        format!("{}{}", server.uri(), UPLOAD_PATH),
        &file,
        ConfigOptions {
            attempt_timeout_secs: Some(1),
            ..options(1024, 1, 0)
        },
    )
    .unwrap();

    let session = UploadSession::new(config).unwrap();
    let err = session.start().await.unwrap_err();

    match err {
        UploadError::Timeout(limit) => assert_eq!(limit, Duration::from_secs(1)),
        other => panic!("expected Timeout, got {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Failed);
}

#[tokio::test]
async fn test_missing_file_sends_nothing() {
    let server = MockServer::start().await;

    let dir = TempDir::new().unwrap();
    let config = Config::new(
        format!("{}{}", server.uri(), UPLOAD_PATH),
        dir.path().join("absent.bin"),
        options(1024, 1, 0),
    )
    .unwrap();

    let session = UploadSession::new(config).unwrap();
    let err = session.start().await.unwrap_err();

    assert!(matches!(err, UploadError::Filesystem { .. }));
    assert_eq!(err.phase(), "planning");
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_file_only_completes() {
    let server = MockServer::start().await;
    mount_completion_ok(&server, 1).await;

    let dir = TempDir::new().unwrap();
    let file = temp_file(&dir, "empty.bin", 0);
    let config = Config::new(
        format!("{}{}", server.uri(), UPLOAD_PATH),
        &file,
        options(1024, 1, 0),
    )
    .unwrap();

    let session = UploadSession::new(config).unwrap();
    session.start().await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url.path(), COMPLETION_PATH);
}

#[tokio::test]
async fn test_session_cannot_be_restarted() {
    let dir = TempDir::new().unwrap();
    let file = temp_file(&dir, "clip.bin", 3);
    let config = Config::new("https://upload.example.com/u/1", &file, options(1024, 1, 0)).unwrap();

    let transport = Arc::new(ScriptedTransport::new());
    let session = UploadSession::with_transport(config, transport.clone());

    session.start().await.unwrap();
    let err = session.start().await.unwrap_err();

    assert!(matches!(err, UploadError::Usage(_)));
    assert_eq!(session.state(), SessionState::Done);
    assert_eq!(transport.calls().len(), 1);
    assert_eq!(transport.completions(), 1);
}

#[tokio::test]
async fn test_listeners_are_cleared_after_completion() {
    let dir = TempDir::new().unwrap();
    let file = temp_file(&dir, "clip.bin", 3);
    let config = Config::new("https://upload.example.com/u/1", &file, options(1024, 1, 0)).unwrap();

    let session = UploadSession::with_transport(config, ScriptedTransport::new());
    session.on_progress(|_| {});
    session.on_progress(|_| {});
    assert_eq!(session.progress().listener_count(), 2);

    session.start().await.unwrap();

    assert_eq!(session.progress().listener_count(), 0);
}

#[tokio::test]
async fn test_completion_sent_once_after_chunk_failures() {
    let dir = TempDir::new().unwrap();
    let file = temp_file(&dir, "clip.bin", 30);
    let config = Config::new("https://upload.example.com/u/1", &file, options(10, 3, 0)).unwrap();

    let transport = Arc::new(ScriptedTransport::new().script(1, vec![Step::Fail("reset")]));
    let session = UploadSession::with_transport(config, transport.clone());
    let events = record(session.progress());
    let err = session.start().await.unwrap_err();

    assert!(matches!(err, UploadError::ChunksFailed { ref failed, .. } if failed == &vec![1]));
    assert_eq!(err.phase(), "uploading");
    assert_eq!(transport.completions(), 1);
    assert_eq!(transport.calls().len(), 3);

    // A failed session never reports completed, even if the server accepted
    let events = events.lock().unwrap();
    assert!(events.iter().all(|e| e.status != ProgressStatus::Completed));
    let last = events.last().unwrap();
    assert_eq!(last.status, ProgressStatus::Failed);
    assert_eq!(last.chunk_index, None);
    assert!(last.error.as_deref().unwrap().contains("chunks failed"));
    assert_eq!(session.progress().listener_count(), 0);
}

#[tokio::test]
async fn test_file_removed_mid_upload_is_fatal() {
    let server = MockServer::start().await;
    mount_chunk_ok(&server).await;
    mount_completion_ok(&server, 0).await;

    let dir = TempDir::new().unwrap();
    let file = temp_file(&dir, "clip.bin", 30);
    let config = Config::new(
        format!("{}{}", server.uri(), UPLOAD_PATH),
        &file,
        options(10, 1, 2),
    )
    .unwrap();

    let session = UploadSession::new(config).unwrap();
    let events = record(session.progress());
    let doomed = file.clone();
    session.on_progress(move |e| {
        if e.status == ProgressStatus::Uploaded && e.chunk_index == Some(0) {
            let _ = std::fs::remove_file(&doomed);
        }
    });

    let err = session.start().await.unwrap_err();

    match &err {
        UploadError::Filesystem { path, .. } => assert_eq!(path, &file),
        other => panic!("expected Filesystem, got {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Failed);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(chunk_requests(&requests).len(), 1);
    assert!(requests.iter().all(|r| r.url.path() != COMPLETION_PATH));

    let events = events.lock().unwrap();
    assert!(events.iter().all(|e| e.status != ProgressStatus::Completing));
    assert_eq!(events.last().unwrap().status, ProgressStatus::Failed);
    assert_eq!(events.last().unwrap().chunk_index, None);
}
