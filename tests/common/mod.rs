//! Shared helpers for upload tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use vev_upload::progress::{ProgressBus, ProgressEvent, ProgressStatus};
use vev_upload::upload::{Chunk, ChunkResponse, ChunkTransport};
use vev_upload::{Result, UploadError};

/// Scripted reply for one chunk attempt
#[derive(Debug, Clone)]
pub enum Step {
    /// Reply with `"success": true`
    Accept,
    /// Reply 200 without a success indicator
    NoSuccessFlag,
    /// Fail at the transport level
    Fail(&'static str),
    /// Fail with a non-retryable error
    Fatal(&'static str),
    /// Fail as if the source file had disappeared
    Unreadable,
    /// Sleep for the given time, then accept
    Hang(Duration),
}

/// In-memory transport with per-chunk scripts and concurrency instrumentation
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<usize, VecDeque<Step>>>,
    latency: HashMap<usize, Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: Mutex<Vec<usize>>,
    finished: Mutex<Vec<usize>>,
    completions: AtomicUsize,
    completion_reply: Mutex<Option<Value>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            latency: HashMap::new(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            finished: Mutex::new(Vec::new()),
            completions: AtomicUsize::new(0),
            completion_reply: Mutex::new(Some(json!({"video": {"code": "mock-video"}}))),
        }
    }

    /// Replies for successive attempts of `index`; once exhausted, attempts succeed
    pub fn script(self, index: usize, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(index, steps.into_iter().collect());
        self
    }

    pub fn latency(mut self, index: usize, delay: Duration) -> Self {
        self.latency.insert(index, delay);
        self
    }

    /// `None` makes the completion request fail with a 400 rejection
    pub fn completion_reply(self, reply: Option<Value>) -> Self {
        *self.completion_reply.lock().unwrap() = reply;
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<usize> {
        self.calls.lock().unwrap().clone()
    }

    /// Chunk indexes in the order their attempts returned
    pub fn finished(&self) -> Vec<usize> {
        self.finished.lock().unwrap().clone()
    }

    pub fn attempts_for(&self, index: usize) -> usize {
        self.calls().iter().filter(|i| **i == index).count()
    }

    pub fn completions(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }
}

impl ChunkTransport for ScriptedTransport {
    async fn send_chunk(&self, chunk: &Chunk) -> Result<ChunkResponse> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().unwrap().push(chunk.index);

        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&chunk.index)
            .and_then(|steps| steps.pop_front())
            .unwrap_or(Step::Accept);

        if let Some(delay) = self.latency.get(&chunk.index) {
            tokio::time::sleep(*delay).await;
        }

        let reply = match step {
            Step::Accept => Ok(ChunkResponse::accepted(json!({"success": true}))),
            Step::NoSuccessFlag => Ok(ChunkResponse::from_body(200, r#"{"ok":true}"#)),
            Step::Fail(msg) => Err(UploadError::Transfer(msg.to_string())),
            Step::Fatal(msg) => Err(UploadError::Usage(msg.to_string())),
            Step::Unreadable => Err(UploadError::filesystem(
                "/missing/source.bin",
                std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
            )),
            Step::Hang(delay) => {
                tokio::time::sleep(delay).await;
                Ok(ChunkResponse::accepted(json!({"success": true})))
            }
        };

        self.finished.lock().unwrap().push(chunk.index);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        reply
    }

    async fn complete(&self) -> Result<Value> {
        self.completions.fetch_add(1, Ordering::SeqCst);
        let reply = self.completion_reply.lock().unwrap().clone();
        reply.ok_or_else(|| UploadError::rejection(400, "upload incomplete"))
    }
}

/// Collect every event published on `bus`
pub fn record(bus: &ProgressBus<ProgressEvent>) -> Arc<Mutex<Vec<ProgressEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    bus.subscribe(move |event: &ProgressEvent| sink.lock().unwrap().push(event.clone()));
    events
}

/// Statuses published for one chunk, in order
pub fn statuses_for(events: &[ProgressEvent], index: usize) -> Vec<ProgressStatus> {
    events
        .iter()
        .filter(|e| e.chunk_index == Some(index))
        .map(|e| e.status)
        .collect()
}

/// Write `len` deterministic bytes to a temp file
pub fn temp_file(dir: &tempfile::TempDir, name: &str, len: usize) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, data).unwrap();
    path
}
