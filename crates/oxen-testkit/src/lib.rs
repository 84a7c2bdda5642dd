//! In-memory test doubles for driving the dispatch engine in scenario tests
//! without a real user workload.
//!
//! Everything here is `WorkFn`/`OnJobSuccess`/`OnJobError` glue plus small
//! `NewJob` builders — the engine itself is exercised exactly as a real
//! caller would exercise it, just against recorded-call doubles instead of
//! a production work function.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use oxen_core::{JobView, NewJob, OnJobError, OnJobSuccess, WorkFn};
use serde_json::Value;

pub use oxen_db::testkit_db_pool;

/// Succeeds immediately, echoing the body back as its result, and counts
/// how many times it was invoked.
#[derive(Default)]
pub struct CountingWorkFn {
    pub calls: Arc<AtomicUsize>,
}

impl CountingWorkFn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkFn for CountingWorkFn {
    async fn call(&self, body: Value, _view: JobView) -> anyhow::Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(body)
    }
}

/// Returns the retry sentinel on its first call per distinct job id, then
/// succeeds on every call after — exercises the requeue-then-redeliver path
/// without a real delay-sensitive work function.
pub struct RetryOnceWorkFn {
    pub delay_seconds: f64,
    seen: Mutex<Vec<i64>>,
    pub calls: Arc<AtomicUsize>,
}

impl RetryOnceWorkFn {
    pub fn new(delay_seconds: f64) -> Self {
        Self {
            delay_seconds,
            seen: Mutex::new(Vec::new()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl WorkFn for RetryOnceWorkFn {
    async fn call(&self, body: Value, view: JobView) -> anyhow::Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut seen = self.seen.lock().expect("seen poisoned");
        if seen.contains(&view.id) {
            Ok(body)
        } else {
            seen.push(view.id);
            Ok(serde_json::json!({ "_oxen_queue_retry_seconds": self.delay_seconds }))
        }
    }
}

/// Sleeps past any reasonable timeout on every call — drives the Supervisor
/// timeout-vs-completion race deterministically.
pub struct SleepingWorkFn {
    pub sleep: std::time::Duration,
    pub calls: Arc<AtomicUsize>,
}

impl SleepingWorkFn {
    pub fn new(sleep: std::time::Duration) -> Self {
        Self {
            sleep,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl WorkFn for SleepingWorkFn {
    async fn call(&self, body: Value, _view: JobView) -> anyhow::Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.sleep).await;
        Ok(body)
    }
}

/// Always fails — exercises the `error` finalize path and `on_job_error`.
#[derive(Default)]
pub struct FailingWorkFn {
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl WorkFn for FailingWorkFn {
    async fn call(&self, _body: Value, view: JobView) -> anyhow::Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("FailingWorkFn: deliberate failure for job {}", view.id)
    }
}

/// Records every `(job_id, result)` pair handed to `on_job_success`.
#[derive(Default)]
pub struct RecordingSuccessCallback {
    pub seen: Mutex<Vec<(i64, Value)>>,
}

#[async_trait]
impl OnJobSuccess for RecordingSuccessCallback {
    async fn call(&self, job: &oxen_core::Job, result: &Value) {
        self.seen
            .lock()
            .expect("seen poisoned")
            .push((job.id, result.clone()));
    }
}

/// Records every `(job_id, error)` pair handed to `on_job_error`.
#[derive(Default)]
pub struct RecordingErrorCallback {
    pub seen: Mutex<Vec<(i64, Value)>>,
}

#[async_trait]
impl OnJobError for RecordingErrorCallback {
    async fn call(&self, job: &oxen_core::Job, error: &Value) {
        self.seen
            .lock()
            .expect("seen poisoned")
            .push((job.id, error.clone()));
    }
}

/// Build a `NewJob` with a short, test-friendly body — `{"i": n}`.
pub fn make_job(job_type: &str, n: i64) -> NewJob {
    NewJob::new(job_type, serde_json::json!({ "i": n }))
}

/// A job_type unique to this test process + call site, so concurrently-run
/// scenario tests never contend over the same rows in a shared database.
pub fn make_job_type(prefix: &str) -> String {
    format!("{prefix}_{}", uuid::Uuid::new_v4().simple())
}
