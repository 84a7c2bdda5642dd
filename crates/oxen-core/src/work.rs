use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::job::Job;

/// Read-only view of the claimed row, handed to a work function alongside
/// its decoded body. Never exposes `batch_id` — the work function has no
/// business with the claim's internal handle.
#[derive(Debug, Clone)]
pub struct JobView {
    pub id: i64,
    pub job_type: String,
    pub priority: i64,
    pub attempt_started_at: DateTime<Utc>,
    pub recovered: bool,
}

impl JobView {
    pub fn from_job(job: &Job) -> Self {
        Self {
            id: job.id,
            job_type: job.job_type.clone(),
            priority: job.priority,
            attempt_started_at: job.started_ts.unwrap_or_else(Utc::now),
            recovered: job.recovered,
        }
    }
}

/// A user-supplied work function bound to one `job_type`.
///
/// The engine never inspects `body` beyond decoding it into JSON and, on
/// return, detecting the retry sentinel (`oxen_core::retry`). Any error
/// returned here is classified as a job failure; any value returned is
/// checked for the retry sentinel before being treated as success.
#[async_trait]
pub trait WorkFn: Send + Sync {
    async fn call(&self, body: Value, view: JobView) -> anyhow::Result<Value>;
}

/// Fires after a job finalizes `success`. Exceptions/panics raised here
/// MUST NOT propagate into the engine (§4.4 rule 4) — `Supervisor` catches
/// panics from this callback and logs them.
#[async_trait]
pub trait OnJobSuccess: Send + Sync {
    async fn call(&self, job: &Job, result: &Value);
}

/// Fires after a job finalizes `error` (including timeout).
#[async_trait]
pub trait OnJobError: Send + Sync {
    async fn call(&self, job: &Job, error: &Value);
}

/// Default no-op callbacks for processors that don't need one.
pub struct NoopSuccessCallback;

#[async_trait]
impl OnJobSuccess for NoopSuccessCallback {
    async fn call(&self, _job: &Job, _result: &Value) {}
}

pub struct NoopErrorCallback;

#[async_trait]
impl OnJobError for NoopErrorCallback {
    async fn call(&self, _job: &Job, _error: &Value) {}
}
