use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Lifecycle state of a queue row. Stored as text in `oxen_queue.status`.
///
/// `waiting -> processing -> {success, error}`; `processing -> stuck ->
/// waiting` via the recoverer. Terminal rows (`success`, `error`) are never
/// mutated again by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Waiting,
    Processing,
    Success,
    Error,
    Stuck,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Waiting => "waiting",
            JobStatus::Processing => "processing",
            JobStatus::Success => "success",
            JobStatus::Error => "error",
            JobStatus::Stuck => "stuck",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "waiting" => Ok(JobStatus::Waiting),
            "processing" => Ok(JobStatus::Processing),
            "success" => Ok(JobStatus::Success),
            "error" => Ok(JobStatus::Error),
            "stuck" => Ok(JobStatus::Stuck),
            other => Err(anyhow!("invalid job status: {other}")),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row in `oxen_queue`.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: i64,
    pub job_type: String,
    pub status: JobStatus,
    pub body: Value,
    /// Lower sorts earlier. Defaults to the enqueue wall-clock in millis.
    pub priority: i64,
    /// `created_ts` in storage; doubles as the delayed-execution eligibility bound.
    pub start_time: DateTime<Utc>,
    /// Non-null exactly when a worker holds a live claim on this row.
    pub batch_id: Option<i64>,
    pub unique_key: Option<u32>,
    pub started_ts: Option<DateTime<Utc>>,
    pub result: Option<Value>,
    pub recovered: bool,
    pub running_time: Option<i32>,
}

/// A job submitted for enqueue, before the Store assigns `id`.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_type: String,
    pub body: Value,
    /// Defaults to the enqueue wall-clock in millis if `None` (FIFO under ties).
    pub priority: Option<i64>,
    /// Earliest eligible moment; defaults to now (immediately eligible).
    pub start_time: Option<DateTime<Utc>>,
    pub unique_key: Option<u32>,
}

impl NewJob {
    pub fn new(job_type: impl Into<String>, body: Value) -> Self {
        Self {
            job_type: job_type.into(),
            body,
            priority: None,
            start_time: None,
            unique_key: None,
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = Some(start_time);
        self
    }

    pub fn with_unique_key(mut self, unique_key: u32) -> Self {
        self.unique_key = Some(unique_key);
        self
    }
}

/// Outcome of a single enqueue call — a `unique_key` conflict is reported
/// here, not surfaced as an error.
#[derive(Debug, Clone)]
pub enum EnqueueOutcome {
    Inserted(i64),
    Deduplicated,
}
