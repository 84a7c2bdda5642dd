//! Request and response types for all oxen-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests. No business logic lives here.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use oxen_core::EnqueueOutcome;
use oxen_runtime::DispatcherStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// /v1/status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherStatusDto {
    pub inflight: usize,
    pub fetching: bool,
    pub current_batch_ids: Vec<i64>,
}

impl From<DispatcherStatus> for DispatcherStatusDto {
    fn from(s: DispatcherStatus) -> Self {
        Self {
            inflight: s.inflight,
            fetching: s.fetching,
            current_batch_ids: s.current_batch_ids,
        }
    }
}

/// `Controller::debug()` snapshot plus daemon uptime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub daemon_uptime_secs: u64,
    pub active_job_types: Vec<String>,
    pub dispatchers: HashMap<String, DispatcherStatusDto>,
}

// ---------------------------------------------------------------------------
// /v1/enqueue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct EnqueueRequest {
    pub job_type: String,
    pub body: Value,
    pub priority: Option<i64>,
    pub start_time: Option<DateTime<Utc>>,
    pub unique_key: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EnqueueResponse {
    Inserted { id: i64 },
    Deduplicated,
}

impl From<EnqueueOutcome> for EnqueueResponse {
    fn from(o: EnqueueOutcome) -> Self {
        match o {
            EnqueueOutcome::Inserted(id) => EnqueueResponse::Inserted { id },
            EnqueueOutcome::Deduplicated => EnqueueResponse::Deduplicated,
        }
    }
}

// ---------------------------------------------------------------------------
// /v1/run/start  /v1/run/stop
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RunJobTypeRequest {
    pub job_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunStartedResponse {
    pub job_type: String,
    pub started: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunStoppedResponse {
    pub job_type: String,
    pub stopped: bool,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
