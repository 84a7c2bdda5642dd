//! Shared runtime state for oxen-daemon.
//!
//! All types here are `Clone`-able (via `Arc`). Handlers receive
//! `State<Arc<AppState>>` from Axum; this module owns nothing async itself.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use oxen_config::{ProcessorConfig, QueueConfig};
use oxen_core::{JobView, NoopErrorCallback, NoopSuccessCallback, WorkFn};
use oxen_db::Store;
use oxen_runtime::{Controller, ProcessorSpec};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, Mutex, RwLock};

// ---------------------------------------------------------------------------
// BusMsg — SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    LogLine { level: String, msg: String },
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health / status responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Echoes the decoded body back as its result. The daemon binary ships this
/// as a stand-in work function so `run start` has something to dispatch
/// over HTTP without requiring a compiled-in user workload; an application
/// embedding `oxen-runtime` directly supplies its own `WorkFn` instead of
/// going through this binary at all.
pub struct EchoWorkFn;

#[async_trait]
impl WorkFn for EchoWorkFn {
    async fn call(&self, body: Value, _view: JobView) -> anyhow::Result<Value> {
        Ok(body)
    }
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Cloneable (Arc) handle shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    /// Static build metadata.
    pub build: BuildInfo,
    /// The single `Controller` this daemon drives. Mutex'd because
    /// `start_processing`/`stop_processing` take `&mut self`; `enqueue` is a
    /// thin pass-through and never holds the lock for long.
    pub controller: Arc<Mutex<Controller>>,
    /// `job_type -> ProcessorConfig`, loaded once at startup from the
    /// layered YAML config. `POST /v1/run/start` looks up the entry here so
    /// callers only need to name the `job_type`, not repeat its tuning.
    pub processors: Arc<RwLock<HashMap<String, ProcessorConfig>>>,
    /// Store-wide settings (polling rates, backoff) loaded once at startup
    /// from the same layered YAML config's `/queue` subtree.
    pub queue_cfg: QueueConfig,
}

impl AppState {
    pub fn new(store: Store, processors: HashMap<String, ProcessorConfig>, queue_cfg: QueueConfig) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);

        Self {
            bus,
            build: BuildInfo {
                service: "oxen-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            controller: Arc::new(Mutex::new(Controller::new(store))),
            processors: Arc::new(RwLock::new(processors)),
            queue_cfg,
        }
    }

    /// Build the `ProcessorSpec` `oxen-runtime` needs from a registered
    /// `ProcessorConfig`, wired to the built-in [`EchoWorkFn`] and no-op
    /// callbacks (the daemon's HTTP surface does not accept user code) and
    /// to this daemon's own `queue_cfg` polling rates — an operator's
    /// `queue.fastest_polling_rate_ms`/`slowest_polling_rate_ms`/
    /// `polling_backoff_rate` overrides apply to every `job_type` it runs.
    pub fn processor_spec(&self, cfg: &ProcessorConfig) -> ProcessorSpec {
        ProcessorSpec {
            job_type: cfg.job_type.clone(),
            concurrency: cfg.concurrency,
            timeout: cfg.timeout(),
            recover_stuck_jobs: cfg.recover_stuck_jobs,
            recovery_threshold: cfg.recovery_threshold(),
            fastest_polling_rate: self.queue_cfg.fastest_polling_rate(),
            slowest_polling_rate: self.queue_cfg.slowest_polling_rate(),
            polling_backoff_rate: self.queue_cfg.polling_backoff_rate,
            work_fn: Arc::new(EchoWorkFn),
            on_success: Arc::new(NoopSuccessCallback),
            on_error: Arc::new(NoopErrorCallback),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}
