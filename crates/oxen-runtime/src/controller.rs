//! Controller: the composition root. Owns the `Store`, starts/stops
//! Dispatcher + Recoverer pairs per `job_type`, and exposes enqueue as a
//! thin pass-through.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use oxen_core::{EnqueueOutcome, NewJob, OnJobError, OnJobSuccess, WorkFn};
use oxen_db::{assert_extra_fields_are_columns, Store};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::dispatcher::{self, DispatcherParams, DispatcherState, DispatcherStatus};
use crate::recoverer;

/// Everything needed to start processing one `job_type`. Mirrors
/// `oxen-config::ProcessorConfig` but kept dependency-free of `oxen-config`
/// so `oxen-runtime` has no ambient-config coupling; callers translate.
pub struct ProcessorSpec {
    pub job_type: String,
    pub concurrency: usize,
    pub timeout: Duration,
    pub recover_stuck_jobs: bool,
    pub recovery_threshold: Duration,
    pub fastest_polling_rate: Duration,
    pub slowest_polling_rate: Duration,
    pub polling_backoff_rate: f64,
    pub work_fn: Arc<dyn WorkFn>,
    pub on_success: Arc<dyn OnJobSuccess>,
    pub on_error: Arc<dyn OnJobError>,
}

impl ProcessorSpec {
    fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            bail!("ConfigurationError: {}: concurrency must be > 0", self.job_type);
        }
        if self.recover_stuck_jobs && self.recovery_threshold <= self.timeout {
            bail!(
                "ConfigurationError: {}: recovery_threshold ({:?}) must exceed timeout ({:?})",
                self.job_type,
                self.recovery_threshold,
                self.timeout,
            );
        }
        Ok(())
    }
}

struct RunningProcessor {
    shutdown_tx: watch::Sender<bool>,
    dispatcher: JoinHandle<()>,
    recoverer: Option<JoinHandle<()>>,
    dispatcher_state: Arc<DispatcherState>,
}

/// The single entry point callers (oxen-daemon, oxen-cli) drive. One
/// `Controller` may run several `job_type`s concurrently, each with its own
/// Dispatcher and (optionally) Recoverer.
pub struct Controller {
    store: Store,
    running: HashMap<String, RunningProcessor>,
}

impl Controller {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            running: HashMap::new(),
        }
    }

    pub async fn enqueue(&self, job: &NewJob) -> Result<EnqueueOutcome> {
        self.store.enqueue(job).await
    }

    pub async fn enqueue_many(&self, jobs: &[NewJob]) -> Result<Vec<EnqueueOutcome>> {
        self.store.enqueue_many(jobs).await
    }

    /// Start a Dispatcher (and, unless disabled, a Recoverer) for `spec.job_type`.
    /// Fatal (returns `Err`, starts nothing) if `recovery_threshold` does not
    /// exceed `timeout` while recovery is enabled, or if the Store's
    /// configured `extraFields` reference a column that doesn't exist.
    pub async fn start_processing(&mut self, spec: ProcessorSpec) -> Result<()> {
        spec.validate()?;

        if self.running.contains_key(&spec.job_type) {
            bail!("job_type '{}' is already being processed", spec.job_type);
        }

        // Fail fast on a misconfigured extraFields entry rather than
        // surfacing an opaque SQL error on the first enqueue.
        assert_extra_fields_are_columns(self.store.pool(), self.store.extra_fields())
            .await
            .with_context(|| format!("extraFields validation for job_type '{}'", spec.job_type))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let job_type = spec.job_type.clone();

        let dispatcher_params = DispatcherParams {
            job_type: spec.job_type.clone(),
            concurrency: spec.concurrency,
            timeout: spec.timeout,
            fastest_polling_rate: spec.fastest_polling_rate,
            slowest_polling_rate: spec.slowest_polling_rate,
            polling_backoff_rate: spec.polling_backoff_rate,
            work_fn: spec.work_fn,
            on_success: spec.on_success,
            on_error: spec.on_error,
        };

        let dispatcher_state = DispatcherState::new();
        let dispatcher_store = self.store.clone();
        let dispatcher_shutdown = shutdown_rx.clone();
        let dispatcher_state_task = dispatcher_state.clone();
        let dispatcher = tokio::spawn(async move {
            dispatcher::run(dispatcher_store, dispatcher_params, dispatcher_state_task, dispatcher_shutdown).await;
        });

        let recoverer = if spec.recover_stuck_jobs {
            let recoverer_store = self.store.clone();
            let recoverer_job_type = job_type.clone();
            let recoverer_shutdown = shutdown_rx.clone();
            let recovery_threshold = spec.recovery_threshold;
            Some(tokio::spawn(async move {
                recoverer::run(recoverer_store, recoverer_job_type, recovery_threshold, recoverer_shutdown).await;
            }))
        } else {
            None
        };

        self.running.insert(
            job_type.clone(),
            RunningProcessor {
                shutdown_tx,
                dispatcher,
                recoverer,
                dispatcher_state,
            },
        );
        info!(job_type = %job_type, "processing started");
        Ok(())
    }

    /// Signal the Dispatcher/Recoverer for `job_type` to stop and wait for
    /// in-flight jobs to drain.
    pub async fn stop_processing(&mut self, job_type: &str) -> Result<()> {
        let Some(proc) = self.running.remove(job_type) else {
            bail!("job_type '{job_type}' is not currently being processed");
        };
        let _ = proc.shutdown_tx.send(true);
        proc.dispatcher
            .await
            .with_context(|| format!("dispatcher task for '{job_type}' panicked"))?;
        if let Some(recoverer) = proc.recoverer {
            recoverer
                .await
                .with_context(|| format!("recoverer task for '{job_type}' panicked"))?;
        }
        info!(job_type = %job_type, "processing stopped");
        Ok(())
    }

    /// Stop every running processor, draining each in turn.
    pub async fn shutdown(&mut self) -> Result<()> {
        let job_types: Vec<String> = self.running.keys().cloned().collect();
        for job_type in job_types {
            self.stop_processing(&job_type).await?;
        }
        Ok(())
    }

    pub fn is_processing(&self, job_type: &str) -> bool {
        self.running.contains_key(job_type)
    }

    pub fn active_job_types(&self) -> Vec<String> {
        self.running.keys().cloned().collect()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Snapshot of `{inflight, fetching, current_batch_ids}` per running
    /// `job_type`.
    pub fn debug(&self) -> HashMap<String, DispatcherStatus> {
        self.running
            .iter()
            .map(|(job_type, proc)| (job_type.clone(), proc.dispatcher_state.snapshot()))
            .collect()
    }
}
