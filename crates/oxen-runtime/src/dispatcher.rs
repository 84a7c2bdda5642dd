//! Dispatcher: the main loop for one `job_type`. Claims up to the number of
//! free concurrency slots, hands each row to a Supervisor task, and paces
//! itself with the Adaptive Poller when there is nothing to do.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use oxen_core::{OnJobError, OnJobSuccess, WorkFn};
use oxen_db::Store;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::info;

use crate::poller::Poller;
use crate::supervisor;

/// Point-in-time view of one Dispatcher, surfaced by `Controller::debug()`.
#[derive(Debug, Clone, Default)]
pub struct DispatcherStatus {
    pub inflight: usize,
    pub fetching: bool,
    pub current_batch_ids: Vec<i64>,
}

/// Shared, lock-cheap counters a Dispatcher's own task updates and a
/// `Controller::debug()` caller reads from any other task. No coordination
/// with the Dispatcher loop is required beyond these atomics/mutex — the
/// Dispatcher never blocks on a reader.
#[derive(Debug, Default)]
pub struct DispatcherState {
    inflight: AtomicUsize,
    fetching: AtomicBool,
    // batch_id -> count of still-inflight jobs claimed under that batch.
    active_batches: Mutex<HashMap<i64, usize>>,
}

impl DispatcherState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn snapshot(&self) -> DispatcherStatus {
        DispatcherStatus {
            inflight: self.inflight.load(Ordering::SeqCst),
            fetching: self.fetching.load(Ordering::SeqCst),
            current_batch_ids: self
                .active_batches
                .lock()
                .expect("active_batches poisoned")
                .keys()
                .copied()
                .collect(),
        }
    }

    fn set_fetching(&self, v: bool) {
        self.fetching.store(v, Ordering::SeqCst);
    }

    fn job_claimed(&self, batch_id: Option<i64>) {
        self.inflight.fetch_add(1, Ordering::SeqCst);
        if let Some(bid) = batch_id {
            *self
                .active_batches
                .lock()
                .expect("active_batches poisoned")
                .entry(bid)
                .or_insert(0) += 1;
        }
    }

    fn job_finished(&self, batch_id: Option<i64>) {
        self.inflight.fetch_sub(1, Ordering::SeqCst);
        if let Some(bid) = batch_id {
            let mut batches = self.active_batches.lock().expect("active_batches poisoned");
            if let Some(count) = batches.get_mut(&bid) {
                *count -= 1;
                if *count == 0 {
                    batches.remove(&bid);
                }
            }
        }
    }
}

pub struct DispatcherParams {
    pub job_type: String,
    pub concurrency: usize,
    pub timeout: Duration,
    pub fastest_polling_rate: Duration,
    pub slowest_polling_rate: Duration,
    pub polling_backoff_rate: f64,
    pub work_fn: Arc<dyn WorkFn>,
    pub on_success: Arc<dyn OnJobSuccess>,
    pub on_error: Arc<dyn OnJobError>,
}

/// Run until `shutdown` is signalled, then drain in-flight jobs before
/// returning — graceful shutdown never abandons a claimed row mid-flight
/// without at least letting its Supervisor finish.
pub async fn run(
    store: Store,
    params: DispatcherParams,
    state: Arc<DispatcherState>,
    mut shutdown: watch::Receiver<bool>,
) {
    let DispatcherParams {
        job_type,
        concurrency,
        timeout,
        fastest_polling_rate,
        slowest_polling_rate,
        polling_backoff_rate,
        work_fn,
        on_success,
        on_error,
    } = params;

    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut poller = Poller::new(fastest_polling_rate, slowest_polling_rate, polling_backoff_rate);
    let mut inflight: JoinSet<()> = JoinSet::new();

    info!(job_type = %job_type, concurrency, "dispatcher started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let available = semaphore.available_permits();
        if available == 0 {
            tokio::select! {
                _ = inflight.join_next() => {}
                _ = shutdown.changed() => {}
            }
            continue;
        }

        // Await the Poller's schedule_next() unconditionally, every
        // iteration, before issuing a claim — this is the backpressure
        // floor: even a sustained stream of short jobs under high
        // concurrency can never drive claim_batch faster than
        // fastest_polling_rate.
        tokio::select! {
            _ = tokio::time::sleep(poller.current_delay()) => {}
            _ = shutdown.changed() => {}
        }
        if *shutdown.borrow() {
            break;
        }

        state.set_fetching(true);
        let claimed = match store.claim_batch(&job_type, available as i64).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(job_type = %job_type, error = %e, "claim_batch failed");
                Vec::new()
            }
        };
        state.set_fetching(false);

        if claimed.is_empty() {
            poller.on_empty_poll();
            continue;
        }

        poller.on_jobs_found();

        for job in claimed {
            let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");
            let store = store.clone();
            let work_fn = work_fn.clone();
            let on_success = on_success.clone();
            let on_error = on_error.clone();
            let batch_id = job.batch_id;
            state.job_claimed(batch_id);
            let state = state.clone();
            inflight.spawn(async move {
                let _permit = permit;
                supervisor::run_job(
                    store,
                    job,
                    timeout,
                    work_fn,
                    on_success,
                    on_error,
                    fastest_polling_rate,
                )
                .await;
                state.job_finished(batch_id);
            });
        }
    }

    info!(job_type = %job_type, "dispatcher draining in-flight jobs");
    while inflight.join_next().await.is_some() {}
    info!(job_type = %job_type, "dispatcher stopped");
}
