//! Per-job Supervisor: races a claimed job's work function against its
//! configured timeout, classifies the retry sentinel, and finalizes or
//! requeues through the `Store` — never touching Postgres directly beyond
//! that.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use oxen_core::{classify, Job, JobView, OnJobError, OnJobSuccess, WorkFn, WorkOutcome};
use oxen_db::Store;
use tracing::{error, warn};

/// Finalize calls are retried this many times before the row is abandoned
/// to the Stuck-job Recoverer — a transient connection blip shouldn't cost
/// a job its result on the first failed write.
const FINALIZE_MAX_ATTEMPTS: u32 = 3;

/// Run one claimed job to completion (or timeout) and finalize its row.
///
/// A work-function panic is caught and treated as an ordinary error so one
/// bad job can never take down the Dispatcher's task pool. A timeout
/// leaves the row in `processing` for the Stuck-job Recoverer to reclaim —
/// the work function may still be running remotely; only our wait ends.
pub async fn run_job(
    store: Store,
    job: Job,
    timeout: Duration,
    work_fn: Arc<dyn WorkFn>,
    on_success: Arc<dyn OnJobSuccess>,
    on_error: Arc<dyn OnJobError>,
    finalize_retry_delay: Duration,
) {
    let view = JobView::from_job(&job);
    let body = job.body.clone();

    let attempt = AssertUnwindSafe(work_fn.call(body, view)).catch_unwind();

    match tokio::time::timeout(timeout, attempt).await {
        Ok(Ok(Ok(value))) => match classify(value) {
            WorkOutcome::Success(result) => {
                finalize_success(&store, &job, result, &on_success, finalize_retry_delay).await;
            }
            WorkOutcome::Retry { delay_seconds } => {
                let delay = chrono::Duration::milliseconds((delay_seconds * 1000.0) as i64);
                if let Err(e) = store.requeue(job.id, delay).await {
                    error!(job_id = job.id, error = %e, "requeue failed");
                }
            }
        },
        Ok(Ok(Err(e))) => {
            let payload = serde_json::json!({ "error": e.to_string() });
            finalize_error(&store, &job, payload, &on_error, finalize_retry_delay).await;
        }
        Ok(Err(panic)) => {
            let msg = panic_message(&panic);
            error!(job_id = job.id, panic = %msg, "work function panicked");
            let payload = serde_json::json!({ "error": format!("panic: {msg}") });
            finalize_error(&store, &job, payload, &on_error, finalize_retry_delay).await;
        }
        Err(_elapsed) => {
            warn!(job_id = job.id, timeout_secs = timeout.as_secs(), "job exceeded timeout");
            let payload = serde_json::json!({
                "error": format!("timed out after {} seconds", timeout.as_secs()),
            });
            finalize_error(&store, &job, payload, &on_error, finalize_retry_delay).await;
        }
    }
}

async fn finalize_success(
    store: &Store,
    job: &Job,
    result: serde_json::Value,
    on_success: &Arc<dyn OnJobSuccess>,
    retry_delay: Duration,
) {
    let mut last_err = None;
    for attempt in 1..=FINALIZE_MAX_ATTEMPTS {
        match store.finalize_success(job.id, &result).await {
            Ok(_) => {
                last_err = None;
                break;
            }
            Err(e) => {
                warn!(job_id = job.id, attempt, error = %e, "finalize_success failed");
                last_err = Some(e);
                if attempt < FINALIZE_MAX_ATTEMPTS {
                    tokio::time::sleep(retry_delay).await;
                }
            }
        }
    }
    if let Some(e) = last_err {
        error!(
            job_id = job.id,
            attempts = FINALIZE_MAX_ATTEMPTS,
            error = %e,
            "finalize_success exhausted retries; row left for the Stuck-job Recoverer",
        );
        return;
    }
    let callback = AssertUnwindSafe(on_success.call(job, &result)).catch_unwind();
    if let Err(panic) = callback.await {
        error!(job_id = job.id, panic = %panic_message(&panic), "on_success callback panicked");
    }
}

async fn finalize_error(
    store: &Store,
    job: &Job,
    payload: serde_json::Value,
    on_error: &Arc<dyn OnJobError>,
    retry_delay: Duration,
) {
    let mut last_err = None;
    for attempt in 1..=FINALIZE_MAX_ATTEMPTS {
        match store.finalize_error(job.id, &payload).await {
            Ok(_) => {
                last_err = None;
                break;
            }
            Err(e) => {
                warn!(job_id = job.id, attempt, error = %e, "finalize_error failed");
                last_err = Some(e);
                if attempt < FINALIZE_MAX_ATTEMPTS {
                    tokio::time::sleep(retry_delay).await;
                }
            }
        }
    }
    if let Some(e) = last_err {
        error!(
            job_id = job.id,
            attempts = FINALIZE_MAX_ATTEMPTS,
            error = %e,
            "finalize_error exhausted retries; row left for the Stuck-job Recoverer",
        );
        return;
    }
    let callback = AssertUnwindSafe(on_error.call(job, &payload)).catch_unwind();
    if let Err(panic) = callback.await {
        error!(job_id = job.id, panic = %panic_message(&panic), "on_error callback panicked");
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
