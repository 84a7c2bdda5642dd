//! A work function returning the retry sentinel on its first call is
//! requeued and observed again on a later claim, succeeding the second time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use oxen_core::{JobView, NewJob, NoopErrorCallback, NoopSuccessCallback, WorkFn};
use oxen_runtime::{Controller, ProcessorSpec};
use serde_json::{json, Value};

struct RetryOnceWorkFn {
    attempts: Arc<AtomicUsize>,
}

#[async_trait]
impl WorkFn for RetryOnceWorkFn {
    async fn call(&self, _body: Value, _view: JobView) -> anyhow::Result<Value> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst);
        if n == 0 {
            Ok(json!({ "_oxen_queue_retry_seconds": 0.2 }))
        } else {
            Ok(json!({ "ok": true }))
        }
    }
}

#[tokio::test]
async fn retry_sentinel_is_requeued_then_succeeds() {
    if std::env::var("OXEN_DATABASE_URL").is_err() {
        eprintln!("skipping: OXEN_DATABASE_URL not set");
        return;
    }
    let pool = oxen_db::testkit_db_pool().await.unwrap();
    let store = oxen_db::Store::new(pool);
    let job_type = "scenario_controller_retry_sentinel";

    let mut controller = Controller::new(store.clone());
    controller
        .enqueue(&NewJob::new(job_type, json!({"body": "retry-me"})))
        .await
        .unwrap();

    let attempts = Arc::new(AtomicUsize::new(0));
    controller
        .start_processing(ProcessorSpec {
            job_type: job_type.to_string(),
            concurrency: 1,
            timeout: Duration::from_secs(5),
            recover_stuck_jobs: true,
            recovery_threshold: Duration::from_secs(10),
            fastest_polling_rate: Duration::from_millis(20),
            slowest_polling_rate: Duration::from_millis(100),
            polling_backoff_rate: 1.5,
            work_fn: Arc::new(RetryOnceWorkFn { attempts: attempts.clone() }),
            on_success: Arc::new(NoopSuccessCallback),
            on_error: Arc::new(NoopErrorCallback),
        })
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1500)).await;
    controller.stop_processing(job_type).await.unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 2, "job must be attempted twice");
}
