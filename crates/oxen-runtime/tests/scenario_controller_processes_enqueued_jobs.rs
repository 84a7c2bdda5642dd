//! A Controller with concurrency > 1 drains a batch of enqueued jobs
//! without any external locking from the test's perspective.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use oxen_core::{JobView, NewJob, NoopErrorCallback, NoopSuccessCallback, WorkFn};
use oxen_runtime::{Controller, ProcessorSpec};
use serde_json::{json, Value};

struct CountingWorkFn {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl WorkFn for CountingWorkFn {
    async fn call(&self, body: Value, _view: JobView) -> anyhow::Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(body)
    }
}

#[tokio::test]
async fn all_enqueued_jobs_eventually_succeed() {
    if std::env::var("OXEN_DATABASE_URL").is_err() {
        eprintln!("skipping: OXEN_DATABASE_URL not set");
        return;
    }
    let pool = oxen_db::testkit_db_pool().await.unwrap();
    let store = oxen_db::Store::new(pool);
    let job_type = "scenario_controller_processes_enqueued_jobs";

    let mut controller = Controller::new(store.clone());
    let calls = Arc::new(AtomicUsize::new(0));

    for i in 0..12 {
        controller
            .enqueue(&NewJob::new(job_type, json!({"i": i})))
            .await
            .unwrap();
    }

    controller
        .start_processing(ProcessorSpec {
            job_type: job_type.to_string(),
            concurrency: 4,
            timeout: Duration::from_secs(5),
            recover_stuck_jobs: true,
            recovery_threshold: Duration::from_secs(10),
            fastest_polling_rate: Duration::from_millis(20),
            slowest_polling_rate: Duration::from_millis(200),
            polling_backoff_rate: 1.5,
            work_fn: Arc::new(CountingWorkFn { calls: calls.clone() }),
            on_success: Arc::new(NoopSuccessCallback),
            on_error: Arc::new(NoopErrorCallback),
        })
        .await
        .unwrap();

    // Give the dispatcher time to drain the batch.
    tokio::time::sleep(Duration::from_secs(2)).await;
    controller.stop_processing(job_type).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 12);
}
