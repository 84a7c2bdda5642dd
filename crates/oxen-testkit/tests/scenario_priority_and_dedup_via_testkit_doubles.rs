//! Priority ordering and dedup-on-enqueue, driven through `oxen-testkit`'s
//! reusable work-function doubles instead of ad hoc ones, so the doubles
//! themselves get exercise.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use oxen_core::{EnqueueOutcome, JobView, NewJob, NoopErrorCallback, NoopSuccessCallback, WorkFn};
use oxen_runtime::{Controller, ProcessorSpec};
use oxen_testkit::{make_job_type, CountingWorkFn};
use serde_json::Value;

struct OrderRecordingWorkFn {
    order: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl WorkFn for OrderRecordingWorkFn {
    async fn call(&self, body: Value, _view: JobView) -> anyhow::Result<Value> {
        let label = body.get("label").and_then(Value::as_str).unwrap_or("?").to_string();
        self.order.lock().unwrap().push(label);
        Ok(body)
    }
}

#[tokio::test]
async fn lower_priority_runs_before_higher_priority_value() {
    if std::env::var("OXEN_DATABASE_URL").is_err() {
        eprintln!("skipping: OXEN_DATABASE_URL not set");
        return;
    }
    let pool = oxen_testkit::testkit_db_pool().await.unwrap();
    let store = oxen_db::Store::new(pool);
    let job_type = make_job_type("scenario_s1_priority");

    let mut controller = Controller::new(store.clone());

    controller
        .enqueue(&NewJob::new(&job_type, serde_json::json!({"label": "a"})).with_priority(2))
        .await
        .unwrap();
    controller
        .enqueue(&NewJob::new(&job_type, serde_json::json!({"label": "b"})).with_priority(1))
        .await
        .unwrap();

    let order = Arc::new(Mutex::new(Vec::new()));

    controller
        .start_processing(ProcessorSpec {
            job_type: job_type.clone(),
            concurrency: 1,
            timeout: Duration::from_secs(5),
            recover_stuck_jobs: false,
            recovery_threshold: Duration::from_secs(600),
            fastest_polling_rate: Duration::from_millis(20),
            slowest_polling_rate: Duration::from_millis(200),
            polling_backoff_rate: 1.5,
            work_fn: Arc::new(OrderRecordingWorkFn { order: order.clone() }),
            on_success: Arc::new(NoopSuccessCallback),
            on_error: Arc::new(NoopErrorCallback),
        })
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(800)).await;
    controller.stop_processing(&job_type).await.unwrap();

    let seen = order.lock().unwrap().clone();
    assert_eq!(seen, vec!["b".to_string(), "a".to_string()]);
}

#[tokio::test]
async fn duplicate_unique_key_is_dropped_not_fatal() {
    if std::env::var("OXEN_DATABASE_URL").is_err() {
        eprintln!("skipping: OXEN_DATABASE_URL not set");
        return;
    }
    let pool = oxen_testkit::testkit_db_pool().await.unwrap();
    let store = oxen_db::Store::new(pool);
    let job_type = make_job_type("scenario_s2_dedup");

    let controller = Controller::new(store.clone());

    let mut inserted = 0;
    let mut deduped = 0;
    for i in 0..10 {
        let job = oxen_testkit::make_job(&job_type, i).with_unique_key(42);
        match controller.enqueue(&job).await.unwrap() {
            EnqueueOutcome::Inserted(_) => inserted += 1,
            EnqueueOutcome::Deduplicated => deduped += 1,
        }
    }

    assert_eq!(inserted, 1);
    assert_eq!(deduped, 9);
}

#[tokio::test]
async fn counting_work_fn_sees_every_enqueued_job_exactly_once() {
    if std::env::var("OXEN_DATABASE_URL").is_err() {
        eprintln!("skipping: OXEN_DATABASE_URL not set");
        return;
    }
    let pool = oxen_testkit::testkit_db_pool().await.unwrap();
    let store = oxen_db::Store::new(pool);
    let job_type = make_job_type("scenario_counting_work_fn");

    let mut controller = Controller::new(store.clone());
    for i in 0..20 {
        controller.enqueue(&oxen_testkit::make_job(&job_type, i)).await.unwrap();
    }

    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    controller
        .start_processing(ProcessorSpec {
            job_type: job_type.clone(),
            concurrency: 5,
            timeout: Duration::from_secs(5),
            recover_stuck_jobs: true,
            recovery_threshold: Duration::from_secs(30),
            fastest_polling_rate: Duration::from_millis(20),
            slowest_polling_rate: Duration::from_millis(200),
            polling_backoff_rate: 1.5,
            work_fn: Arc::new(CountingWorkFn { calls: calls.clone() }),
            on_success: Arc::new(NoopSuccessCallback),
            on_error: Arc::new(NoopErrorCallback),
        })
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;
    controller.stop_processing(&job_type).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 20);
}
