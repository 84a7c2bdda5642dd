//! Retry-then-succeed, timeout-as-error, and `Controller::debug()` snapshot
//! scenarios, all driven through `oxen-testkit`'s doubles.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use oxen_core::{JobStatus, NewJob, NoopErrorCallback, NoopSuccessCallback};
use oxen_runtime::{Controller, ProcessorSpec};
use oxen_testkit::{make_job_type, RecordingErrorCallback, RetryOnceWorkFn, SleepingWorkFn};

#[tokio::test]
async fn retry_sentinel_requeues_then_redelivers_same_body() {
    if std::env::var("OXEN_DATABASE_URL").is_err() {
        eprintln!("skipping: OXEN_DATABASE_URL not set");
        return;
    }
    let pool = oxen_testkit::testkit_db_pool().await.unwrap();
    let store = oxen_db::Store::new(pool);
    let job_type = make_job_type("scenario_retry_once");

    let mut controller = Controller::new(store.clone());
    let EnqueueOutcomeInserted(id) = enqueue_one(&controller, &job_type).await;

    let work_fn = Arc::new(RetryOnceWorkFn::new(0.0));

    controller
        .start_processing(ProcessorSpec {
            job_type: job_type.clone(),
            concurrency: 1,
            timeout: Duration::from_secs(5),
            recover_stuck_jobs: false,
            recovery_threshold: Duration::from_secs(600),
            fastest_polling_rate: Duration::from_millis(20),
            slowest_polling_rate: Duration::from_millis(100),
            polling_backoff_rate: 1.3,
            work_fn: work_fn.clone(),
            on_success: Arc::new(NoopSuccessCallback),
            on_error: Arc::new(NoopErrorCallback),
        })
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(700)).await;
    controller.stop_processing(&job_type).await.unwrap();

    assert_eq!(work_fn.calls.load(Ordering::SeqCst), 2);
    let row = store.fetch(id).await.unwrap().unwrap();
    assert!(matches!(row.status, JobStatus::Success));
}

#[tokio::test]
async fn timed_out_job_is_left_in_processing_for_recovery_and_error_callback_does_not_fire() {
    if std::env::var("OXEN_DATABASE_URL").is_err() {
        eprintln!("skipping: OXEN_DATABASE_URL not set");
        return;
    }
    let pool = oxen_testkit::testkit_db_pool().await.unwrap();
    let store = oxen_db::Store::new(pool);
    let job_type = make_job_type("scenario_timeout");

    let mut controller = Controller::new(store.clone());
    let EnqueueOutcomeInserted(id) = enqueue_one(&controller, &job_type).await;

    let on_error = Arc::new(RecordingErrorCallback::default());

    controller
        .start_processing(ProcessorSpec {
            job_type: job_type.clone(),
            concurrency: 1,
            timeout: Duration::from_millis(200),
            recover_stuck_jobs: false,
            recovery_threshold: Duration::from_secs(600),
            fastest_polling_rate: Duration::from_millis(20),
            slowest_polling_rate: Duration::from_millis(100),
            polling_backoff_rate: 1.3,
            work_fn: Arc::new(SleepingWorkFn::new(Duration::from_secs(30))),
            on_success: Arc::new(NoopSuccessCallback),
            on_error: on_error.clone(),
        })
        .await
        .unwrap();

    // Give the supervisor time to claim, time out, and abandon the row.
    tokio::time::sleep(Duration::from_millis(600)).await;

    // `debug()` reports a live entry for every running job_type regardless
    // of whether the timed-out job's task has finished unwinding yet.
    let snapshot = controller.debug();
    assert!(snapshot.contains_key(&job_type));

    controller.stop_processing(&job_type).await.unwrap();

    let row = store.fetch(id).await.unwrap().unwrap();
    assert!(matches!(row.status, JobStatus::Processing));
    assert!(on_error.seen.lock().unwrap().is_empty());
}

struct EnqueueOutcomeInserted(i64);

async fn enqueue_one(controller: &Controller, job_type: &str) -> EnqueueOutcomeInserted {
    match controller
        .enqueue(&NewJob::new(job_type, serde_json::json!({"n": 1})))
        .await
        .unwrap()
    {
        oxen_core::EnqueueOutcome::Inserted(id) => EnqueueOutcomeInserted(id),
        oxen_core::EnqueueOutcome::Deduplicated => panic!("unexpected dedup"),
    }
}
