//! enqueue -> claim -> finalize(success) round-trips the result; a
//! requeue re-delivers the same body and advances `start_time`.

use oxen_core::{JobStatus, NewJob};
use oxen_db::Store;
use serde_json::json;

#[tokio::test]
async fn finalize_success_round_trips_result() {
    if std::env::var("OXEN_DATABASE_URL").is_err() {
        eprintln!("skipping: OXEN_DATABASE_URL not set");
        return;
    }
    let pool = oxen_db::testkit_db_pool().await.unwrap();
    let store = Store::new(pool);
    let job_type = "scenario_finalize_success";

    store
        .enqueue(&NewJob::new(job_type, json!({"body": "a"})))
        .await
        .unwrap();
    let claimed = store.claim_batch(job_type, 1).await.unwrap();
    let job = &claimed[0];

    store
        .finalize_success(job.id, &json!({"ok": true}))
        .await
        .unwrap();

    let row = store.fetch(job.id).await.unwrap().unwrap();
    assert_eq!(row.status, JobStatus::Success);
    assert_eq!(row.result, Some(json!({"ok": true})));
    assert_eq!(row.batch_id, job.batch_id, "finalize must not clear batch_id");
}

#[tokio::test]
async fn requeue_re_delivers_same_body_after_delay() {
    if std::env::var("OXEN_DATABASE_URL").is_err() {
        eprintln!("skipping: OXEN_DATABASE_URL not set");
        return;
    }
    let pool = oxen_db::testkit_db_pool().await.unwrap();
    let store = Store::new(pool);
    let job_type = "scenario_requeue_retry";

    store
        .enqueue(&NewJob::new(job_type, json!({"body": "retry-me"})))
        .await
        .unwrap();
    let claimed = store.claim_batch(job_type, 1).await.unwrap();
    let job = &claimed[0];

    store.requeue(job.id, chrono::Duration::seconds(1)).await.unwrap();

    let row = store.fetch(job.id).await.unwrap().unwrap();
    assert_eq!(row.status, JobStatus::Waiting);
    assert!(row.batch_id.is_none());
    assert!(row.start_time > chrono::Utc::now());

    // Not yet eligible.
    assert!(store.claim_batch(job_type, 1).await.unwrap().is_empty());

    tokio::time::sleep(std::time::Duration::from_millis(1200)).await;
    let reclaimed = store.claim_batch(job_type, 1).await.unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].body, json!({"body": "retry-me"}));
}
