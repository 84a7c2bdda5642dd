//! A row stranded in `processing` past the recovery threshold is
//! returned to `waiting` with `recovered=true`.

use oxen_core::{JobStatus, NewJob};
use oxen_db::Store;
use serde_json::json;

#[tokio::test]
async fn recover_stuck_flips_stale_processing_rows_to_waiting() {
    if std::env::var("OXEN_DATABASE_URL").is_err() {
        eprintln!("skipping: OXEN_DATABASE_URL not set");
        return;
    }
    let pool = oxen_db::testkit_db_pool().await.unwrap();
    let store = Store::new(pool);
    let job_type = "scenario_stuck_job_recovery";

    store
        .enqueue(&NewJob::new(job_type, json!({"body": "abandoned"})))
        .await
        .unwrap();
    let claimed = store.claim_batch(job_type, 1).await.unwrap();
    let job_id = claimed[0].id;

    // Simulate the worker dying: no finalize ever happens. A threshold of
    // zero duration means "immediately stuck" for test purposes.
    let stuck_ids = store
        .scan_stuck(job_type, chrono::Duration::seconds(0))
        .await
        .unwrap();
    assert_eq!(stuck_ids, vec![job_id]);

    let moved = store
        .recover_stuck(job_type, chrono::Duration::seconds(0))
        .await
        .unwrap();
    assert_eq!(moved, 1);

    let row = store.fetch(job_id).await.unwrap().unwrap();
    assert_eq!(row.status, JobStatus::Waiting);
    assert!(row.batch_id.is_none());
    assert!(row.recovered);

    // And it is claimable again.
    let reclaimed = store.claim_batch(job_type, 1).await.unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].id, job_id);
}

#[tokio::test]
async fn recover_stuck_leaves_fresh_processing_rows_alone() {
    if std::env::var("OXEN_DATABASE_URL").is_err() {
        eprintln!("skipping: OXEN_DATABASE_URL not set");
        return;
    }
    let pool = oxen_db::testkit_db_pool().await.unwrap();
    let store = Store::new(pool);
    let job_type = "scenario_stuck_job_recovery_fresh";

    store
        .enqueue(&NewJob::new(job_type, json!({"body": "in-flight"})))
        .await
        .unwrap();
    store.claim_batch(job_type, 1).await.unwrap();

    let moved = store
        .recover_stuck(job_type, chrono::Duration::minutes(5))
        .await
        .unwrap();
    assert_eq!(moved, 0, "a job claimed moments ago is not stuck yet");
}
