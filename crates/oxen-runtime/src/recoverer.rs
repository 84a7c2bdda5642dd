//! Stuck-job Recoverer: periodically reclaims rows stranded in `processing`
//! past `recovery_threshold`.

use std::time::Duration;

use oxen_db::Store;
use tokio::sync::watch;
use tracing::warn;

/// Poll `recovery_threshold / 2` (clamped to a sane floor) so a stuck row
/// is reclaimed soon after it crosses the threshold without hammering the
/// table between sweeps.
pub fn sweep_interval(recovery_threshold: Duration) -> Duration {
    (recovery_threshold / 2).max(Duration::from_millis(500))
}

pub async fn run(
    store: Store,
    job_type: String,
    recovery_threshold: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let threshold = chrono::Duration::from_std(recovery_threshold)
        .unwrap_or_else(|_| chrono::Duration::seconds(60));
    let mut ticker = tokio::time::interval(sweep_interval(recovery_threshold));

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {}
        }
        if *shutdown.borrow() {
            break;
        }

        match store.recover_stuck(&job_type, threshold).await {
            Ok(0) => {}
            Ok(n) => warn!(job_type = %job_type, recovered = n, "recovered stuck jobs"),
            Err(e) => tracing::error!(job_type = %job_type, error = %e, "recover_stuck failed"),
        }
    }
}
