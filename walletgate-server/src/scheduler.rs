//! Background watcher reconciliation
//!
//! Runs the reconciliation job on a fixed interval. Ticks missed while a run
//! is still in progress are skipped rather than queued.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use walletgate_core::{ReconciliationJob, TRIGGER_CRON};

/// Spawn the scheduled job. The first run happens one `period` after start.
pub fn spawn_watcher_reconciliation(job: Arc<ReconciliationJob>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(interval_secs = period.as_secs(), "Watcher reconciliation scheduled");

        loop {
            ticker.tick().await;
            run_once(&job).await;
        }
    })
}

async fn run_once(job: &ReconciliationJob) {
    tracing::info!(triggered_by = TRIGGER_CRON, "Scheduled watcher reconciliation started");

    match job.register_watchers_for_multiple_vcs(TRIGGER_CRON).await {
        Ok(summary) => tracing::info!(
            success = summary.success_count,
            failed = summary.failure_count,
            total = summary.total_processed,
            "Scheduled watcher reconciliation finished"
        ),
        Err(e) => tracing::error!(error = %e, "Scheduled watcher reconciliation failed"),
    }
}
