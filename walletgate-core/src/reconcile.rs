//! Watcher reconciliation.
//!
//! Picks up every watcher the provider has not acknowledged yet and runs it
//! through [`WatcherRegistrationService`] in fixed-size concurrent batches.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::registration::{RegistrationResult, WatcherRegistrationService};
use crate::store::WatcherStore;

/// Trigger label for scheduled runs.
pub const TRIGGER_CRON: &str = "cron-job";
/// Trigger label for runs started through the housekeeping API.
pub const TRIGGER_MANUAL: &str = "manual-trigger";

/// Registrations in flight at once.
pub const BATCH_SIZE: usize = 5;

/// Outcome for one watcher.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileItem {
    pub watcher_id: i64,
    pub vc_public_id: String,
    #[serde(flatten)]
    pub result: RegistrationResult,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSummary {
    pub success_count: usize,
    pub failure_count: usize,
    pub total_processed: usize,
    pub results: Vec<ReconcileItem>,
}

#[derive(Clone)]
pub struct ReconciliationJob {
    registration: WatcherRegistrationService,
    watchers: Arc<dyn WatcherStore>,
    batch_size: usize,
}

impl ReconciliationJob {
    pub fn new(registration: WatcherRegistrationService, watchers: Arc<dyn WatcherStore>) -> Self {
        Self {
            registration,
            watchers,
            batch_size: BATCH_SIZE,
        }
    }

    /// Register every unregistered watcher.
    ///
    /// Batches run one after another; members of a batch run concurrently.
    /// Individual failures are tallied, never propagated. Only a failure to
    /// list the pending watchers is an error.
    #[instrument(level = "info", skip(self))]
    pub async fn register_watchers_for_multiple_vcs(
        &self,
        triggered_by: &str,
    ) -> Result<ReconcileSummary> {
        let pending = self.watchers.list_unregistered().await?;
        if pending.is_empty() {
            info!(triggered_by = %triggered_by, "No unregistered watchers found");
            return Ok(ReconcileSummary::default());
        }

        info!(
            triggered_by = %triggered_by,
            pending = pending.len(),
            batch_size = self.batch_size,
            "Starting watcher reconciliation"
        );

        let mut summary = ReconcileSummary::default();
        for (index, batch) in pending.chunks(self.batch_size).enumerate() {
            let outcomes = join_all(batch.iter().map(|watcher| async move {
                let result = self
                    .registration
                    .register_watcher_for_vc(
                        &watcher.vc_public_id,
                        &watcher.provider,
                        triggered_by,
                        watcher.user_id,
                    )
                    .await;
                ReconcileItem {
                    watcher_id: watcher.id,
                    vc_public_id: watcher.vc_public_id.clone(),
                    result,
                }
            }))
            .await;

            for item in outcomes {
                if item.result.success {
                    summary.success_count += 1;
                } else {
                    summary.failure_count += 1;
                    warn!(
                        vc_public_id = %item.vc_public_id,
                        status = item.result.status_code,
                        batch = index + 1,
                        "Watcher registration failed during reconciliation"
                    );
                }
                summary.results.push(item);
            }
        }
        summary.total_processed = summary.results.len();

        info!(
            triggered_by = %triggered_by,
            success = summary.success_count,
            failed = summary.failure_count,
            total = summary.total_processed,
            "Watcher reconciliation finished"
        );
        Ok(summary)
    }
}
