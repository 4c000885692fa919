//! Housekeeping: watcher backfill, watcher statistics and provider sync.
//!
//! Every task walks its table in keyset pages (see [`crate::store::pages`])
//! and keeps going past per-row failures, counting them in `errors`.

mod sync;

pub use sync::{SyncStats, USER_SYNC_TIMEOUT};

use std::sync::Arc;

use futures::TryStreamExt;
use serde::Serialize;
use tracing::{debug, error, info, instrument};

use crate::config::GatewayConfig;
use crate::error::{Result, WalletError};
use crate::model::{NewWatcher, VcRecord};
use crate::provider::ProviderAdapter;
use crate::store::{pages, UserStore, VcStore, WatcherStore};

pub const DEFAULT_CHUNK_SIZE: usize = 100;
pub const MAX_CHUNK_SIZE: usize = 1000;

/// Clamp a requested page size into `1..=MAX_CHUNK_SIZE`.
pub fn clamp_chunk_size(requested: Option<i64>) -> usize {
    match requested {
        None => DEFAULT_CHUNK_SIZE,
        Some(n) => n.clamp(1, MAX_CHUNK_SIZE as i64) as usize,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillStats {
    pub total_vcs: i64,
    pub existing_watchers: usize,
    pub new_watchers_created: usize,
    pub errors: usize,
    pub chunks_processed: usize,
}

impl BackfillStats {
    pub fn summary(&self) -> String {
        format!(
            "Housekeeping task completed. Total VCs: {}, Existing watchers: {}, New watchers created: {}, Errors: {}, Chunks processed: {}",
            self.total_vcs,
            self.existing_watchers,
            self.new_watchers_created,
            self.errors,
            self.chunks_processed
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherStats {
    pub total_vcs: i64,
    pub total_watchers: i64,
    pub registered_watchers: i64,
    pub unregistered_watchers: i64,
    pub vcs_without_watchers: i64,
}

#[derive(Clone)]
pub struct HousekeepingService {
    watchers: Arc<dyn WatcherStore>,
    vcs: Arc<dyn VcStore>,
    users: Arc<dyn UserStore>,
    adapter: ProviderAdapter,
    config: Arc<GatewayConfig>,
}

impl HousekeepingService {
    pub fn new(
        watchers: Arc<dyn WatcherStore>,
        vcs: Arc<dyn VcStore>,
        users: Arc<dyn UserStore>,
        adapter: ProviderAdapter,
        config: Arc<GatewayConfig>,
    ) -> Self {
        Self {
            watchers,
            vcs,
            users,
            adapter,
            config,
        }
    }

    /// Create an unregistered watcher for every VC that has none.
    #[instrument(level = "info", skip(self))]
    pub async fn add_watchers_for_missing_vcs(&self, chunk_size: usize) -> Result<BackfillStats> {
        let mut stats = BackfillStats {
            total_vcs: self.vcs.count().await?,
            ..Default::default()
        };
        info!(total_vcs = stats.total_vcs, "Starting watcher backfill");

        let mut chunks = Box::pin(pages(
            chunk_size,
            |after, limit| self.vcs.page_after(after, limit),
            |vc: &VcRecord| vc.id,
        ));

        while let Some(chunk) = chunks.try_next().await? {
            for vc in &chunk {
                match self.ensure_watcher(vc).await {
                    Ok(true) => stats.new_watchers_created += 1,
                    Ok(false) => stats.existing_watchers += 1,
                    Err(err) => {
                        stats.errors += 1;
                        error!(vc_public_id = %vc.vc_public_id, error = %err, "Backfill failed for VC");
                    }
                }
            }
            stats.chunks_processed += 1;
            debug!(
                chunk = stats.chunks_processed,
                size = chunk.len(),
                "Backfill chunk completed"
            );
        }

        info!(
            created = stats.new_watchers_created,
            existing = stats.existing_watchers,
            errors = stats.errors,
            "Watcher backfill finished"
        );
        Ok(stats)
    }

    /// Returns true when a watcher was created.
    async fn ensure_watcher(&self, vc: &VcRecord) -> Result<bool> {
        if self.watchers.exists_for_vc(&vc.vc_public_id).await? {
            return Ok(false);
        }

        if let Some(user_id) = vc.user_id {
            if self.users.find_by_id(user_id).await?.is_none() {
                return Err(WalletError::NotFound(format!("User {user_id} not found")));
            }
        }

        let (_, created) = self
            .watchers
            .find_or_create(NewWatcher {
                vc_public_id: vc.vc_public_id.clone(),
                user_id: vc.user_id,
                provider: vc.provider.clone(),
                watcher_registered: false,
                watcher_email: self.config.watcher_email.clone(),
                watcher_callback_url: Some(self.config.callback_url()),
                forward_watcher_callback_url: None,
                created_by: vc.user_id.map(|id| id.to_string()),
            })
            .await?;
        Ok(created)
    }

    pub async fn watcher_stats(&self) -> Result<WatcherStats> {
        let total_vcs = self.vcs.count().await?;
        let watched_vcs = self.watchers.count_distinct_vcs().await?;
        Ok(WatcherStats {
            total_vcs,
            total_watchers: self.watchers.count(None).await?,
            registered_watchers: self.watchers.count(Some(true)).await?,
            unregistered_watchers: self.watchers.count(Some(false)).await?,
            vcs_without_watchers: (total_vcs - watched_vcs).max(0),
        })
    }
}
