//! Housekeeping handlers
//!
//! Maintenance endpoints guarded by `HOUSEKEEPING_SECRET_KEY`. Each returns
//! `{success, message, stats, timestamp}` (stats uses `data`).

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use walletgate_core::config::DEFAULT_PROVIDER;
use walletgate_core::{
    clamp_chunk_size, BackfillStats, ReconcileSummary, SyncStats, WatcherStats, TRIGGER_MANUAL,
};

use crate::auth::HousekeepingAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters shared by the chunked tasks
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkQuery {
    /// Page size; non-numeric values fall back to the default
    pub chunk_size: Option<String>,
    /// Provider name for the sync task (default: dhiway)
    pub provider: Option<String>,
}

impl ChunkQuery {
    fn chunk_size(&self) -> usize {
        clamp_chunk_size(self.chunk_size.as_deref().and_then(|s| s.trim().parse().ok()))
    }

    fn provider(&self) -> &str {
        self.provider
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_PROVIDER)
    }
}

/// Result envelope for task endpoints
#[derive(Debug, Serialize)]
pub struct TaskResponse<T> {
    pub success: bool,
    pub message: String,
    pub stats: T,
    pub timestamp: String,
}

impl<T> TaskResponse<T> {
    fn completed(message: String, stats: T) -> Json<Self> {
        Json(Self {
            success: true,
            message,
            stats,
            timestamp: Utc::now().to_rfc3339(),
        })
    }
}

/// Result envelope for `GET /housekeeping/stats`
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub success: bool,
    pub data: WatcherStats,
    pub timestamp: String,
}

/// POST /housekeeping/add-watchers?chunkSize=N
pub async fn add_watchers_handler(
    _auth: HousekeepingAuth,
    State(state): State<AppState>,
    Query(query): Query<ChunkQuery>,
) -> Result<Json<TaskResponse<BackfillStats>>, ApiError> {
    let chunk_size = query.chunk_size();
    tracing::info!(chunk_size, "Housekeeping: adding watchers for VCs without one");

    let stats = state
        .housekeeping
        .add_watchers_for_missing_vcs(chunk_size)
        .await?;
    Ok(TaskResponse::completed(stats.summary(), stats))
}

/// GET /housekeeping/stats
pub async fn stats_handler(
    _auth: HousekeepingAuth,
    State(state): State<AppState>,
) -> Result<Json<StatsResponse>, ApiError> {
    let data = state.housekeeping.watcher_stats().await?;
    Ok(Json(StatsResponse {
        success: true,
        data,
        timestamp: Utc::now().to_rfc3339(),
    }))
}

/// POST /housekeeping/sync-vcs-and-add-watchers?provider=&chunkSize=
pub async fn sync_handler(
    _auth: HousekeepingAuth,
    State(state): State<AppState>,
    Query(query): Query<ChunkQuery>,
) -> Result<Json<TaskResponse<SyncStats>>, ApiError> {
    let chunk_size = query.chunk_size();
    let provider = query.provider();
    tracing::info!(provider = %provider, chunk_size, "Housekeeping: syncing VCs from provider");

    let stats = state
        .housekeeping
        .sync_vcs_and_add_watchers_for_all_users(provider, chunk_size)
        .await?;
    Ok(TaskResponse::completed(stats.summary(), stats))
}

/// POST /housekeeping/register-watchers
///
/// Runs one reconciliation pass immediately.
pub async fn register_watchers_handler(
    _auth: HousekeepingAuth,
    State(state): State<AppState>,
) -> Result<Json<TaskResponse<ReconcileSummary>>, ApiError> {
    let summary = state
        .reconcile
        .register_watchers_for_multiple_vcs(TRIGGER_MANUAL)
        .await?;
    let message = format!(
        "Watcher registration completed. Success: {}, Failed: {}, Total: {}",
        summary.success_count, summary.failure_count, summary.total_processed
    );
    Ok(TaskResponse::completed(message, summary))
}
