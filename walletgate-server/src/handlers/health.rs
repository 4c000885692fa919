//! Health check handlers
//!
//! Provides health and readiness endpoints for monitoring and orchestration.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use walletgate_core::provider::ProviderCapabilities;

use crate::db;
use crate::state::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    /// Service status: "healthy" or "degraded"
    pub status: &'static str,
    /// Server version from Cargo.toml
    pub version: &'static str,
    /// Service name
    pub service: &'static str,
    /// Active wallet provider
    pub provider: String,
    /// Optional provider capabilities
    pub capabilities: ProviderCapabilities,
    /// "postgres" or "memory"
    pub storage: &'static str,
}

/// GET /health - Health check endpoint
///
/// Reports "degraded" when the database is configured but unreachable.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let (storage, healthy) = match &state.db_pool {
        Some(pool) => ("postgres", db::check_health(pool).await.is_ok()),
        None => ("memory", true),
    };

    let adapter = state.wallet.adapter();
    Json(HealthResponse {
        status: if healthy { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        service: "walletgate-server",
        provider: adapter.name().to_string(),
        capabilities: adapter.capabilities(),
        storage,
    })
}

/// Readiness response for Kubernetes
#[derive(Serialize)]
pub struct ReadyResponse {
    /// Whether the service is ready to accept traffic
    pub ready: bool,
    /// Optional message explaining status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

/// GET /ready - Kubernetes readiness probe
///
/// Returns 503 while a configured database cannot be reached.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    if let Some(pool) = &state.db_pool {
        if let Err(e) = db::check_health(pool).await {
            tracing::warn!(error = %e, "Readiness check failed");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadyResponse {
                    ready: false,
                    message: Some("Database unavailable"),
                }),
            );
        }
    }

    (
        StatusCode::OK,
        Json(ReadyResponse {
            ready: true,
            message: None,
        }),
    )
}
