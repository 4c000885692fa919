//! Router configuration module
//!
//! Configures all routes, middleware layers, and creates the application router.

use std::{sync::Arc, time::Duration};

use axum::{
    http::{header, Method, StatusCode},
    routing::{get, post},
    Router,
};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::handlers::{
    add_watchers_handler, get_vc_handler, health, list_vcs_handler, login_handler,
    onboard_handler, ready, register_watchers_handler, resend_otp_handler, stats_handler,
    sync_handler, upload_qr_handler, verify_login_handler, watch_callback_handler, watch_handler,
};
use crate::state::AppState;

/// Wallet passthrough and watch routes, mounted at `/api/wallet`
fn wallet_routes() -> Router<AppState> {
    Router::new()
        .route("/onboard", post(onboard_handler))
        .route("/login", post(login_handler))
        .route("/login/verify", post(verify_login_handler))
        .route("/login/resend-otp", post(resend_otp_handler))
        .route("/vcs/watch", post(watch_handler))
        .route("/vcs/watch/callback", post(watch_callback_handler))
        .route("/{user_id}/vcs", get(list_vcs_handler))
        .route("/{user_id}/vcs/upload-qr", post(upload_qr_handler))
        .route("/{user_id}/vcs/{vc_id}", get(get_vc_handler))
}

/// Maintenance routes, mounted at `/housekeeping`
fn housekeeping_routes() -> Router<AppState> {
    Router::new()
        .route("/add-watchers", post(add_watchers_handler))
        .route("/stats", get(stats_handler))
        .route("/sync-vcs-and-add-watchers", post(sync_handler))
        .route("/register-watchers", post(register_watchers_handler))
}

/// Create the application router with custom configuration
pub fn create_router(state: AppState, config: &Config) -> Router {
    // Configure CORS based on allowed_origins
    let cors = match &config.allowed_origins {
        Some(origins) if !origins.is_empty() => {
            let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            tracing::info!("CORS: Restricting to {} origin(s)", origins.len());
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
        }
        _ => {
            tracing::warn!("CORS: Allowing all origins (dev mode)");
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    };

    // Request body limit
    let body_limit = RequestBodyLimitLayer::new(config.body_limit_mb * 1024 * 1024);

    // Request timeout
    let timeout = TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        Duration::from_secs(config.timeout_secs),
    );

    // Base router with common layers
    let router = Router::new()
        .nest("/api/wallet", wallet_routes())
        .nest("/housekeeping", housekeeping_routes())
        .route("/health", get(health))
        .route("/ready", get(ready))
        .with_state(state)
        .layer(cors)
        .layer(body_limit)
        .layer(timeout);

    // Conditionally apply rate limiting (disabled in tests, enabled in production)
    let governor_conf = if config.rate_limit_enabled {
        GovernorConfigBuilder::default()
            .per_second(config.rate_limit_per_sec)
            .burst_size(config.rate_limit_burst)
            .finish()
    } else {
        None
    };

    let router = match governor_conf {
        Some(governor_conf) => {
            tracing::info!(
                "Rate limiting: {} req/s (burst: {})",
                config.rate_limit_per_sec,
                config.rate_limit_burst
            );
            router.layer(GovernorLayer::new(Arc::new(governor_conf)))
        }
        None => {
            if config.rate_limit_enabled {
                tracing::error!(
                    per_sec = config.rate_limit_per_sec,
                    burst = config.rate_limit_burst,
                    "Invalid rate limit settings, rate limiting DISABLED"
                );
            } else {
                tracing::warn!("Rate limiting: DISABLED");
            }
            router
        }
    };

    // Every request carries an x-request-id, generated when the caller sent none
    router
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}
