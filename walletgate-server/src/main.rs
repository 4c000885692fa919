//! Walletgate Server - REST gateway for VC wallet providers
//!
//! Exposes walletgate-core over HTTP:
//! - /api/wallet/* - onboarding, login, VC access, watches and provider callbacks
//! - /housekeeping/* - watcher backfill, statistics, provider sync, reconciliation
//! - /health, /ready - probes

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use walletgate_core::provider::ProviderFactory;
use walletgate_core::{GatewayConfig, HttpForwarder};
use walletgate_server::{create_router, db, spawn_watcher_reconciliation, AppState, Config, Stores};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("walletgate_server=info,walletgate_core=info,tower_http=info")
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let gateway = Arc::new(GatewayConfig::from_env());
    tracing::info!(?config, ?gateway, "Starting walletgate-server");

    let adapter = ProviderFactory::create_by_name(&config.wallet_provider)
        .context("failed to build wallet provider")?;
    tracing::info!(
        provider = adapter.name(),
        capabilities = ?adapter.capabilities(),
        "Wallet provider ready"
    );

    let forwarder = Arc::new(HttpForwarder::new().context("failed to build callback client")?);

    let (stores, pool) = match &config.database_url {
        Some(url) => {
            let pool = db::connect(url, &config)
                .await
                .context("failed to connect to PostgreSQL")?;
            db::migrate(&pool).await.context("failed to run migrations")?;
            (Stores::postgres(pool.clone()), Some(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory stores (data is lost on restart)");
            (Stores::memory(), None)
        }
    };

    let mut state = AppState::new(adapter, stores, gateway, forwarder)
        .with_housekeeping_secret(config.housekeeping_secret.clone());
    if let Some(pool) = pool {
        state = state.with_db_pool(pool);
    }
    if state.housekeeping_secret.is_none() {
        tracing::warn!("HOUSEKEEPING_SECRET_KEY not set, housekeeping endpoints will reject all requests");
    }

    let reconciliation = if config.watcher_cron_enabled {
        Some(spawn_watcher_reconciliation(
            state.reconcile.clone(),
            config.watcher_cron_interval(),
        ))
    } else {
        tracing::warn!("Scheduled watcher reconciliation DISABLED");
        None
    };

    let app = create_router(state, &config);
    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "Listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    if let Some(handle) = reconciliation {
        handle.abort();
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
