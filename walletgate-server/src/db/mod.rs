//! Database module for Walletgate Server
//!
//! PostgreSQL implementations of the walletgate-core repository traits, plus
//! pool setup and migrations.

pub mod user;
pub mod vc;
pub mod watcher;

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use walletgate_core::WalletError;

use crate::config::Config;

pub use user::UserRepository;
pub use vc::VcRepository;
pub use watcher::WatcherRepository;

/// Open a connection pool sized from the server config.
pub async fn connect(database_url: &str, config: &Config) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .min_connections(config.database_min_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;

    tracing::info!(
        max_connections = config.database_max_connections,
        "Connected to PostgreSQL database"
    );
    Ok(pool)
}

/// Run database migrations
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations completed");
    Ok(())
}

/// Check database connection health
pub async fn check_health(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Map a driver error onto the core error type.
///
/// Unique violations become conflicts; everything else is an opaque store error.
pub(crate) fn store_error(err: sqlx::Error) -> WalletError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            return WalletError::Conflict("Record already exists".into());
        }
    }
    WalletError::store(err.to_string())
}
