//! Walletgate Server Library - REST gateway for VC wallet providers
//!
//! This library exposes the server components for use in integration tests.
//! The main binary uses these same components.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod scheduler;
pub mod state;

pub use auth::{BearerToken, HousekeepingAuth, WalletUser};
pub use config::Config;
pub use db::{UserRepository, VcRepository, WatcherRepository};
pub use error::ApiError;
pub use routes::create_router;
pub use scheduler::spawn_watcher_reconciliation;
pub use state::{AppState, Stores};
