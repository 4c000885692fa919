//! Walletgate Core - watcher registration and callback relay for VC wallets
//!
//! This crate holds everything a verifiable-credential wallet gateway needs
//! beneath its HTTP surface: provider adapters, repositories, and the
//! services that keep provider watches in sync with local records.
//!
//! # Features
//!
//! - Capability-based provider adapters (Dhiway, mock)
//! - Idempotent watcher registration
//! - Batched reconciliation of unregistered watchers
//! - Callback fan-out with self-loop protection
//! - Housekeeping: watcher backfill, statistics and provider sync
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use walletgate_core::provider::MockProvider;
//! use walletgate_core::store::MemoryWatcherStore;
//! use walletgate_core::{GatewayConfig, ReconciliationJob, WatcherRegistrationService};
//!
//! # async fn example() -> walletgate_core::Result<()> {
//! let watchers = Arc::new(MemoryWatcherStore::new());
//! let registration = WatcherRegistrationService::new(
//!     MockProvider::builder().build().adapter(),
//!     watchers.clone(),
//!     Arc::new(GatewayConfig::from_env()),
//! );
//!
//! let summary = ReconciliationJob::new(registration, watchers)
//!     .register_watchers_for_multiple_vcs("manual-trigger")
//!     .await?;
//! println!("{} registered, {} failed", summary.success_count, summary.failure_count);
//! # Ok(())
//! # }
//! ```

pub mod callback;
pub mod config;
pub mod error;
pub mod housekeeping;
pub mod model;
pub mod password;
pub mod provider;
pub mod reconcile;
pub mod registration;
pub mod store;
pub mod wallet;

// Re-export main types for convenience
pub use callback::{CallbackForwarder, CallbackHandler, CallbackResponse, HttpForwarder};
pub use config::GatewayConfig;
pub use error::{Result, WalletError};
pub use housekeeping::{clamp_chunk_size, BackfillStats, HousekeepingService, SyncStats, WatcherStats};
pub use reconcile::{ReconcileSummary, ReconciliationJob, TRIGGER_CRON, TRIGGER_MANUAL};
pub use registration::{RegistrationResult, WatcherRegistrationService};
pub use wallet::{WalletService, WatchVcRequest};
