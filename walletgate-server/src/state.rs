//! Application state module
//!
//! Defines shared state accessible across all request handlers.

use std::sync::Arc;

use sqlx::PgPool;
use walletgate_core::callback::VcRefreshProcessor;
use walletgate_core::provider::ProviderAdapter;
use walletgate_core::store::{
    MemoryUserStore, MemoryVcStore, MemoryWatcherStore, UserStore, VcStore, WatcherStore,
};
use walletgate_core::{
    CallbackForwarder, CallbackHandler, GatewayConfig, HousekeepingService, ReconciliationJob,
    WalletService, WatcherRegistrationService,
};

use crate::db::{UserRepository, VcRepository, WatcherRepository};

/// Repositories backing the services.
#[derive(Clone)]
pub struct Stores {
    pub watchers: Arc<dyn WatcherStore>,
    pub vcs: Arc<dyn VcStore>,
    pub users: Arc<dyn UserStore>,
}

impl Stores {
    /// In-memory stores; data is lost on restart.
    pub fn memory() -> Self {
        Self {
            watchers: Arc::new(MemoryWatcherStore::new()),
            vcs: Arc::new(MemoryVcStore::new()),
            users: Arc::new(MemoryUserStore::new()),
        }
    }

    /// PostgreSQL-backed stores sharing one pool.
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            watchers: Arc::new(WatcherRepository::new(pool.clone())),
            vcs: Arc::new(VcRepository::new(pool.clone())),
            users: Arc::new(UserRepository::new(pool)),
        }
    }
}

/// Application state containing shared resources.
#[derive(Clone)]
pub struct AppState {
    /// Per-request wallet flows (onboarding, login, VCs, watches)
    pub wallet: Arc<WalletService>,
    /// Batched registration of unregistered watchers
    pub reconcile: Arc<ReconciliationJob>,
    /// Inbound provider callback relay
    pub callbacks: Arc<CallbackHandler>,
    /// Backfill, statistics and provider sync
    pub housekeeping: Arc<HousekeepingService>,
    /// User lookup for bearer authentication
    pub users: Arc<dyn UserStore>,
    /// Shared secret for `/housekeeping/*`; unset rejects every request
    pub housekeeping_secret: Option<Arc<str>>,
    /// Database pool, when running against PostgreSQL
    pub db_pool: Option<PgPool>,
}

impl AppState {
    /// Wire the services around one provider adapter.
    ///
    /// Adapters that can resolve VC documents get a callback hook that
    /// refreshes stored copies whenever the provider reports a change.
    pub fn new(
        adapter: ProviderAdapter,
        stores: Stores,
        gateway: Arc<GatewayConfig>,
        forwarder: Arc<dyn CallbackForwarder>,
    ) -> Self {
        let adapter = match adapter.vc_json_resolver() {
            Some(resolver) if adapter.callback().is_none() => adapter.with_callback(Arc::new(
                VcRefreshProcessor::new(resolver, stores.vcs.clone()),
            )),
            _ => adapter,
        };

        let registration = WatcherRegistrationService::new(
            adapter.clone(),
            stores.watchers.clone(),
            gateway.clone(),
        );
        let wallet = WalletService::new(
            registration.clone(),
            stores.users.clone(),
            stores.vcs.clone(),
            stores.watchers.clone(),
        );
        let reconcile = ReconciliationJob::new(registration, stores.watchers.clone());
        let callbacks = CallbackHandler::new(
            stores.watchers.clone(),
            adapter.clone(),
            forwarder,
            gateway.clone(),
        );
        let housekeeping = HousekeepingService::new(
            stores.watchers,
            stores.vcs,
            stores.users.clone(),
            adapter,
            gateway,
        );

        Self {
            wallet: Arc::new(wallet),
            reconcile: Arc::new(reconcile),
            callbacks: Arc::new(callbacks),
            housekeeping: Arc::new(housekeeping),
            users: stores.users,
            housekeeping_secret: None,
            db_pool: None,
        }
    }

    pub fn with_housekeeping_secret(mut self, secret: Option<String>) -> Self {
        self.housekeeping_secret = secret.map(Arc::from);
        self
    }

    pub fn with_db_pool(mut self, pool: PgPool) -> Self {
        self.db_pool = Some(pool);
        self
    }
}
