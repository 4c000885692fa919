//! Gateway settings shared by the registration, callback and housekeeping services.
//!
//! Loaded once at startup and shared behind an `Arc`; nothing reads the
//! environment after construction.

/// Path of the inbound watch callback, relative to the service base URL.
pub const CALLBACK_PATH: &str = "/api/wallet/vcs/watch/callback";

/// Provider used when a request does not name one.
pub const DEFAULT_PROVIDER: &str = "dhiway";

/// Immutable gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Public base URL of this service (`WALLET_SERVICE_BASE_URL`).
    pub service_base_url: String,
    /// Address the provider notifies for system watchers (`DHIWAY_WATCHER_EMAIL`).
    pub watcher_email: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            service_base_url: "http://localhost:3012".to_string(),
            watcher_email: "watcher@localhost".to_string(),
        }
    }
}

impl GatewayConfig {
    pub fn new(service_base_url: impl Into<String>, watcher_email: impl Into<String>) -> Self {
        Self {
            service_base_url: service_base_url.into().trim_end_matches('/').to_string(),
            watcher_email: watcher_email.into(),
        }
    }

    /// Load from `WALLET_SERVICE_BASE_URL` and `DHIWAY_WATCHER_EMAIL`.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let service_base_url = std::env::var("WALLET_SERVICE_BASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.service_base_url);

        let watcher_email = std::env::var("DHIWAY_WATCHER_EMAIL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.watcher_email);

        Self::new(service_base_url, watcher_email)
    }

    /// The URL every provider watch is registered against.
    pub fn callback_url(&self) -> String {
        format!("{}{}", self.service_base_url, CALLBACK_PATH)
    }

    /// True when `url` points back into this service.
    ///
    /// An empty base URL disables the check.
    pub fn is_self_url(&self, url: &str) -> bool {
        !self.service_base_url.is_empty() && url.contains(&self.service_base_url)
    }
}
