use std::sync::Arc;

use super::{DhiwayConfig, DhiwayProvider, MockProvider, ProviderAdapter};
use crate::config::DEFAULT_PROVIDER;
use crate::error::{Result, WalletError};

/// Provider selection.
#[derive(Debug, Clone)]
pub enum ProviderConfig {
    /// Dhiway wallet and issuer (production)
    Dhiway(DhiwayConfig),
    /// Scriptable mock (testing only)
    Mock,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::Dhiway(DhiwayConfig::from_env())
    }
}

impl ProviderConfig {
    /// Resolve a provider name, reading its settings from the environment.
    ///
    /// An empty name selects the default provider.
    pub fn from_name(name: &str) -> Result<Self> {
        let mut name = name.trim().to_lowercase();
        if name.is_empty() {
            name = DEFAULT_PROVIDER.to_string();
        }
        match name.as_str() {
            "dhiway" => Ok(Self::Dhiway(DhiwayConfig::from_env())),
            "mock" => Ok(Self::Mock),
            other => Err(WalletError::Validation(format!(
                "Unsupported wallet provider '{other}'"
            ))),
        }
    }
}

/// Factory for provider adapters.
pub struct ProviderFactory;

impl ProviderFactory {
    /// Build an adapter with every capability the provider supports.
    pub fn create(config: ProviderConfig) -> Result<ProviderAdapter> {
        match config {
            ProviderConfig::Dhiway(dhiway_config) => {
                let provider = Arc::new(DhiwayProvider::new(dhiway_config)?);
                Ok(ProviderAdapter::new(provider.clone())
                    .with_otp(provider.clone())
                    .with_watch(provider.clone())
                    .with_vc_json(provider))
            }
            ProviderConfig::Mock => {
                tracing::warn!("Using mock wallet provider - NOT FOR PRODUCTION");
                Ok(Arc::new(MockProvider::default()).adapter())
            }
        }
    }

    /// Shorthand for `create(ProviderConfig::from_name(name)?)`.
    pub fn create_by_name(name: &str) -> Result<ProviderAdapter> {
        Self::create(ProviderConfig::from_name(name)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider_is_rejected() {
        let err = ProviderConfig::from_name("acme").unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_dhiway_carries_all_capabilities_except_callback() {
        let adapter = ProviderFactory::create(ProviderConfig::Dhiway(DhiwayConfig::default()))
            .unwrap();
        let caps = adapter.capabilities();
        assert_eq!(adapter.name(), "dhiway");
        assert!(caps.otp && caps.watch && caps.vc_json);
        assert!(!caps.callback);
    }

    #[test]
    fn test_blank_name_selects_default() {
        assert!(matches!(
            ProviderConfig::from_name("  ").unwrap(),
            ProviderConfig::Dhiway(_)
        ));
        assert!(matches!(
            ProviderConfig::from_name("MOCK").unwrap(),
            ProviderConfig::Mock
        ));
    }
}
