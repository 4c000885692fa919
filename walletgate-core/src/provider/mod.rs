//! Wallet provider adapters.
//!
//! Every provider implements [`WalletProvider`]. Optional features (OTP
//! login, VC watches, callback enrichment, full-document lookup) are
//! separate capability traits. A [`ProviderAdapter`] bundles one provider
//! with whichever capabilities it supports, resolved once at construction,
//! so callers never probe for methods at request time.
//!
//! ## Quick Start
//!
//! ```no_run
//! use walletgate_core::provider::{ProviderConfig, ProviderFactory};
//!
//! # fn example() -> walletgate_core::Result<()> {
//! let adapter = ProviderFactory::create(ProviderConfig::from_name("dhiway")?)?;
//! assert!(adapter.capabilities().watch);
//! # Ok(())
//! # }
//! ```

mod dhiway;
mod factory;
mod mock;
mod types;

pub use dhiway::{DhiwayConfig, DhiwayProvider};
pub use factory::{ProviderConfig, ProviderFactory};
pub use mock::{MockProvider, MockProviderBuilder};
pub use types::{
    CallbackPayload, LoginRequest, LoginVerifyRequest, LoginVerifyResponse, OnboardRequest,
    OnboardedAccount, QrUpload, ResendOtpRequest, UploadReceipt, VcDetails, VcSummary,
    WatchReceipt, WatchRequest,
};

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

/// Operations every wallet provider supports.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Provider name recorded on VC and watcher rows.
    fn name(&self) -> &str;

    async fn onboard_user(&self, request: &OnboardRequest) -> Result<OnboardedAccount>;

    /// Provider-side acknowledgement of a login already authenticated locally.
    async fn login(&self, request: &LoginRequest) -> Result<()>;

    /// The wallet's credentials, newest first.
    async fn get_all_vcs(&self, account_id: &str, token: &str) -> Result<Vec<VcSummary>>;

    async fn get_vc_by_id(&self, account_id: &str, vc_id: &str, token: &str)
        -> Result<VcDetails>;

    async fn upload_vc_from_qr(&self, upload: &QrUpload) -> Result<UploadReceipt>;
}

/// Two-step OTP login.
#[async_trait]
pub trait OtpLogin: Send + Sync {
    async fn verify_login(&self, request: &LoginVerifyRequest) -> Result<LoginVerifyResponse>;

    /// Returns the provider's confirmation message.
    async fn resend_otp(&self, request: &ResendOtpRequest) -> Result<String>;
}

/// Registration of change notifications for a VC.
#[async_trait]
pub trait WatchRegistrar: Send + Sync {
    /// Register a watch. A provider "already watching" answer is success.
    async fn watch_vc(&self, request: WatchRequest) -> Result<WatchReceipt>;
}

/// Provider-specific handling of an inbound watch callback.
#[async_trait]
pub trait CallbackProcessor: Send + Sync {
    async fn process_callback(&self, payload: &CallbackPayload) -> Result<()>;
}

/// Resolution of a listing entry to the complete VC document.
#[async_trait]
pub trait VcJsonResolver: Send + Sync {
    async fn get_vc_json_by_identifier(
        &self,
        username: &str,
        identifier: &str,
        token: &str,
    ) -> Result<serde_json::Value>;
}

/// Which optional capabilities an adapter carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProviderCapabilities {
    pub otp: bool,
    pub watch: bool,
    pub callback: bool,
    pub vc_json: bool,
}

/// A provider plus its resolved capability set.
#[derive(Clone)]
pub struct ProviderAdapter {
    core: Arc<dyn WalletProvider>,
    otp: Option<Arc<dyn OtpLogin>>,
    watch: Option<Arc<dyn WatchRegistrar>>,
    callback: Option<Arc<dyn CallbackProcessor>>,
    vc_json: Option<Arc<dyn VcJsonResolver>>,
}

impl ProviderAdapter {
    /// An adapter with only the core operations.
    pub fn new(core: Arc<dyn WalletProvider>) -> Self {
        Self {
            core,
            otp: None,
            watch: None,
            callback: None,
            vc_json: None,
        }
    }

    pub fn with_otp(mut self, otp: Arc<dyn OtpLogin>) -> Self {
        self.otp = Some(otp);
        self
    }

    pub fn with_watch(mut self, watch: Arc<dyn WatchRegistrar>) -> Self {
        self.watch = Some(watch);
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn CallbackProcessor>) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn with_vc_json(mut self, resolver: Arc<dyn VcJsonResolver>) -> Self {
        self.vc_json = Some(resolver);
        self
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    pub fn core(&self) -> &dyn WalletProvider {
        self.core.as_ref()
    }

    pub fn otp(&self) -> Option<&dyn OtpLogin> {
        self.otp.as_deref()
    }

    pub fn watch(&self) -> Option<&dyn WatchRegistrar> {
        self.watch.as_deref()
    }

    pub fn callback(&self) -> Option<&dyn CallbackProcessor> {
        self.callback.as_deref()
    }

    pub fn vc_json(&self) -> Option<&dyn VcJsonResolver> {
        self.vc_json.as_deref()
    }

    /// Shared handle to the resolver, for hooks that outlive a borrow.
    pub fn vc_json_resolver(&self) -> Option<Arc<dyn VcJsonResolver>> {
        self.vc_json.clone()
    }

    pub fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            otp: self.otp.is_some(),
            watch: self.watch.is_some(),
            callback: self.callback.is_some(),
            vc_json: self.vc_json.is_some(),
        }
    }
}

impl std::fmt::Debug for ProviderAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderAdapter")
            .field("name", &self.name())
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_follow_builder() {
        let mock = Arc::new(MockProvider::default());
        let bare = ProviderAdapter::new(mock.clone());
        assert_eq!(bare.capabilities(), ProviderCapabilities::default());
        assert!(bare.watch().is_none());

        let full = ProviderAdapter::new(mock.clone())
            .with_watch(mock.clone())
            .with_otp(mock);
        let caps = full.capabilities();
        assert!(caps.watch && caps.otp);
        assert!(!caps.callback && !caps.vc_json);
        assert_eq!(full.name(), "mock");
    }
}
