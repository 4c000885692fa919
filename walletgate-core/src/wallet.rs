//! Per-request wallet flows: onboarding, login, VC access, QR upload and
//! user-initiated watches.
//!
//! Provider calls pass straight through the adapter. Local bookkeeping after
//! a successful provider call (VC rows, watcher rows) never fails the call.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use url::Url;

use crate::config::GatewayConfig;
use crate::error::{Result, WalletError};
use crate::model::{last_path_segment, NewUser, NewVc, NewWatcher, User, UserStatus, WatcherUpdate};
use crate::password::{hash_password, verify_password};
use crate::provider::{
    LoginRequest, LoginVerifyRequest, LoginVerifyResponse, OnboardRequest, OnboardedAccount,
    ProviderAdapter, QrUpload, ResendOtpRequest, UploadReceipt, VcDetails, VcSummary,
};
use crate::registration::{RegistrationResult, WatcherRegistrationService};
use crate::store::{UserStore, VcStore, WatcherStore};

/// Trigger label for watches requested by a wallet user.
pub const TRIGGER_USER_REQUEST: &str = "user-request";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardResult {
    #[serde(flatten)]
    pub account: OnboardedAccount,
    pub user: User,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResult {
    pub token: Option<String>,
    pub account_id: String,
    pub user: User,
}

/// A user's request to be notified about a VC.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchVcRequest {
    pub vc_public_id: String,
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(default)]
    pub forward_watcher_callback_url: Option<String>,
}

#[derive(Clone)]
pub struct WalletService {
    adapter: ProviderAdapter,
    users: Arc<dyn UserStore>,
    vcs: Arc<dyn VcStore>,
    watchers: Arc<dyn WatcherStore>,
    registration: WatcherRegistrationService,
    config: Arc<GatewayConfig>,
}

impl WalletService {
    pub fn new(
        registration: WatcherRegistrationService,
        users: Arc<dyn UserStore>,
        vcs: Arc<dyn VcStore>,
        watchers: Arc<dyn WatcherStore>,
    ) -> Self {
        Self {
            adapter: registration.adapter().clone(),
            config: Arc::new(registration.config().clone()),
            users,
            vcs,
            watchers,
            registration,
        }
    }

    pub fn adapter(&self) -> &ProviderAdapter {
        &self.adapter
    }

    /// Create the wallet with the provider, then record the user locally.
    #[instrument(level = "info", skip_all, fields(username = %request.username))]
    pub async fn onboard_user(&self, request: &OnboardRequest) -> Result<OnboardResult> {
        if request.username.trim().is_empty() || request.password.is_empty() {
            return Err(WalletError::Validation(
                "username and password are required".into(),
            ));
        }
        if self.users.find_by_username(&request.username).await?.is_some() {
            return Err(WalletError::Conflict("Username already exists".into()));
        }
        if let Some(email) = request.email.as_deref().filter(|e| !e.is_empty()) {
            if self.users.find_by_email(email).await?.is_some() {
                return Err(WalletError::Conflict("Email already registered".into()));
            }
        }

        let account = self.adapter.core().onboard_user(request).await?;
        let password_hash = hash_password(&request.password)?;

        let user = self
            .users
            .create(NewUser {
                first_name: request.first_name.clone(),
                last_name: request.last_name.clone(),
                account_id: account.account_id.clone(),
                username: request.username.clone(),
                password_hash,
                token: Some(account.token.clone()),
                did: account.did.clone(),
                phone: request.phone.clone(),
                email: request.email.clone(),
            })
            .await
            .map_err(|e| {
                error!(error = %e, "Wallet created but local user could not be saved");
                WalletError::store("User created in wallet but failed to save locally")
            })?;

        info!(user_id = %user.id, "User onboarded");
        Ok(OnboardResult { account, user })
    }

    /// Authenticate against the local user table, then let the provider
    /// acknowledge the session.
    #[instrument(level = "info", skip_all, fields(username = %request.username))]
    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResult> {
        let invalid = || WalletError::Unauthorized("Invalid credentials".into());

        let user = self
            .users
            .find_by_username(&request.username)
            .await?
            .ok_or_else(invalid)?;
        if !verify_password(&request.password, &user.password_hash) {
            return Err(invalid());
        }
        if user.blocked || user.status == UserStatus::Blocked {
            return Err(WalletError::Forbidden("User account is blocked".into()));
        }

        self.adapter.core().login(request).await?;
        Ok(LoginResult {
            token: user.token.clone(),
            account_id: user.account_id.clone(),
            user,
        })
    }

    pub async fn verify_login(&self, request: &LoginVerifyRequest) -> Result<LoginVerifyResponse> {
        let otp = self.adapter.otp().ok_or_else(|| {
            WalletError::Unsupported("OTP verification not supported by this wallet provider".into())
        })?;
        otp.verify_login(request).await
    }

    pub async fn resend_otp(&self, request: &ResendOtpRequest) -> Result<String> {
        let otp = self.adapter.otp().ok_or_else(|| {
            WalletError::Unsupported("OTP resend not supported by this wallet provider".into())
        })?;
        otp.resend_otp(request).await
    }

    pub async fn list_vcs(&self, account_id: &str, token: &str) -> Result<Vec<VcSummary>> {
        self.adapter.core().get_all_vcs(account_id, token).await
    }

    pub async fn get_vc(&self, account_id: &str, vc_id: &str, token: &str) -> Result<VcDetails> {
        self.adapter.core().get_vc_by_id(account_id, vc_id, token).await
    }

    /// Upload a VC scanned from a QR code into the user's wallet.
    ///
    /// On success the VC is recorded locally and a watcher is registered for
    /// it. Failures in that follow-up are logged; the upload still succeeds.
    #[instrument(level = "info", skip_all, fields(user_id = %user.id))]
    pub async fn upload_vc_from_qr(&self, user: &User, qr_data: &str) -> Result<UploadReceipt> {
        let token = user
            .token
            .clone()
            .ok_or_else(|| WalletError::Unauthorized("User has no wallet session".into()))?;

        let receipt = self
            .adapter
            .core()
            .upload_vc_from_qr(&QrUpload {
                account_id: user.account_id.clone(),
                qr_data: qr_data.to_string(),
                token,
                did: user.did.clone(),
            })
            .await?;

        match last_path_segment(qr_data) {
            Some(vc_public_id) => {
                if let Err(err) = self.record_uploaded_vc(vc_public_id, user).await {
                    error!(vc_public_id = %vc_public_id, error = %err, "Failed to record uploaded VC");
                }
            }
            None => warn!("Could not derive a VC public id from the QR data"),
        }
        Ok(receipt)
    }

    async fn record_uploaded_vc(&self, vc_public_id: &str, user: &User) -> Result<()> {
        let provider = self.adapter.name();
        let created_by = Some(user.id.to_string());

        self.vcs
            .upsert(NewVc {
                vc_public_id: vc_public_id.to_string(),
                user_id: Some(user.id),
                provider: provider.to_string(),
                vc_json: None,
                created_by: created_by.clone(),
            })
            .await?;
        self.watchers
            .find_or_create(NewWatcher {
                vc_public_id: vc_public_id.to_string(),
                user_id: Some(user.id),
                provider: provider.to_string(),
                watcher_registered: false,
                watcher_email: self.config.watcher_email.clone(),
                watcher_callback_url: Some(self.config.callback_url()),
                forward_watcher_callback_url: None,
                created_by,
            })
            .await?;

        let result = self
            .registration
            .register_watcher_for_uploaded_vc(vc_public_id, provider, user.id)
            .await;
        if result.success {
            info!(vc_public_id = %vc_public_id, "Watcher registered for uploaded VC");
        } else {
            warn!(
                vc_public_id = %vc_public_id,
                status = result.status_code,
                message = %result.message,
                "Watcher registration for uploaded VC failed"
            );
        }
        Ok(())
    }

    /// Watch a VC on the user's behalf, relaying callbacks to the URL they
    /// supply.
    #[instrument(level = "info", skip_all, fields(user_id = %user.id, vc_public_id = %request.vc_public_id))]
    pub async fn watch_vc(&self, user: &User, request: &WatchVcRequest) -> Result<RegistrationResult> {
        let vc_public_id = request.vc_public_id.trim();
        if vc_public_id.is_empty() {
            return Err(WalletError::Validation("vcPublicId is required".into()));
        }
        if self.adapter.watch().is_none() {
            return Err(WalletError::Unsupported(
                "Watch functionality not supported by this wallet provider".into(),
            ));
        }

        let forward = self.forward_url(request)?;
        let provider = self.adapter.name();
        let (record, created) = self
            .watchers
            .find_or_create(NewWatcher {
                vc_public_id: vc_public_id.to_string(),
                user_id: Some(user.id),
                provider: provider.to_string(),
                watcher_registered: false,
                watcher_email: self.config.watcher_email.clone(),
                watcher_callback_url: Some(self.config.callback_url()),
                forward_watcher_callback_url: forward.clone(),
                created_by: Some(user.id.to_string()),
            })
            .await?;

        if !created && forward.is_some() && record.forward_watcher_callback_url != forward {
            self.watchers
                .update(
                    record.id,
                    WatcherUpdate {
                        forward_watcher_callback_url: forward,
                        updated_by: Some(user.id.to_string()),
                        ..Default::default()
                    },
                )
                .await?;
        }

        Ok(self
            .registration
            .register_watcher_for_vc(vc_public_id, provider, TRIGGER_USER_REQUEST, Some(user.id))
            .await)
    }

    /// The external relay target: the explicit forward URL, else the
    /// caller's callback URL unless it points back at this service.
    fn forward_url(&self, request: &WatchVcRequest) -> Result<Option<String>> {
        let candidate = request
            .forward_watcher_callback_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .or_else(|| {
                request
                    .callback_url
                    .as_deref()
                    .map(str::trim)
                    .filter(|u| !u.is_empty() && !self.config.is_self_url(u))
            });

        let Some(url) = candidate else {
            return Ok(None);
        };
        if self.config.is_self_url(url) {
            return Err(WalletError::Validation(
                "forwardWatcherCallbackUrl must not point at this service".into(),
            ));
        }
        match Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(Some(url.to_string())),
            _ => Err(WalletError::Validation(format!("Invalid callback URL: {url}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockProvider;
    use crate::store::{MemoryUserStore, MemoryVcStore, MemoryWatcherStore};

    struct Fixture {
        mock: Arc<MockProvider>,
        users: Arc<MemoryUserStore>,
        vcs: Arc<MemoryVcStore>,
        watchers: Arc<MemoryWatcherStore>,
        service: WalletService,
    }

    fn fixture(mock: Arc<MockProvider>) -> Fixture {
        let users = Arc::new(MemoryUserStore::new());
        let vcs = Arc::new(MemoryVcStore::new());
        let watchers = Arc::new(MemoryWatcherStore::new());
        let registration = WatcherRegistrationService::new(
            mock.adapter(),
            watchers.clone(),
            Arc::new(GatewayConfig::new("https://gw.example", "w@gw")),
        );
        let service = WalletService::new(registration, users.clone(), vcs.clone(), watchers.clone());
        Fixture {
            mock,
            users,
            vcs,
            watchers,
            service,
        }
    }

    fn onboard(username: &str) -> OnboardRequest {
        OnboardRequest {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            external_user_id: None,
            username: username.into(),
            password: "s3cret-pass".into(),
            email: Some(format!("{username}@example.org")),
            phone: None,
        }
    }

    #[tokio::test]
    async fn test_onboard_then_login() {
        let f = fixture(MockProvider::builder().build());
        let onboarded = f.service.onboard_user(&onboard("ada")).await.unwrap();
        assert_eq!(onboarded.account.token, "mock-token-ada");
        assert_eq!(onboarded.user.did.as_deref(), Some("did:mock:ada"));

        let login = f
            .service
            .login(&LoginRequest {
                username: "ada".into(),
                password: "s3cret-pass".into(),
            })
            .await
            .unwrap();
        assert_eq!(login.token.as_deref(), Some("mock-token-ada"));

        let wrong = f
            .service
            .login(&LoginRequest {
                username: "ada".into(),
                password: "nope".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(wrong.status_code(), 401);
    }

    #[tokio::test]
    async fn test_duplicate_username_and_email_conflict() {
        let f = fixture(MockProvider::builder().build());
        f.service.onboard_user(&onboard("ada")).await.unwrap();

        let err = f.service.onboard_user(&onboard("ada")).await.unwrap_err();
        assert_eq!(err.status_code(), 409);

        let mut other = onboard("grace");
        other.email = Some("ada@example.org".into());
        let err = f.service.onboard_user(&other).await.unwrap_err();
        assert_eq!(err.status_code(), 409);
        assert_eq!(f.users.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_otp_unsupported_is_400() {
        let f = fixture(MockProvider::builder().without_otp().build());
        let err = f
            .service
            .resend_otp(&ResendOtpRequest {
                session_id: "s".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_upload_records_vc_and_registers_watcher() {
        let f = fixture(MockProvider::builder().build());
        let user = f.service.onboard_user(&onboard("ada")).await.unwrap().user;

        let receipt = f
            .service
            .upload_vc_from_qr(&user, "https://issuer.example/v/pub-42")
            .await
            .unwrap();
        assert_eq!(receipt.vc_id, "pub-42");

        assert!(f.vcs.exists_for_user("pub-42", user.id).await.unwrap());
        let watchers = f.watchers.find_by_vc_public_id("pub-42").await.unwrap();
        assert_eq!(watchers.len(), 1);
        assert!(watchers[0].watcher_registered);
        assert_eq!(f.mock.watch_calls(), 1);
    }

    #[tokio::test]
    async fn test_watch_stores_forward_url_but_not_self_callback() {
        let f = fixture(MockProvider::builder().build());
        let user = f.service.onboard_user(&onboard("ada")).await.unwrap().user;

        let result = f
            .service
            .watch_vc(
                &user,
                &WatchVcRequest {
                    vc_public_id: "pub-1".into(),
                    callback_url: Some("https://gw.example/api/wallet/vcs/watch/callback".into()),
                    forward_watcher_callback_url: None,
                },
            )
            .await
            .unwrap();
        assert!(result.success);
        let rows = f.watchers.find_by_vc_public_id("pub-1").await.unwrap();
        assert_eq!(rows[0].forward_watcher_callback_url, None);

        f.service
            .watch_vc(
                &user,
                &WatchVcRequest {
                    vc_public_id: "pub-1".into(),
                    callback_url: Some("https://app.example/hooks/vc".into()),
                    forward_watcher_callback_url: None,
                },
            )
            .await
            .unwrap();
        let rows = f.watchers.find_by_vc_public_id("pub-1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].forward_watcher_callback_url.as_deref(),
            Some("https://app.example/hooks/vc")
        );
        assert_eq!(f.mock.watch_calls(), 1);
    }

    #[tokio::test]
    async fn test_watch_rejects_malformed_forward_url() {
        let f = fixture(MockProvider::builder().build());
        let user = f.service.onboard_user(&onboard("ada")).await.unwrap().user;
        let err = f
            .service
            .watch_vc(
                &user,
                &WatchVcRequest {
                    vc_public_id: "pub-1".into(),
                    callback_url: None,
                    forward_watcher_callback_url: Some("not a url".into()),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
