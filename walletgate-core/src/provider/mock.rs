//! Scriptable in-process provider for tests and local development.
//! WARNING: never select this provider in production; it issues fake tokens.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};

use super::types::{
    LoginRequest, LoginVerifyRequest, LoginVerifyResponse, OnboardRequest, OnboardedAccount,
    QrUpload, ResendOtpRequest, UploadReceipt, VcDetails, VcSummary, WatchReceipt, WatchRequest,
};
use super::{OtpLogin, ProviderAdapter, VcJsonResolver, WalletProvider, WatchRegistrar};
use crate::error::{Result, WalletError};
use crate::model::last_path_segment;

pub const MOCK_WATCHER_EMAIL: &str = "mock-watcher@example.org";

pub struct MockProvider {
    name: String,
    watch_enabled: bool,
    otp_enabled: bool,
    vc_json_enabled: bool,
    failing_watch_calls: HashSet<usize>,
    watch_delay: Duration,
    list_delay: Duration,
    vcs_by_token: DashMap<String, Vec<VcSummary>>,
    documents: DashMap<String, Value>,
    watch_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    watched: Mutex<Vec<String>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        MockProviderBuilder::default().build_inner()
    }
}

impl MockProvider {
    pub fn builder() -> MockProviderBuilder {
        MockProviderBuilder::default()
    }

    /// Bundle this mock with the capabilities it was built with.
    pub fn adapter(self: &Arc<Self>) -> ProviderAdapter {
        let mut adapter = ProviderAdapter::new(self.clone());
        if self.watch_enabled {
            adapter = adapter.with_watch(self.clone());
        }
        if self.otp_enabled {
            adapter = adapter.with_otp(self.clone());
        }
        if self.vc_json_enabled {
            adapter = adapter.with_vc_json(self.clone());
        }
        adapter
    }

    /// Number of `watch_vc` calls seen so far.
    pub fn watch_calls(&self) -> usize {
        self.watch_calls.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent `watch_vc` calls observed.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Public ids successfully watched, in completion order.
    pub fn watched(&self) -> Vec<String> {
        self.watched
            .lock()
            .map(|w| w.clone())
            .unwrap_or_default()
    }

    pub fn set_vcs(&self, token: &str, vcs: Vec<VcSummary>) {
        self.vcs_by_token.insert(token.to_string(), vcs);
    }
}

#[derive(Default)]
pub struct MockProviderBuilder {
    name: Option<String>,
    without_watch: bool,
    without_otp: bool,
    without_vc_json: bool,
    failing_watch_calls: HashSet<usize>,
    watch_delay: Duration,
    list_delay: Duration,
    documents: Vec<(String, Value)>,
}

impl MockProviderBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn without_watch(mut self) -> Self {
        self.without_watch = true;
        self
    }

    pub fn without_otp(mut self) -> Self {
        self.without_otp = true;
        self
    }

    pub fn without_vc_json(mut self) -> Self {
        self.without_vc_json = true;
        self
    }

    /// Fail the given 1-based `watch_vc` calls with a provider error.
    pub fn fail_watch_calls(mut self, calls: impl IntoIterator<Item = usize>) -> Self {
        self.failing_watch_calls.extend(calls);
        self
    }

    pub fn watch_delay(mut self, delay: Duration) -> Self {
        self.watch_delay = delay;
        self
    }

    pub fn list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = delay;
        self
    }

    pub fn document(mut self, identifier: impl Into<String>, document: Value) -> Self {
        self.documents.push((identifier.into(), document));
        self
    }

    pub fn build(self) -> Arc<MockProvider> {
        Arc::new(self.build_inner())
    }

    fn build_inner(self) -> MockProvider {
        MockProvider {
            name: self.name.unwrap_or_else(|| "mock".to_string()),
            watch_enabled: !self.without_watch,
            otp_enabled: !self.without_otp,
            vc_json_enabled: !self.without_vc_json,
            failing_watch_calls: self.failing_watch_calls,
            watch_delay: self.watch_delay,
            list_delay: self.list_delay,
            vcs_by_token: DashMap::new(),
            documents: self.documents.into_iter().collect(),
            watch_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            watched: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl WalletProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn onboard_user(&self, request: &OnboardRequest) -> Result<OnboardedAccount> {
        Ok(OnboardedAccount {
            account_id: request.account_id().to_string(),
            token: format!("mock-token-{}", request.username),
            did: Some(format!("did:mock:{}", request.username)),
        })
    }

    async fn login(&self, _request: &LoginRequest) -> Result<()> {
        Ok(())
    }

    async fn get_all_vcs(&self, _account_id: &str, token: &str) -> Result<Vec<VcSummary>> {
        if !self.list_delay.is_zero() {
            tokio::time::sleep(self.list_delay).await;
        }
        Ok(self
            .vcs_by_token
            .get(token)
            .map(|v| v.clone())
            .unwrap_or_default())
    }

    async fn get_vc_by_id(
        &self,
        account_id: &str,
        vc_id: &str,
        token: &str,
    ) -> Result<VcDetails> {
        let summary = self
            .get_all_vcs(account_id, token)
            .await?
            .into_iter()
            .find(|vc| vc.id == vc_id)
            .ok_or_else(|| WalletError::NotFound("Credential not found".into()))?;

        Ok(VcDetails {
            id: summary.id.clone(),
            name: summary.name.clone(),
            kind: "Verifiable Credential".to_string(),
            json: serde_json::to_value(&summary)?,
            credential_subject: json!({}),
        })
    }

    async fn upload_vc_from_qr(&self, upload: &QrUpload) -> Result<UploadReceipt> {
        if upload.qr_data.trim().is_empty() {
            return Err(WalletError::Validation("QR data is empty".into()));
        }
        if upload.did.is_none() {
            return Err(WalletError::Validation("User DID not found".into()));
        }
        Ok(UploadReceipt {
            status: "success".to_string(),
            vc_id: last_path_segment(&upload.qr_data)
                .unwrap_or("vc-uploaded")
                .to_string(),
        })
    }
}

#[async_trait]
impl WatchRegistrar for MockProvider {
    async fn watch_vc(&self, request: WatchRequest) -> Result<WatchReceipt> {
        let call = self.watch_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        if !self.watch_delay.is_zero() {
            tokio::time::sleep(self.watch_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_watch_calls.contains(&call) {
            return Err(WalletError::provider(
                502,
                format!("mock watch failure on call {call}"),
            ));
        }

        if let Ok(mut watched) = self.watched.lock() {
            watched.push(request.vc_public_id.clone());
        }

        Ok(WatchReceipt {
            status_code: 200,
            message: "VC watch registered successfully".to_string(),
            watch_id: Some(format!("mock-watch-{call}")),
            watcher_email: Some(
                request
                    .email
                    .unwrap_or_else(|| MOCK_WATCHER_EMAIL.to_string()),
            ),
            watcher_callback_url: Some(request.callback_url),
        })
    }
}

#[async_trait]
impl OtpLogin for MockProvider {
    async fn verify_login(&self, request: &LoginVerifyRequest) -> Result<LoginVerifyResponse> {
        if request.otp.is_empty() {
            return Err(WalletError::provider(401, "Invalid OTP"));
        }
        Ok(LoginVerifyResponse {
            token: format!("mock-otp-token-{}", request.session_id),
            account_id: request.session_id.clone(),
            message: "Login verification successful".to_string(),
        })
    }

    async fn resend_otp(&self, _request: &ResendOtpRequest) -> Result<String> {
        Ok("OTP resent successfully".to_string())
    }
}

#[async_trait]
impl VcJsonResolver for MockProvider {
    async fn get_vc_json_by_identifier(
        &self,
        _username: &str,
        identifier: &str,
        _token: &str,
    ) -> Result<Value> {
        Ok(self
            .documents
            .get(identifier)
            .map(|d| d.clone())
            .unwrap_or_else(|| json!({ "publicId": identifier, "identifier": identifier })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watch(id: &str) -> WatchRequest {
        WatchRequest {
            vc_public_id: id.into(),
            identifier: None,
            callback_url: "https://self/cb".into(),
            email: None,
        }
    }

    #[tokio::test]
    async fn test_mock_fails_scripted_calls() {
        let mock = MockProvider::builder().fail_watch_calls([2]).build();
        assert!(mock.watch_vc(watch("a")).await.is_ok());
        let err = mock.watch_vc(watch("b")).await.unwrap_err();
        assert_eq!(err.status_code(), 502);
        assert!(mock.watch_vc(watch("c")).await.is_ok());
        assert_eq!(mock.watch_calls(), 3);
        assert_eq!(mock.watched(), vec!["a".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_adapter_respects_disabled_capabilities() {
        let mock = MockProvider::builder().without_watch().without_otp().build();
        let adapter = mock.adapter();
        assert!(adapter.watch().is_none());
        assert!(adapter.otp().is_none());
        assert!(adapter.vc_json().is_some());
    }

    #[tokio::test]
    async fn test_mock_resolver_defaults_public_id() {
        let mock = MockProvider::builder()
            .document("rec-1", json!({"publicId": "pub-1"}))
            .build();
        let known = mock.get_vc_json_by_identifier("u", "rec-1", "t").await.unwrap();
        assert_eq!(known["publicId"], "pub-1");
        let unknown = mock.get_vc_json_by_identifier("u", "rec-2", "t").await.unwrap();
        assert_eq!(unknown["publicId"], "rec-2");
    }
}
