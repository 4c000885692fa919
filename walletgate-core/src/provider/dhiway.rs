//! Dhiway wallet and issuer adapter.
//!
//! Talks to two services:
//! - the wallet API (`DHIWAY_API_BASE`): user creation, OTP login,
//!   credential listing and message-based VC upload
//! - the issuer (`DHIWAY_VC_ISSUER_INSTANCE_URI` and
//!   `DHIWAY_VC_ISSUER_GET_VC_BASE_URI`): public VC documents and watches
//!
//! Every call is made once under the client timeout. A failed call surfaces
//! as an error; the next reconciliation pass is the retry.

use std::cmp::Reverse;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument, warn};

use super::types::{
    LoginRequest, LoginVerifyRequest, LoginVerifyResponse, OnboardRequest, OnboardedAccount,
    QrUpload, ResendOtpRequest, UploadReceipt, VcDetails, VcSummary, WatchReceipt, WatchRequest,
};
use super::{OtpLogin, VcJsonResolver, WalletProvider, WatchRegistrar};
use crate::error::{Result, WalletError};
use crate::model::last_path_segment;

/// Default timeout for provider requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_VC_NAME: &str = "Verifiable Credential";

/// Configuration for the Dhiway adapter.
#[derive(Clone)]
pub struct DhiwayConfig {
    /// Wallet API base URL.
    pub api_base: String,
    /// Service API key sent as a bearer token.
    pub api_key: String,
    /// Issuer instance hosting the watch API.
    pub issuer_instance_uri: String,
    /// Base URL for public VC documents (`<base>/<public_id>.json`).
    pub issuer_vc_base_uri: String,
    /// Email used for watches when the request does not name one.
    pub watcher_email: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for DhiwayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DhiwayConfig")
            .field("api_base", &self.api_base)
            .field("api_key", &"[REDACTED]")
            .field("issuer_instance_uri", &self.issuer_instance_uri)
            .field("issuer_vc_base_uri", &self.issuer_vc_base_uri)
            .field("watcher_email", &self.watcher_email)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for DhiwayConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_key: String::new(),
            issuer_instance_uri: String::new(),
            issuer_vc_base_uri: String::new(),
            watcher_email: String::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl DhiwayConfig {
    /// Create configuration from environment variables.
    ///
    /// Unset variables stay empty; operations needing them fail with a
    /// configuration error instead of failing startup.
    pub fn from_env() -> Self {
        let var = |name: &str| {
            std::env::var(name)
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .unwrap_or_default()
        };

        Self {
            api_base: var("DHIWAY_API_BASE"),
            api_key: std::env::var("DHIWAY_API_KEY").unwrap_or_default(),
            issuer_instance_uri: var("DHIWAY_VC_ISSUER_INSTANCE_URI"),
            issuer_vc_base_uri: var("DHIWAY_VC_ISSUER_GET_VC_BASE_URI"),
            watcher_email: var("DHIWAY_WATCHER_EMAIL"),
            ..Default::default()
        }
    }
}

/// Credential entry as returned by `GET /api/v1/cred`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Credential {
    id: String,
    #[serde(default)]
    active: bool,
    #[serde(default)]
    identifier: Option<String>,
    #[serde(default)]
    details: Option<CredentialDetails>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default, rename = "credentialVC")]
    credential_vc: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialDetails {
    #[serde(default)]
    document_title: Option<String>,
}

impl Credential {
    fn document_title(&self) -> &str {
        self.details
            .as_ref()
            .and_then(|d| d.document_title.as_deref())
            .unwrap_or("")
    }

    /// The embedded VC, decoding it when the provider sends it as a JSON string.
    fn parsed_vc(&self) -> Option<Value> {
        match &self.credential_vc {
            Some(Value::String(raw)) => serde_json::from_str(raw).ok(),
            Some(v @ Value::Object(_)) => Some(v.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    #[serde(default)]
    account_id: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    did: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    message_id: Option<String>,
}

/// Dhiway wallet provider.
pub struct DhiwayProvider {
    client: Client,
    config: DhiwayConfig,
}

impl DhiwayProvider {
    #[instrument(level = "debug", skip_all, fields(
        api_base = %config.api_base,
        timeout_ms = config.timeout.as_millis() as u64
    ))]
    pub fn new(config: DhiwayConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build().map_err(|e| {
            warn!(error = %e, "Failed to create HTTP client");
            WalletError::Config(format!("Failed to create HTTP client: {e}"))
        })?;

        info!("Dhiway provider client created");
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &DhiwayConfig {
        &self.config
    }

    fn url(base: &str, setting: &str, path: &str) -> Result<String> {
        if base.is_empty() {
            return Err(WalletError::Config(format!("{setting} is not configured")));
        }
        Ok(format!("{base}{path}"))
    }

    fn wallet_url(&self, path: &str) -> Result<String> {
        Self::url(&self.config.api_base, "DHIWAY_API_BASE", path)
    }

    async fn list_credentials(&self, token: &str) -> Result<Vec<Credential>> {
        let response = self
            .client
            .get(self.wallet_url("/api/v1/cred")?)
            .bearer_auth(token)
            .send()
            .await?;
        read_json(response, "List credentials").await
    }

    /// Fetch the issuer's public document for a VC.
    #[instrument(level = "debug", skip(self))]
    pub async fn fetch_issuer_document(&self, public_id: &str) -> Result<Value> {
        let url = Self::url(
            &self.config.issuer_vc_base_uri,
            "DHIWAY_VC_ISSUER_GET_VC_BASE_URI",
            &format!("/{public_id}.json"),
        )?;
        let start = Instant::now();

        let response = self.client.get(&url).send().await.map_err(|e| {
            warn!(
                error = %e,
                latency_ms = start.elapsed().as_millis() as u64,
                "Issuer document request failed"
            );
            WalletError::Http(e)
        })?;

        let status = response.status();
        debug!(status = %status, "Received issuer response");
        if !status.is_success() {
            return Err(WalletError::provider(
                status.as_u16(),
                "Failed to fetch verifiable credential data",
            ));
        }

        let document: Value = response.json().await?;
        if document.is_null() {
            return Err(WalletError::NotFound(
                "No verifiable credential data found".into(),
            ));
        }
        Ok(document)
    }

    /// Download the VC referenced by a QR code (`<qr>.vc`).
    async fn fetch_vc_from_qr(&self, qr_data: &str) -> Result<Value> {
        if !qr_data.starts_with("http://") && !qr_data.starts_with("https://") {
            return Err(WalletError::Validation(
                "Invalid QR data: Must be a valid URI".into(),
            ));
        }

        let response = self.client.get(format!("{qr_data}.vc")).send().await?;
        let vc: Value = read_json(response, "Fetch VC from QR").await?;
        if !vc.is_object() {
            return Err(WalletError::Validation(
                "No verifiable credential data found in QR target".into(),
            ));
        }
        Ok(vc)
    }
}

#[async_trait]
impl WalletProvider for DhiwayProvider {
    fn name(&self) -> &str {
        "dhiway"
    }

    #[instrument(level = "debug", skip_all, fields(username = %request.username))]
    async fn onboard_user(&self, request: &OnboardRequest) -> Result<OnboardedAccount> {
        let account_id = request.account_id().to_string();
        let body = json!({
            "accountId": account_id,
            "name": format!("{} {}", request.first_name, request.last_name),
            "phone": request.phone,
        });

        let response = self
            .client
            .post(self.wallet_url("/api/v1/custom-user/create")?)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;
        let created: ApiResponse = read_json(response, "Onboard user").await?;

        info!(account_id = %account_id, "User created in Dhiway wallet");
        Ok(OnboardedAccount {
            account_id,
            token: created.token.unwrap_or_default(),
            did: created.did,
        })
    }

    async fn login(&self, request: &LoginRequest) -> Result<()> {
        // Credentials are checked locally; the wallet session token is issued at onboarding.
        debug!(username = %request.username, "Dhiway login acknowledged");
        Ok(())
    }

    #[instrument(level = "debug", skip(self, token))]
    async fn get_all_vcs(&self, account_id: &str, token: &str) -> Result<Vec<VcSummary>> {
        let credentials = self.list_credentials(token).await?;

        let mut summaries: Vec<VcSummary> = credentials
            .iter()
            .map(summarize_credential)
            .filter(|s| s.document_title != "otp")
            .collect();
        summaries.sort_by_key(|s| Reverse(issued_at_millis(&s.issued_at)));

        debug!(count = summaries.len(), "Credentials listed");
        Ok(summaries)
    }

    #[instrument(level = "debug", skip(self, token))]
    async fn get_vc_by_id(
        &self,
        account_id: &str,
        vc_id: &str,
        token: &str,
    ) -> Result<VcDetails> {
        let credentials = self.list_credentials(token).await?;
        let credential = credentials
            .into_iter()
            .find(|c| c.id == vc_id)
            .ok_or_else(|| WalletError::NotFound("Credential not found".into()))?;

        let parsed = credential.parsed_vc();
        let subject = parsed
            .as_ref()
            .and_then(|vc| vc.get("credentialSubject"))
            .and_then(Value::as_object)
            .map(rename_subject_dates)
            .unwrap_or_default();

        let title = credential.document_title();
        Ok(VcDetails {
            id: credential.id.clone(),
            name: if title.is_empty() {
                DEFAULT_VC_NAME.to_string()
            } else {
                title.to_string()
            },
            kind: credential
                .kind
                .clone()
                .unwrap_or_else(|| DEFAULT_VC_NAME.to_string()),
            json: credential.credential_vc.clone().unwrap_or_else(|| json!({})),
            credential_subject: Value::Object(subject),
        })
    }

    #[instrument(level = "debug", skip_all, fields(account_id = %upload.account_id))]
    async fn upload_vc_from_qr(&self, upload: &QrUpload) -> Result<UploadReceipt> {
        if upload.qr_data.trim().is_empty() {
            return Err(WalletError::Validation(
                "Unable to upload VC from QR: QR data is empty".into(),
            ));
        }
        let did = upload
            .did
            .as_deref()
            .filter(|d| !d.is_empty())
            .ok_or_else(|| WalletError::Validation("User DID not found".into()))?;

        let vc = self.fetch_vc_from_qr(&upload.qr_data).await?;
        let document_title = vc
            .get("credentialSubject")
            .and_then(|s| s.get("name"))
            .map(|n| match n {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default();

        let payload = json!({
            "id": vc.get("id").and_then(Value::as_str).unwrap_or("generated-id"),
            "fromDid": did,
            "toDid": did,
            "message": { "document": "string", "vc": vc },
            "details": { "meta": "string", "documentTitle": document_title, "user": "custom" },
            "type": "document",
        });

        let response = self
            .client
            .post(self.wallet_url(&format!("/api/v1/message/create/{did}"))?)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await?;
        let created: ApiResponse = read_json(response, "Upload VC").await?;

        Ok(UploadReceipt {
            status: "success".to_string(),
            vc_id: created
                .message_id
                .unwrap_or_else(|| "vc-uploaded".to_string()),
        })
    }
}

#[async_trait]
impl OtpLogin for DhiwayProvider {
    async fn verify_login(&self, request: &LoginVerifyRequest) -> Result<LoginVerifyResponse> {
        let response = self
            .client
            .post(self.wallet_url("/api/v1/otp/login-verify")?)
            .bearer_auth(&self.config.api_key)
            .json(&json!({ "sessionId": request.session_id, "otp": request.otp }))
            .send()
            .await?;
        let verified: ApiResponse = read_json(response, "Verify login").await?;

        Ok(LoginVerifyResponse {
            token: verified.token.unwrap_or_default(),
            account_id: verified
                .account_id
                .or(verified.user_id)
                .unwrap_or_default(),
            message: verified
                .message
                .unwrap_or_else(|| "Login verification successful".to_string()),
        })
    }

    async fn resend_otp(&self, request: &ResendOtpRequest) -> Result<String> {
        let response = self
            .client
            .post(self.wallet_url("/api/v1/otp/resendOtp")?)
            .bearer_auth(&self.config.api_key)
            .json(&json!({ "sessionId": request.session_id }))
            .send()
            .await?;
        let resent: ApiResponse = read_json(response, "Resend OTP").await?;
        Ok(resent
            .message
            .unwrap_or_else(|| "OTP resent successfully".to_string()))
    }
}

#[async_trait]
impl WatchRegistrar for DhiwayProvider {
    #[instrument(level = "debug", skip_all, fields(vc_public_id = %request.vc_public_id))]
    async fn watch_vc(&self, request: WatchRequest) -> Result<WatchReceipt> {
        let email = request
            .email
            .clone()
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| self.config.watcher_email.clone());
        if email.is_empty() || request.callback_url.is_empty() {
            return Err(WalletError::Config(
                "Watch configuration incomplete: watcher email or callback URL missing".into(),
            ));
        }
        let watch_url = Self::url(
            &self.config.issuer_instance_uri,
            "DHIWAY_VC_ISSUER_INSTANCE_URI",
            "/api/watch",
        )?;

        let document = self.fetch_issuer_document(&request.vc_public_id).await?;
        let record_public_id = document
            .get("publicId")
            .and_then(Value::as_str)
            .unwrap_or(&request.vc_public_id)
            .to_string();
        let identifier = document
            .get("identifier")
            .and_then(Value::as_str)
            .map(String::from)
            .or(request.identifier);

        let response = self
            .client
            .post(watch_url)
            .bearer_auth(&self.config.api_key)
            .json(&json!({
                "identifier": identifier,
                "recordPublicId": record_public_id,
                "email": email,
                "callbackUrl": request.callback_url,
            }))
            .send()
            .await?;

        let status = response.status();
        let body: ApiResponse = response.json().await.unwrap_or_default();

        let message = match status {
            StatusCode::CONFLICT => "VC watch already registered",
            StatusCode::OK | StatusCode::CREATED => "VC watch registered successfully",
            other => {
                warn!(status = %other, "Issuer rejected watch registration");
                return Err(WalletError::provider(
                    other.as_u16(),
                    format!("Failed to register VC watch (HTTP {})", other.as_u16()),
                ));
            }
        };

        info!(status = %status, record_public_id = %record_public_id, "{message}");
        Ok(WatchReceipt {
            status_code: if status == StatusCode::CONFLICT {
                200
            } else {
                status.as_u16()
            },
            message: message.to_string(),
            watch_id: body.message_id,
            watcher_email: Some(email),
            watcher_callback_url: Some(request.callback_url),
        })
    }
}

#[async_trait]
impl VcJsonResolver for DhiwayProvider {
    /// Dhiway resolves by issuer public id; the user session is not needed.
    async fn get_vc_json_by_identifier(
        &self,
        _username: &str,
        identifier: &str,
        _token: &str,
    ) -> Result<Value> {
        self.fetch_issuer_document(identifier).await
    }
}

async fn read_json<T: DeserializeOwned>(response: Response, operation: &str) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(status = %status, operation, body = %body, "Provider returned error status");
        return Err(WalletError::provider(
            status.as_u16(),
            format!("{operation} failed (HTTP {})", status.as_u16()),
        ));
    }
    Ok(response.json().await?)
}

fn summarize_credential(cred: &Credential) -> VcSummary {
    let parsed = cred.parsed_vc();
    let field = |name: &str| {
        parsed
            .as_ref()
            .and_then(|vc| vc.get(name))
            .map(|v| match v {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            })
            .unwrap_or_default()
    };

    let name = parsed
        .as_ref()
        .and_then(|vc| vc.pointer("/credentialSchema/title"))
        .and_then(Value::as_str)
        .and_then(|t| t.split(':').next())
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_VC_NAME)
        .to_string();

    let has_validity = parsed.as_ref().is_some_and(|vc| vc.get("validFrom").is_some());
    let (issued_at, expires_at) = if has_validity {
        (field("validFrom"), field("validUntil"))
    } else {
        (String::new(), String::new())
    };

    let public_id = parsed
        .as_ref()
        .and_then(|vc| vc.get("id"))
        .and_then(Value::as_str)
        .filter(|id| id.starts_with("http://") || id.starts_with("https://"))
        .and_then(last_path_segment)
        .map(String::from);

    VcSummary {
        id: cred.id.clone(),
        name,
        active: cred.active,
        issued_at,
        expires_at,
        document_title: cred.document_title().to_string(),
        identifier: public_id.clone().or_else(|| cred.identifier.clone()),
        public_id,
    }
}

fn issued_at_millis(issued_at: &str) -> i64 {
    DateTime::parse_from_rfc3339(issued_at)
        .map(|d| d.timestamp_millis())
        .unwrap_or(0)
}

/// Present `end_date` and `issue_date` under display names.
fn rename_subject_dates(subject: &Map<String, Value>) -> Map<String, Value> {
    let mut renamed = Map::new();
    for (key, value) in subject {
        match key.as_str() {
            "end_date" => {
                renamed.insert("Expiry Date".to_string(), value.clone());
            }
            "issue_date" => {
                renamed.insert("Issue Date".to_string(), value.clone());
            }
            _ => {
                renamed.insert(key.clone(), value.clone());
            }
        }
    }
    renamed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(value: Value) -> Credential {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_summarize_string_encoded_vc() {
        let cred = credential(json!({
            "id": "c-1",
            "active": true,
            "details": {"documentTitle": "Degree"},
            "credentialVC": "{\"id\":\"https://issuer.example/v/pub-1\",\"validFrom\":\"2024-01-01T00:00:00Z\",\"validUntil\":\"2026-01-01T00:00:00Z\",\"credentialSchema\":{\"title\":\"Degree:v1\"}}"
        }));
        let summary = summarize_credential(&cred);
        assert_eq!(summary.name, "Degree");
        assert_eq!(summary.issued_at, "2024-01-01T00:00:00Z");
        assert_eq!(summary.expires_at, "2026-01-01T00:00:00Z");
        assert_eq!(summary.public_id.as_deref(), Some("pub-1"));
        assert_eq!(summary.identifier.as_deref(), Some("pub-1"));
    }

    #[test]
    fn test_summarize_unparseable_vc_uses_defaults() {
        let cred = credential(json!({
            "id": "c-2",
            "identifier": "rec-9",
            "credentialVC": "not json"
        }));
        let summary = summarize_credential(&cred);
        assert_eq!(summary.name, DEFAULT_VC_NAME);
        assert!(summary.issued_at.is_empty());
        assert!(!summary.active);
        assert_eq!(summary.identifier.as_deref(), Some("rec-9"));
        assert_eq!(summary.public_id, None);
    }

    #[test]
    fn test_rename_subject_dates() {
        let subject = json!({"name": "A", "end_date": "2030", "issue_date": "2020"});
        let renamed = rename_subject_dates(subject.as_object().unwrap());
        assert_eq!(renamed["Expiry Date"], "2030");
        assert_eq!(renamed["Issue Date"], "2020");
        assert!(!renamed.contains_key("end_date"));
        assert_eq!(renamed["name"], "A");
    }

    #[test]
    fn test_issued_at_ordering_key() {
        assert!(issued_at_millis("2025-01-01T00:00:00Z") > issued_at_millis("2024-01-01T00:00:00Z"));
        assert_eq!(issued_at_millis(""), 0);
    }

    #[test]
    fn test_config_debug_redacts_key() {
        let config = DhiwayConfig {
            api_key: "super-secret".into(),
            ..Default::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn test_missing_base_url_is_config_error() {
        let provider = DhiwayProvider::new(DhiwayConfig::default()).unwrap();
        let err = provider.get_all_vcs("acc", "tok").await.unwrap_err();
        assert!(matches!(err, WalletError::Config(_)));
        assert_eq!(err.status_code(), 500);
    }
}
