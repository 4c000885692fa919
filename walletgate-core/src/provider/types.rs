//! Request and response shapes exchanged with wallet providers.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardRequest {
    pub first_name: String,
    pub last_name: String,
    /// Provider-side account id; falls back to `username`.
    #[serde(default)]
    pub external_user_id: Option<String>,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl OnboardRequest {
    pub fn account_id(&self) -> &str {
        self.external_user_id
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.username)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardedAccount {
    pub account_id: String,
    pub token: String,
    pub did: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginVerifyRequest {
    pub session_id: String,
    pub otp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginVerifyResponse {
    pub token: String,
    pub account_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResendOtpRequest {
    pub session_id: String,
}

/// One entry of a wallet's credential list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VcSummary {
    pub id: String,
    pub name: String,
    pub active: bool,
    pub issued_at: String,
    pub expires_at: String,
    pub document_title: String,
    /// Provider record identifier used to resolve the full document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Issuer-assigned public id, when the listing exposes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VcDetails {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub json: serde_json::Value,
    pub credential_subject: serde_json::Value,
}

/// A QR upload on behalf of a wallet user.
#[derive(Debug, Clone, PartialEq)]
pub struct QrUpload {
    pub account_id: String,
    pub qr_data: String,
    pub token: String,
    /// The user's DID; required by providers that address messages by DID.
    pub did: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub status: String,
    pub vc_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchRequest {
    pub vc_public_id: String,
    #[serde(default)]
    pub identifier: Option<String>,
    pub callback_url: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Provider acknowledgement of a watch. Only produced for 2xx outcomes;
/// a 409 "already watching" is normalized to 200.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchReceipt {
    pub status_code: u16,
    pub message: String,
    pub watch_id: Option<String>,
    pub watcher_email: Option<String>,
    pub watcher_callback_url: Option<String>,
}

/// Inbound provider notification for a watched VC.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_public_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl CallbackPayload {
    /// The public id, if present and non-blank.
    pub fn public_id(&self) -> Option<&str> {
        self.record_public_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}
