//! Persistent records shared by the stores and services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A provider watch on one VC.
///
/// Rows are created unregistered and flip to registered once the provider
/// acknowledges the watch. They are never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherRecord {
    pub id: i64,
    pub vc_public_id: String,
    /// Absent for system-level watchers.
    pub user_id: Option<Uuid>,
    pub provider: String,
    pub watcher_registered: bool,
    pub watcher_email: String,
    /// Always this service's own callback endpoint.
    pub watcher_callback_url: Option<String>,
    /// External relay target for callbacks.
    pub forward_watcher_callback_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
}

impl WatcherRecord {
    pub fn key(&self) -> WatcherKey {
        WatcherKey {
            vc_public_id: self.vc_public_id.clone(),
            user_id: self.user_id,
            provider: self.provider.clone(),
            watcher_email: self.watcher_email.clone(),
        }
    }

    /// Where a callback for this watcher should be relayed, if anywhere.
    pub fn forward_target(&self) -> Option<&str> {
        self.forward_watcher_callback_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .or_else(|| {
                self.watcher_callback_url
                    .as_deref()
                    .filter(|u| !u.trim().is_empty())
            })
    }
}

/// Natural key of a watcher: at most one row per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatcherKey {
    pub vc_public_id: String,
    pub user_id: Option<Uuid>,
    pub provider: String,
    pub watcher_email: String,
}

/// Input for creating a watcher row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewWatcher {
    pub vc_public_id: String,
    pub user_id: Option<Uuid>,
    pub provider: String,
    pub watcher_registered: bool,
    pub watcher_email: String,
    pub watcher_callback_url: Option<String>,
    pub forward_watcher_callback_url: Option<String>,
    pub created_by: Option<String>,
}

impl NewWatcher {
    pub fn key(&self) -> WatcherKey {
        WatcherKey {
            vc_public_id: self.vc_public_id.clone(),
            user_id: self.user_id,
            provider: self.provider.clone(),
            watcher_email: self.watcher_email.clone(),
        }
    }
}

/// Partial update; `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatcherUpdate {
    pub watcher_registered: Option<bool>,
    pub watcher_email: Option<String>,
    pub watcher_callback_url: Option<String>,
    pub forward_watcher_callback_url: Option<String>,
    pub updated_by: Option<String>,
}

impl WatcherUpdate {
    pub fn registered(
        watcher_email: Option<String>,
        watcher_callback_url: Option<String>,
        updated_by: &str,
    ) -> Self {
        Self {
            watcher_registered: Some(true),
            watcher_email,
            watcher_callback_url,
            forward_watcher_callback_url: None,
            updated_by: Some(updated_by.to_string()),
        }
    }
}

/// A VC known to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VcRecord {
    pub id: i64,
    pub vc_public_id: String,
    pub user_id: Option<Uuid>,
    pub provider: String,
    pub vc_json: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewVc {
    pub vc_public_id: String,
    pub user_id: Option<Uuid>,
    pub provider: String,
    pub vc_json: Option<serde_json::Value>,
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Active,
    Inactive,
    Blocked,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Blocked => "blocked",
        }
    }
}

impl std::str::FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "blocked" => Ok(Self::Blocked),
            other => Err(format!("unknown user status '{other}'")),
        }
    }
}

/// A wallet user onboarded through the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub account_id: String,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    /// Provider session token; doubles as the gateway bearer token.
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub did: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub status: UserStatus,
    pub blocked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub account_id: String,
    pub username: String,
    pub password_hash: String,
    pub token: Option<String>,
    pub did: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// Last `/` separated segment of a URL, ignoring a trailing slash.
pub fn last_path_segment(url: &str) -> Option<&str> {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
}
