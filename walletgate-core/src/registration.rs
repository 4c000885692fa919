//! Watcher registration.
//!
//! Makes sure a VC has a watcher that the provider has acknowledged. Used by
//! uploads, user watch requests, the reconciliation job and manual triggers.
//! Registration is idempotent: once any watcher for `(vc_public_id, provider)`
//! is registered, later calls succeed without contacting the provider.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::error::{Result, WalletError};
use crate::model::{NewWatcher, WatcherRecord, WatcherUpdate};
use crate::provider::{ProviderAdapter, WatchRequest};
use crate::store::WatcherStore;

/// Trigger label for registrations started by a VC upload.
pub const TRIGGER_USER_UPLOAD: &str = "user-upload";

/// Outcome of a registration attempt. Never an `Err`: failures are reported
/// through `success` and `status_code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResult {
    pub success: bool,
    pub status_code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watcher_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watcher_callback_url: Option<String>,
}

impl RegistrationResult {
    fn registered(status_code: u16, message: impl Into<String>, record: &WatcherRecord) -> Self {
        Self {
            success: true,
            status_code,
            message: message.into(),
            watcher_email: Some(record.watcher_email.clone()),
            watcher_callback_url: record.watcher_callback_url.clone(),
        }
    }

    fn from_error(err: &WalletError) -> Self {
        let (status_code, message) = match err {
            WalletError::Provider { status, message } => (*status, message.clone()),
            WalletError::Unsupported(m) | WalletError::Validation(m) => (400, m.clone()),
            other => (500, format!("Failed to register watcher: {other}")),
        };
        Self {
            success: false,
            status_code,
            message,
            watcher_email: None,
            watcher_callback_url: None,
        }
    }
}

#[derive(Clone)]
pub struct WatcherRegistrationService {
    adapter: ProviderAdapter,
    watchers: Arc<dyn WatcherStore>,
    config: Arc<GatewayConfig>,
}

impl WatcherRegistrationService {
    pub fn new(
        adapter: ProviderAdapter,
        watchers: Arc<dyn WatcherStore>,
        config: Arc<GatewayConfig>,
    ) -> Self {
        Self {
            adapter,
            watchers,
            config,
        }
    }

    pub fn adapter(&self) -> &ProviderAdapter {
        &self.adapter
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Register a watcher for `vc_public_id` unless one is already registered.
    #[instrument(level = "info", skip(self), fields(provider = %provider))]
    pub async fn register_watcher_for_vc(
        &self,
        vc_public_id: &str,
        provider: &str,
        triggered_by: &str,
        user_id: Option<Uuid>,
    ) -> RegistrationResult {
        match self
            .try_register(vc_public_id, provider, triggered_by, user_id)
            .await
        {
            Ok(result) => result,
            Err(err) => {
                let result = RegistrationResult::from_error(&err);
                if result.status_code >= 500 {
                    error!(error = %err, status = result.status_code, "Watcher registration failed");
                } else {
                    warn!(error = %err, status = result.status_code, "Watcher registration rejected");
                }
                result
            }
        }
    }

    /// Registration entry point for freshly uploaded VCs.
    pub async fn register_watcher_for_uploaded_vc(
        &self,
        vc_public_id: &str,
        provider: &str,
        user_id: Uuid,
    ) -> RegistrationResult {
        self.register_watcher_for_vc(vc_public_id, provider, TRIGGER_USER_UPLOAD, Some(user_id))
            .await
    }

    async fn try_register(
        &self,
        vc_public_id: &str,
        provider: &str,
        triggered_by: &str,
        user_id: Option<Uuid>,
    ) -> Result<RegistrationResult> {
        let existing = self
            .watchers
            .find_by_vc_and_provider(vc_public_id, provider)
            .await?;

        if let Some(registered) = existing.iter().find(|w| w.watcher_registered) {
            debug!("Watcher already registered, skipping provider call");
            if let Err(err) = self
                .mark_registered(
                    existing.iter().filter(|w| !w.watcher_registered),
                    registered.watcher_callback_url.clone(),
                    triggered_by,
                )
                .await
            {
                warn!(error = %err, "Failed to mark sibling watchers registered");
            }
            return Ok(RegistrationResult::registered(
                200,
                "Watcher already registered",
                registered,
            ));
        }

        let watch = self.adapter.watch().ok_or_else(|| {
            WalletError::Unsupported(
                "Watch functionality not supported by this wallet provider".into(),
            )
        })?;

        let receipt = watch
            .watch_vc(WatchRequest {
                vc_public_id: vc_public_id.to_string(),
                identifier: None,
                callback_url: self.config.callback_url(),
                email: Some(self.config.watcher_email.clone()).filter(|e| !e.is_empty()),
            })
            .await?;

        let email = receipt
            .watcher_email
            .clone()
            .unwrap_or_else(|| self.config.watcher_email.clone());
        let callback_url = receipt
            .watcher_callback_url
            .clone()
            .unwrap_or_else(|| self.config.callback_url());

        let record = if existing.is_empty() {
            let (record, created) = self
                .watchers
                .find_or_create(NewWatcher {
                    vc_public_id: vc_public_id.to_string(),
                    user_id,
                    provider: provider.to_string(),
                    watcher_registered: true,
                    watcher_email: email.clone(),
                    watcher_callback_url: Some(callback_url.clone()),
                    forward_watcher_callback_url: None,
                    created_by: Some(triggered_by.to_string()),
                })
                .await?;
            if created {
                record
            } else {
                self.mark_registered(std::iter::once(&record), Some(callback_url), triggered_by)
                    .await?
                    .pop()
                    .unwrap_or(record)
            }
        } else {
            let mut updated = self
                .mark_registered(existing.iter(), Some(callback_url), triggered_by)
                .await?;
            match updated.pop() {
                Some(record) => record,
                None => return Err(WalletError::store("watcher rows vanished during update")),
            }
        };

        info!(
            vc_public_id = %vc_public_id,
            triggered_by = %triggered_by,
            status = receipt.status_code,
            "Watcher registered with provider"
        );
        Ok(RegistrationResult::registered(
            receipt.status_code,
            receipt.message,
            &record,
        ))
    }

    /// Flip rows to registered. Emails are left alone since they are part of
    /// the natural key.
    async fn mark_registered<'a>(
        &self,
        rows: impl Iterator<Item = &'a WatcherRecord>,
        callback_url: Option<String>,
        updated_by: &str,
    ) -> Result<Vec<WatcherRecord>> {
        let mut updated = Vec::new();
        for row in rows {
            let update = WatcherUpdate::registered(None, callback_url.clone(), updated_by);
            if let Some(record) = self.watchers.update(row.id, update).await? {
                updated.push(record);
            }
        }
        Ok(updated)
    }
}
