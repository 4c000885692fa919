//! Inbound provider watch callbacks.
//!
//! A callback names a VC by its provider public id. Every watcher for that id
//! is resolved and the payload is relayed to the watcher's external target,
//! never back into this service. Delivery is best effort: one attempt per
//! watcher per callback.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::config::GatewayConfig;
use crate::error::{Result, WalletError};
use crate::provider::{CallbackPayload, CallbackProcessor, ProviderAdapter, VcJsonResolver};
use crate::store::{VcStore, WatcherStore};

/// Timeout for a single forward.
pub const FORWARD_TIMEOUT: Duration = Duration::from_secs(10);

/// Delivers a callback payload to an external URL.
#[async_trait]
pub trait CallbackForwarder: Send + Sync {
    /// POST the payload; returns the HTTP status of the response.
    async fn forward(&self, url: &str, payload: &CallbackPayload) -> Result<u16>;
}

/// `reqwest` based forwarder.
pub struct HttpForwarder {
    client: Client,
}

impl HttpForwarder {
    pub fn new() -> Result<Self> {
        Self::with_timeout(FORWARD_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WalletError::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CallbackForwarder for HttpForwarder {
    async fn forward(&self, url: &str, payload: &CallbackPayload) -> Result<u16> {
        let response = self.client.post(url).json(payload).send().await?;
        Ok(response.status().as_u16())
    }
}

/// Tallies reported for a processed callback.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackStats {
    pub processed: bool,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_public_id: Option<String>,
    pub forwarded_callbacks: usize,
    pub failed_callbacks: usize,
    pub skipped_callbacks: usize,
    /// Outcome of the provider's own callback hook, when it has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adapter_processed: Option<bool>,
    pub total_records: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackResponse {
    pub status_code: u16,
    pub message: String,
    pub data: CallbackStats,
}

impl CallbackResponse {
    fn rejected(status_code: u16, message: impl Into<String>, public_id: Option<&str>) -> Self {
        Self {
            status_code,
            message: message.into(),
            data: CallbackStats {
                processed: false,
                timestamp: Utc::now().to_rfc3339(),
                record_public_id: public_id.map(str::to_string),
                ..Default::default()
            },
        }
    }
}

#[derive(Clone)]
pub struct CallbackHandler {
    watchers: Arc<dyn WatcherStore>,
    adapter: ProviderAdapter,
    forwarder: Arc<dyn CallbackForwarder>,
    config: Arc<GatewayConfig>,
}

impl CallbackHandler {
    pub fn new(
        watchers: Arc<dyn WatcherStore>,
        adapter: ProviderAdapter,
        forwarder: Arc<dyn CallbackForwarder>,
        config: Arc<GatewayConfig>,
    ) -> Self {
        Self {
            watchers,
            adapter,
            forwarder,
            config,
        }
    }

    /// Resolve the watchers for a callback and relay it.
    ///
    /// Never fails: problems are reported through `status_code`.
    #[instrument(level = "info", skip_all, fields(record_public_id = ?payload.record_public_id))]
    pub async fn process_watch_callback(&self, payload: &CallbackPayload) -> CallbackResponse {
        let Some(public_id) = payload.public_id() else {
            warn!("Callback without recordPublicId");
            return CallbackResponse::rejected(400, "recordPublicId is required", None);
        };

        match self.relay(public_id, payload).await {
            Ok(response) => response,
            Err(err) => {
                error!(error = %err, "Failed to process watch callback");
                let mut response =
                    CallbackResponse::rejected(500, "Failed to process watch callback", Some(public_id));
                response.data.error = Some(err.client_message());
                response
            }
        }
    }

    async fn relay(&self, public_id: &str, payload: &CallbackPayload) -> Result<CallbackResponse> {
        let watchers = self.watchers.find_by_vc_public_id(public_id).await?;
        if watchers.is_empty() {
            info!("No watchers found for callback");
            return Ok(CallbackResponse::rejected(
                404,
                "No watcher records found for the given recordPublicId",
                Some(public_id),
            ));
        }

        let mut stats = CallbackStats {
            processed: true,
            record_public_id: Some(public_id.to_string()),
            total_records: watchers.len(),
            ..Default::default()
        };

        for watcher in &watchers {
            let Some(target) = watcher.forward_target() else {
                debug!(watcher_id = watcher.id, "No callback target set");
                stats.skipped_callbacks += 1;
                continue;
            };
            if self.config.is_self_url(target) {
                debug!(watcher_id = watcher.id, "Skipping forward to own callback URL");
                stats.skipped_callbacks += 1;
                continue;
            }

            match self.forwarder.forward(target, payload).await {
                Ok(200 | 201) => {
                    stats.forwarded_callbacks += 1;
                    info!(target = %target, "Callback forwarded");
                }
                Ok(status) => {
                    stats.failed_callbacks += 1;
                    warn!(target = %target, status, "Callback target rejected forward");
                }
                Err(err) => {
                    stats.failed_callbacks += 1;
                    warn!(target = %target, error = %err, "Callback forward failed");
                }
            }
        }

        if let Some(hook) = self.adapter.callback() {
            let outcome = hook.process_callback(payload).await;
            if let Err(err) = &outcome {
                warn!(provider = %self.adapter.name(), error = %err, "Provider callback hook failed");
            }
            stats.adapter_processed = Some(outcome.is_ok());
        }

        stats.timestamp = Utc::now().to_rfc3339();
        info!(
            forwarded = stats.forwarded_callbacks,
            failed = stats.failed_callbacks,
            skipped = stats.skipped_callbacks,
            total = stats.total_records,
            "Watch callback processed"
        );
        Ok(CallbackResponse {
            status_code: 200,
            message: "Watch callback processed successfully".to_string(),
            data: stats,
        })
    }
}

/// Callback hook that refreshes the stored document of every local copy of
/// the VC named in the callback.
pub struct VcRefreshProcessor {
    resolver: Arc<dyn VcJsonResolver>,
    vcs: Arc<dyn VcStore>,
}

impl VcRefreshProcessor {
    pub fn new(resolver: Arc<dyn VcJsonResolver>, vcs: Arc<dyn VcStore>) -> Self {
        Self { resolver, vcs }
    }
}

#[async_trait]
impl CallbackProcessor for VcRefreshProcessor {
    async fn process_callback(&self, payload: &CallbackPayload) -> Result<()> {
        let public_id = payload
            .public_id()
            .ok_or_else(|| WalletError::Validation("recordPublicId is required".into()))?;

        let rows = self.vcs.find_by_public_id(public_id).await?;
        if rows.is_empty() {
            return Ok(());
        }

        let document = self
            .resolver
            .get_vc_json_by_identifier("", public_id, "")
            .await?;
        for row in rows {
            self.vcs.update_json(row.id, document.clone()).await?;
        }
        debug!(public_id = %public_id, "Stored VC documents refreshed");
        Ok(())
    }
}
