//! Provider sync: pull every user's wallet and record what the gateway is missing.

use std::time::Duration;

use futures::TryStreamExt;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use super::HousekeepingService;
use crate::error::{Result, WalletError};
use crate::model::{NewVc, NewWatcher, User};
use crate::provider::{ProviderAdapter, ProviderFactory, VcSummary};
use crate::store::pages;

/// Budget for listing one user's wallet.
pub const USER_SYNC_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub total_users: i64,
    pub total_vcs_from_provider: usize,
    pub new_vcs_added: usize,
    pub existing_vcs_found: usize,
    pub new_watchers_created: usize,
    pub existing_watchers_found: usize,
    pub errors: usize,
    pub users_processed: usize,
}

impl SyncStats {
    pub fn summary(&self) -> String {
        format!(
            "Housekeeping task completed. Total users: {}, Total VCs from provider: {}, New VCs added: {}, Existing VCs found: {}, New watchers created: {}, Existing watchers found: {}, Errors: {}, Users processed: {}",
            self.total_users,
            self.total_vcs_from_provider,
            self.new_vcs_added,
            self.existing_vcs_found,
            self.new_watchers_created,
            self.existing_watchers_found,
            self.errors,
            self.users_processed
        )
    }
}

/// One VC as seen in a user's wallet.
struct ProviderVc {
    public_id: String,
    document: Value,
}

/// A listing entry that could not be resolved keeps its best-known id for logging.
type ResolvedVc = std::result::Result<ProviderVc, (String, WalletError)>;

impl HousekeepingService {
    /// Import every user's provider-side VCs and give each a watcher.
    ///
    /// Users without a provider token are skipped. A user whose wallet cannot
    /// be listed within [`USER_SYNC_TIMEOUT`] counts as one error.
    #[instrument(level = "info", skip(self))]
    pub async fn sync_vcs_and_add_watchers_for_all_users(
        &self,
        provider: &str,
        chunk_size: usize,
    ) -> Result<SyncStats> {
        let adapter = self.adapter_for(provider)?;
        let mut stats = SyncStats {
            total_users: self.users.count().await?,
            ..Default::default()
        };
        info!(total_users = stats.total_users, "Starting provider sync");

        let mut chunks = Box::pin(pages(
            chunk_size,
            |after, limit| self.users.page_after(after, limit),
            |user: &User| user.id,
        ));

        while let Some(chunk) = chunks.try_next().await? {
            for user in &chunk {
                if user.token.as_deref().map_or(true, str::is_empty) {
                    debug!(username = %user.username, "No provider token, skipping user");
                    continue;
                }
                match self.fetch_user_vcs(&adapter, user).await {
                    Ok(vcs) => {
                        stats.total_vcs_from_provider += vcs.len();
                        self.import_user_vcs(vcs, user, adapter.name(), &mut stats).await;
                        stats.users_processed += 1;
                    }
                    Err(err) => {
                        stats.errors += 1;
                        error!(username = %user.username, error = %err, "Failed to list provider VCs");
                    }
                }
            }
        }

        info!(
            users = stats.users_processed,
            new_vcs = stats.new_vcs_added,
            new_watchers = stats.new_watchers_created,
            errors = stats.errors,
            "Provider sync finished"
        );
        Ok(stats)
    }

    fn adapter_for(&self, provider: &str) -> Result<ProviderAdapter> {
        if provider.trim().is_empty() || provider.eq_ignore_ascii_case(self.adapter.name()) {
            Ok(self.adapter.clone())
        } else {
            ProviderFactory::create_by_name(provider)
        }
    }

    /// List a user's wallet, resolving full documents when the provider can.
    async fn fetch_user_vcs(
        &self,
        adapter: &ProviderAdapter,
        user: &User,
    ) -> Result<Vec<ResolvedVc>> {
        let token = user.token.as_deref().unwrap_or_default();
        let account_id = if user.account_id.is_empty() {
            user.id.to_string()
        } else {
            user.account_id.clone()
        };

        let summaries = tokio::time::timeout(
            USER_SYNC_TIMEOUT,
            adapter.core().get_all_vcs(&account_id, token),
        )
        .await
        .map_err(|_| WalletError::Timeout {
            operation: "list provider VCs".into(),
            secs: USER_SYNC_TIMEOUT.as_secs(),
        })??;

        let mut resolved = Vec::with_capacity(summaries.len());
        for summary in summaries {
            resolved.push(self.resolve_vc(adapter, user, token, summary).await);
        }
        Ok(resolved)
    }

    async fn resolve_vc(
        &self,
        adapter: &ProviderAdapter,
        user: &User,
        token: &str,
        summary: VcSummary,
    ) -> ResolvedVc {
        let fallback_id = summary
            .public_id
            .clone()
            .or_else(|| summary.identifier.clone())
            .unwrap_or_else(|| summary.id.clone());

        let (Some(resolver), Some(identifier)) = (adapter.vc_json(), summary.identifier.as_deref())
        else {
            let document = serde_json::to_value(&summary)
                .map_err(|e| (fallback_id.clone(), WalletError::from(e)))?;
            return Ok(ProviderVc {
                public_id: fallback_id,
                document,
            });
        };

        let document = resolver
            .get_vc_json_by_identifier(&user.username, identifier, token)
            .await
            .map_err(|e| (fallback_id.clone(), e))?;
        let public_id = document
            .get("publicId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or(fallback_id);
        Ok(ProviderVc {
            public_id,
            document,
        })
    }

    async fn import_user_vcs(
        &self,
        vcs: Vec<ResolvedVc>,
        user: &User,
        provider: &str,
        stats: &mut SyncStats,
    ) {
        for vc in vcs {
            let vc = match vc {
                Ok(vc) => vc,
                Err((public_id, err)) => {
                    stats.errors += 1;
                    warn!(vc_public_id = %public_id, error = %err, "Could not resolve VC document");
                    continue;
                }
            };
            if let Err(err) = self.import_vc(&vc, user, provider, stats).await {
                stats.errors += 1;
                error!(vc_public_id = %vc.public_id, username = %user.username, error = %err, "Failed to import VC");
            }
        }
    }

    async fn import_vc(
        &self,
        vc: &ProviderVc,
        user: &User,
        provider: &str,
        stats: &mut SyncStats,
    ) -> Result<()> {
        let created_by = Some(user.id.to_string());

        if self.vcs.exists_for_user(&vc.public_id, user.id).await? {
            stats.existing_vcs_found += 1;
        } else {
            self.vcs
                .upsert(NewVc {
                    vc_public_id: vc.public_id.clone(),
                    user_id: Some(user.id),
                    provider: provider.to_string(),
                    vc_json: Some(vc.document.clone()),
                    created_by: created_by.clone(),
                })
                .await?;
            stats.new_vcs_added += 1;
        }

        if self.watchers.exists_for_vc(&vc.public_id).await? {
            stats.existing_watchers_found += 1;
        } else {
            self.watchers
                .find_or_create(NewWatcher {
                    vc_public_id: vc.public_id.clone(),
                    user_id: Some(user.id),
                    provider: provider.to_string(),
                    watcher_registered: false,
                    watcher_email: self.config.watcher_email.clone(),
                    watcher_callback_url: Some(self.config.callback_url()),
                    forward_watcher_callback_url: None,
                    created_by,
                })
                .await?;
            stats.new_watchers_created += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::model::NewUser;
    use crate::provider::MockProvider;
    use crate::store::{
        MemoryUserStore, MemoryVcStore, MemoryWatcherStore, UserStore, VcStore, WatcherStore,
    };
    use std::sync::Arc;

    fn summary(id: &str) -> VcSummary {
        VcSummary {
            id: id.into(),
            name: format!("Credential {id}"),
            active: true,
            issued_at: "2026-01-01T00:00:00Z".into(),
            expires_at: String::new(),
            document_title: String::new(),
            identifier: Some(id.into()),
            public_id: None,
        }
    }

    fn new_user(username: &str, token: Option<&str>) -> NewUser {
        NewUser {
            first_name: username.into(),
            last_name: "Test".into(),
            account_id: format!("acc-{username}"),
            username: username.into(),
            password_hash: String::new(),
            token: token.map(Into::into),
            did: None,
            phone: None,
            email: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_wallet_times_out_as_single_error() {
        let mock = MockProvider::builder()
            .list_delay(Duration::from_secs(31))
            .build();
        mock.set_vcs("tok", vec![summary("a")]);
        let users = Arc::new(MemoryUserStore::new());
        users.create(new_user("slow", Some("tok"))).await.unwrap();
        let vcs = Arc::new(MemoryVcStore::new());

        let service = HousekeepingService::new(
            Arc::new(MemoryWatcherStore::new()),
            vcs.clone(),
            users,
            mock.adapter(),
            Arc::new(GatewayConfig::default()),
        );
        let stats = service
            .sync_vcs_and_add_watchers_for_all_users("mock", 10)
            .await
            .unwrap();

        assert_eq!(stats.errors, 1);
        assert_eq!(stats.users_processed, 0);
        assert_eq!(vcs.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_users_without_token_are_skipped() {
        let mock = MockProvider::builder().build();
        let users = Arc::new(MemoryUserStore::new());
        users.create(new_user("idle", None)).await.unwrap();

        let service = HousekeepingService::new(
            Arc::new(MemoryWatcherStore::new()),
            Arc::new(MemoryVcStore::new()),
            users,
            mock.adapter(),
            Arc::new(GatewayConfig::default()),
        );
        let stats = service
            .sync_vcs_and_add_watchers_for_all_users("mock", 10)
            .await
            .unwrap();

        assert_eq!(stats.total_users, 1);
        assert_eq!(stats.users_processed, 0);
        assert_eq!(stats.errors, 0);
    }

    #[tokio::test]
    async fn test_resolved_public_id_wins_over_listing_identifier() {
        let mock = MockProvider::builder()
            .document("rec-1", serde_json::json!({"publicId": "pub-1"}))
            .build();
        mock.set_vcs("tok", vec![summary("rec-1")]);
        let users = Arc::new(MemoryUserStore::new());
        users.create(new_user("ada", Some("tok"))).await.unwrap();
        let vcs = Arc::new(MemoryVcStore::new());
        let watchers = Arc::new(MemoryWatcherStore::new());

        let service = HousekeepingService::new(
            watchers.clone(),
            vcs.clone(),
            users,
            mock.adapter(),
            Arc::new(GatewayConfig::default()),
        );
        let stats = service
            .sync_vcs_and_add_watchers_for_all_users("", 10)
            .await
            .unwrap();

        assert_eq!(stats.new_vcs_added, 1);
        assert_eq!(stats.new_watchers_created, 1);
        assert_eq!(vcs.find_by_public_id("pub-1").await.unwrap().len(), 1);
        assert!(watchers.exists_for_vc("pub-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_provider_is_rejected() {
        let service = HousekeepingService::new(
            Arc::new(MemoryWatcherStore::new()),
            Arc::new(MemoryVcStore::new()),
            Arc::new(MemoryUserStore::new()),
            MockProvider::builder().build().adapter(),
            Arc::new(GatewayConfig::default()),
        );
        let err = service
            .sync_vcs_and_add_watchers_for_all_users("acme", 10)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_active_adapter_matched_by_name() {
        let mock = MockProvider::builder().name("acme").build();
        mock.set_vcs("tok", vec![summary("rec-9")]);
        let users = Arc::new(MemoryUserStore::new());
        users.create(new_user("bo", Some("tok"))).await.unwrap();
        let vcs = Arc::new(MemoryVcStore::new());

        let service = HousekeepingService::new(
            Arc::new(MemoryWatcherStore::new()),
            vcs.clone(),
            users,
            mock.adapter(),
            Arc::new(GatewayConfig::default()),
        );
        let stats = service
            .sync_vcs_and_add_watchers_for_all_users("ACME", 10)
            .await
            .unwrap();

        assert_eq!(stats.new_vcs_added, 1);
        let rows = vcs.find_by_public_id("rec-9").await.unwrap();
        assert_eq!(rows[0].provider, "acme");

        let err = service
            .sync_vcs_and_add_watchers_for_all_users("nope", 10)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
