//! Watcher repository
//!
//! Rows in `wallet_vc_watchers`. At most one row exists per natural key
//! `(vc_public_id, user_id, provider, watcher_email)`; a unique expression
//! index enforces it so concurrent `find_or_create` calls converge.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use walletgate_core::model::{NewWatcher, WatcherKey, WatcherRecord, WatcherUpdate};
use walletgate_core::store::WatcherStore;
use walletgate_core::{Result, WalletError};

use super::store_error;

const COLUMNS: &str = "id, vc_public_id, user_id, provider, watcher_registered, watcher_email, \
     watcher_callback_url, forward_watcher_callback_url, created_at, updated_at, created_by, updated_by";

#[derive(Debug, FromRow)]
struct WatcherRow {
    id: i64,
    vc_public_id: String,
    user_id: Option<Uuid>,
    provider: String,
    watcher_registered: bool,
    watcher_email: String,
    watcher_callback_url: Option<String>,
    forward_watcher_callback_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    created_by: Option<String>,
    updated_by: Option<String>,
}

impl From<WatcherRow> for WatcherRecord {
    fn from(row: WatcherRow) -> Self {
        Self {
            id: row.id,
            vc_public_id: row.vc_public_id,
            user_id: row.user_id,
            provider: row.provider,
            watcher_registered: row.watcher_registered,
            watcher_email: row.watcher_email,
            watcher_callback_url: row.watcher_callback_url,
            forward_watcher_callback_url: row.forward_watcher_callback_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
            created_by: row.created_by,
            updated_by: row.updated_by,
        }
    }
}

/// Repository for watcher database operations
#[derive(Clone)]
pub struct WatcherRepository {
    pool: PgPool,
}

impl WatcherRepository {
    /// Create a new watcher repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_all(&self, sql: &str, binds: &[&str]) -> Result<Vec<WatcherRecord>> {
        let mut query = sqlx::query_as::<_, WatcherRow>(sql);
        for value in binds {
            query = query.bind(*value);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(store_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl WatcherStore for WatcherRepository {
    async fn find_by_key(&self, key: &WatcherKey) -> Result<Option<WatcherRecord>> {
        let row = sqlx::query_as::<_, WatcherRow>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM wallet_vc_watchers
            WHERE vc_public_id = $1
              AND user_id IS NOT DISTINCT FROM $2
              AND provider = $3
              AND watcher_email = $4
            "#
        ))
        .bind(&key.vc_public_id)
        .bind(key.user_id)
        .bind(&key.provider)
        .bind(&key.watcher_email)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(row.map(Into::into))
    }

    async fn find_by_vc_public_id(&self, vc_public_id: &str) -> Result<Vec<WatcherRecord>> {
        self.fetch_all(
            &format!(
                "SELECT {COLUMNS} FROM wallet_vc_watchers WHERE vc_public_id = $1 ORDER BY id"
            ),
            &[vc_public_id],
        )
        .await
    }

    async fn find_by_vc_and_provider(
        &self,
        vc_public_id: &str,
        provider: &str,
    ) -> Result<Vec<WatcherRecord>> {
        self.fetch_all(
            &format!(
                "SELECT {COLUMNS} FROM wallet_vc_watchers \
                 WHERE vc_public_id = $1 AND provider = $2 ORDER BY id"
            ),
            &[vc_public_id, provider],
        )
        .await
    }

    async fn exists_for_vc(&self, vc_public_id: &str) -> Result<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM wallet_vc_watchers WHERE vc_public_id = $1)",
        )
        .bind(vc_public_id)
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)
    }

    async fn list_unregistered(&self) -> Result<Vec<WatcherRecord>> {
        self.fetch_all(
            &format!(
                "SELECT {COLUMNS} FROM wallet_vc_watchers \
                 WHERE watcher_registered = FALSE ORDER BY id"
            ),
            &[],
        )
        .await
    }

    async fn find_or_create(&self, watcher: NewWatcher) -> Result<(WatcherRecord, bool)> {
        let inserted = sqlx::query_as::<_, WatcherRow>(&format!(
            r#"
            INSERT INTO wallet_vc_watchers (
                vc_public_id, user_id, provider, watcher_registered, watcher_email,
                watcher_callback_url, forward_watcher_callback_url, created_by, updated_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            ON CONFLICT DO NOTHING
            RETURNING {COLUMNS}
            "#
        ))
        .bind(&watcher.vc_public_id)
        .bind(watcher.user_id)
        .bind(&watcher.provider)
        .bind(watcher.watcher_registered)
        .bind(&watcher.watcher_email)
        .bind(&watcher.watcher_callback_url)
        .bind(&watcher.forward_watcher_callback_url)
        .bind(&watcher.created_by)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        if let Some(row) = inserted {
            return Ok((row.into(), true));
        }

        // Lost the race or the row already existed
        let key = watcher.key();
        let existing = self.find_by_key(&key).await?.ok_or_else(|| {
            WalletError::store(format!(
                "watcher insert conflicted but no row matches key for {}",
                key.vc_public_id
            ))
        })?;
        Ok((existing, false))
    }

    async fn update(&self, id: i64, update: WatcherUpdate) -> Result<Option<WatcherRecord>> {
        let row = sqlx::query_as::<_, WatcherRow>(&format!(
            r#"
            UPDATE wallet_vc_watchers
            SET
                watcher_registered = COALESCE($2, watcher_registered),
                watcher_email = COALESCE($3, watcher_email),
                watcher_callback_url = COALESCE($4, watcher_callback_url),
                forward_watcher_callback_url = COALESCE($5, forward_watcher_callback_url),
                updated_by = COALESCE($6, updated_by),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(update.watcher_registered)
        .bind(&update.watcher_email)
        .bind(&update.watcher_callback_url)
        .bind(&update.forward_watcher_callback_url)
        .bind(&update.updated_by)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(row.map(Into::into))
    }

    async fn count(&self, registered: Option<bool>) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM wallet_vc_watchers \
             WHERE $1::BOOLEAN IS NULL OR watcher_registered = $1",
        )
        .bind(registered)
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)
    }

    async fn count_distinct_vcs(&self) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(DISTINCT vc_public_id) FROM wallet_vc_watchers")
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)
    }
}
