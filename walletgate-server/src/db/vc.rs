//! VC repository
//!
//! Rows in `wallet_vcs`, unique per `(vc_public_id, provider, user_id)`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use walletgate_core::model::{NewVc, VcRecord};
use walletgate_core::store::VcStore;
use walletgate_core::Result;

use super::store_error;

const COLUMNS: &str =
    "id, vc_public_id, user_id, provider, vc_json, created_at, updated_at, created_by, updated_by";

#[derive(Debug, FromRow)]
struct VcRow {
    id: i64,
    vc_public_id: String,
    user_id: Option<Uuid>,
    provider: String,
    vc_json: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    created_by: Option<String>,
    updated_by: Option<String>,
}

impl From<VcRow> for VcRecord {
    fn from(row: VcRow) -> Self {
        Self {
            id: row.id,
            vc_public_id: row.vc_public_id,
            user_id: row.user_id,
            provider: row.provider,
            vc_json: row.vc_json,
            created_at: row.created_at,
            updated_at: row.updated_at,
            created_by: row.created_by,
            updated_by: row.updated_by,
        }
    }
}

/// Upsert result; `inserted` is true when no row existed before.
#[derive(Debug, FromRow)]
struct UpsertedVc {
    #[sqlx(flatten)]
    row: VcRow,
    inserted: bool,
}

/// Repository for VC database operations
#[derive(Clone)]
pub struct VcRepository {
    pool: PgPool,
}

impl VcRepository {
    /// Create a new VC repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VcStore for VcRepository {
    async fn find_by_public_id(&self, vc_public_id: &str) -> Result<Vec<VcRecord>> {
        let rows = sqlx::query_as::<_, VcRow>(&format!(
            "SELECT {COLUMNS} FROM wallet_vcs WHERE vc_public_id = $1 ORDER BY id"
        ))
        .bind(vc_public_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn exists_for_user(&self, vc_public_id: &str, user_id: Uuid) -> Result<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM wallet_vcs WHERE vc_public_id = $1 AND user_id = $2)",
        )
        .bind(vc_public_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)
    }

    async fn upsert(&self, vc: NewVc) -> Result<(VcRecord, bool)> {
        // xmax is zero only for rows created by this statement
        let upserted = sqlx::query_as::<_, UpsertedVc>(&format!(
            r#"
            INSERT INTO wallet_vcs (vc_public_id, user_id, provider, vc_json, created_by, updated_by)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (vc_public_id, provider, COALESCE(user_id, '00000000-0000-0000-0000-000000000000'::uuid))
            DO UPDATE SET
                vc_json = COALESCE(EXCLUDED.vc_json, wallet_vcs.vc_json),
                updated_by = EXCLUDED.updated_by,
                updated_at = NOW()
            RETURNING {COLUMNS}, (xmax = 0) AS inserted
            "#
        ))
        .bind(&vc.vc_public_id)
        .bind(vc.user_id)
        .bind(&vc.provider)
        .bind(&vc.vc_json)
        .bind(&vc.created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;

        Ok((upserted.row.into(), upserted.inserted))
    }

    async fn update_json(&self, id: i64, vc_json: serde_json::Value) -> Result<Option<VcRecord>> {
        let row = sqlx::query_as::<_, VcRow>(&format!(
            r#"
            UPDATE wallet_vcs
            SET vc_json = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&vc_json)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(row.map(Into::into))
    }

    async fn page_after(&self, after: Option<i64>, limit: usize) -> Result<Vec<VcRecord>> {
        let rows = sqlx::query_as::<_, VcRow>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM wallet_vcs
            WHERE $1::BIGINT IS NULL OR id > $1
            ORDER BY id
            LIMIT $2
            "#
        ))
        .bind(after)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn count(&self) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM wallet_vcs")
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)
    }
}
