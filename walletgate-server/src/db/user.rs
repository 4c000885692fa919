//! User entity and repository
//!
//! Handles wallet users onboarded through the gateway. The provider session
//! token doubles as the bearer token for user-scoped routes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use walletgate_core::model::{NewUser, User, UserStatus};
use walletgate_core::store::UserStore;
use walletgate_core::Result;

use super::store_error;

const COLUMNS: &str = "id, first_name, last_name, account_id, username, password_hash, token, \
     did, phone, email, status, blocked, created_at, updated_at";

/// User row from database
#[derive(Debug, Clone, FromRow)]
struct UserRow {
    id: Uuid,
    first_name: String,
    last_name: String,
    account_id: String,
    username: String,
    password_hash: String,
    token: Option<String>,
    did: Option<String>,
    phone: Option<String>,
    email: Option<String>,
    status: String,
    blocked: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        let status = row.status.parse().unwrap_or_else(|e| {
            tracing::warn!(user_id = %row.id, error = %e, "Unknown user status, treating as active");
            UserStatus::Active
        });
        Self {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            account_id: row.account_id,
            username: row.username,
            password_hash: row.password_hash,
            token: row.token,
            did: row.did,
            phone: row.phone,
            email: row.email,
            status,
            blocked: row.blocked,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Repository for user database operations
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {COLUMNS} FROM users WHERE {column} = $1"
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(row.map(Into::into))
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(row.map(Into::into))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        self.find_one("username", username).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find_one("email", email).await
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<User>> {
        self.find_one("token", token).await
    }

    async fn create(&self, user: NewUser) -> Result<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (
                id, first_name, last_name, account_id, username, password_hash,
                token, did, phone, email, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.account_id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.token)
        .bind(&user.did)
        .bind(&user.phone)
        .bind(&user.email)
        .bind(UserStatus::Active.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(row.into())
    }

    async fn page_after(&self, after: Option<Uuid>, limit: usize) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM users
            WHERE $1::UUID IS NULL OR id > $1
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
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)
    }
}
