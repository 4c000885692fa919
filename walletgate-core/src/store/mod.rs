//! Repository traits for watchers, VCs and users.
//!
//! Services only talk to these traits. The server crate provides PostgreSQL
//! implementations; [`memory`] provides `DashMap` backed ones used in
//! development and tests.
//!
//! All full-table scans go through [`pages`], a keyset-paginated stream
//! ordered by surrogate id.

mod memory;

pub use memory::{MemoryUserStore, MemoryVcStore, MemoryWatcherStore};

use std::future::Future;

use async_trait::async_trait;
use futures::Stream;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{
    NewUser, NewVc, NewWatcher, User, VcRecord, WatcherKey, WatcherRecord, WatcherUpdate,
};

#[async_trait]
pub trait WatcherStore: Send + Sync {
    async fn find_by_key(&self, key: &WatcherKey) -> Result<Option<WatcherRecord>>;

    /// All watchers for a public id, ordered by id.
    async fn find_by_vc_public_id(&self, vc_public_id: &str) -> Result<Vec<WatcherRecord>>;

    /// All watchers for a public id under one provider, ordered by id.
    async fn find_by_vc_and_provider(
        &self,
        vc_public_id: &str,
        provider: &str,
    ) -> Result<Vec<WatcherRecord>>;

    async fn exists_for_vc(&self, vc_public_id: &str) -> Result<bool>;

    /// Watchers still awaiting provider registration, ordered by id.
    async fn list_unregistered(&self) -> Result<Vec<WatcherRecord>>;

    /// Insert unless a row with the same natural key exists.
    ///
    /// Returns the stored row and whether it was created by this call.
    async fn find_or_create(&self, watcher: NewWatcher) -> Result<(WatcherRecord, bool)>;

    async fn update(&self, id: i64, update: WatcherUpdate) -> Result<Option<WatcherRecord>>;

    /// Count rows, optionally filtered by registration state.
    async fn count(&self, registered: Option<bool>) -> Result<i64>;

    async fn count_distinct_vcs(&self) -> Result<i64>;
}

#[async_trait]
pub trait VcStore: Send + Sync {
    async fn find_by_public_id(&self, vc_public_id: &str) -> Result<Vec<VcRecord>>;

    async fn exists_for_user(&self, vc_public_id: &str, user_id: Uuid) -> Result<bool>;

    /// Insert, or refresh `vc_json` on the row with the same
    /// `(vc_public_id, provider, user_id)`.
    async fn upsert(&self, vc: NewVc) -> Result<(VcRecord, bool)>;

    async fn update_json(&self, id: i64, vc_json: serde_json::Value) -> Result<Option<VcRecord>>;

    /// Up to `limit` rows with `id > after`, ordered by id.
    async fn page_after(&self, after: Option<i64>, limit: usize) -> Result<Vec<VcRecord>>;

    async fn count(&self) -> Result<i64>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn find_by_token(&self, token: &str) -> Result<Option<User>>;

    async fn create(&self, user: NewUser) -> Result<User>;

    /// Up to `limit` users with `id > after`, ordered by id.
    async fn page_after(&self, after: Option<Uuid>, limit: usize) -> Result<Vec<User>>;

    async fn count(&self) -> Result<i64>;
}

/// Lazily walk a table in keyset pages of `page_size`.
///
/// `fetch(after, limit)` returns the next page; `key` extracts the cursor
/// from the last row. The stream ends on an empty or short page.
pub fn pages<'a, T, K, F, Fut>(
    page_size: usize,
    fetch: F,
    key: fn(&T) -> K,
) -> impl Stream<Item = Result<Vec<T>>> + 'a
where
    T: 'a,
    K: Clone + 'a,
    F: FnMut(Option<K>, usize) -> Fut + 'a,
    Fut: Future<Output = Result<Vec<T>>> + 'a,
{
    let page_size = page_size.max(1);
    futures::stream::try_unfold(
        (fetch, None::<K>, false),
        move |(mut fetch, cursor, exhausted)| async move {
            if exhausted {
                return Ok(None);
            }
            let page = fetch(cursor, page_size).await?;
            let Some(last) = page.last() else {
                return Ok(None);
            };
            let next = key(last);
            let exhausted = page.len() < page_size;
            Ok(Some((page, (fetch, Some(next), exhausted))))
        },
    )
}
