//! In-memory stores backed by `DashMap`.
//!
//! Data is lost on restart. Used when no database is configured and by tests.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use super::{UserStore, VcStore, WatcherStore};
use crate::error::{Result, WalletError};
use crate::model::{
    NewUser, NewVc, NewWatcher, User, UserStatus, VcRecord, WatcherKey, WatcherRecord,
    WatcherUpdate,
};

fn sorted_by_id<T, K: Ord>(mut rows: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    rows.sort_by_key(key);
    rows
}

/// Watcher rows plus a natural-key index.
#[derive(Default)]
pub struct MemoryWatcherStore {
    rows: DashMap<i64, WatcherRecord>,
    keys: DashMap<WatcherKey, i64>,
    next_id: AtomicI64,
}

impl MemoryWatcherStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn select(&self, pred: impl Fn(&WatcherRecord) -> bool) -> Vec<WatcherRecord> {
        let rows = self
            .rows
            .iter()
            .filter(|r| pred(r.value()))
            .map(|r| r.value().clone())
            .collect();
        sorted_by_id(rows, |r: &WatcherRecord| r.id)
    }
}

#[async_trait]
impl WatcherStore for MemoryWatcherStore {
    async fn find_by_key(&self, key: &WatcherKey) -> Result<Option<WatcherRecord>> {
        let Some(id) = self.keys.get(key).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.rows.get(&id).map(|r| r.value().clone()))
    }

    async fn find_by_vc_public_id(&self, vc_public_id: &str) -> Result<Vec<WatcherRecord>> {
        Ok(self.select(|r| r.vc_public_id == vc_public_id))
    }

    async fn find_by_vc_and_provider(
        &self,
        vc_public_id: &str,
        provider: &str,
    ) -> Result<Vec<WatcherRecord>> {
        Ok(self.select(|r| r.vc_public_id == vc_public_id && r.provider == provider))
    }

    async fn exists_for_vc(&self, vc_public_id: &str) -> Result<bool> {
        Ok(self.rows.iter().any(|r| r.vc_public_id == vc_public_id))
    }

    async fn list_unregistered(&self) -> Result<Vec<WatcherRecord>> {
        Ok(self.select(|r| !r.watcher_registered))
    }

    async fn find_or_create(&self, watcher: NewWatcher) -> Result<(WatcherRecord, bool)> {
        match self.keys.entry(watcher.key()) {
            Entry::Occupied(entry) => {
                let id = *entry.get();
                let row = self
                    .rows
                    .get(&id)
                    .map(|r| r.value().clone())
                    .ok_or_else(|| WalletError::store(format!("dangling watcher key {id}")))?;
                Ok((row, false))
            }
            Entry::Vacant(entry) => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                let now = Utc::now();
                let row = WatcherRecord {
                    id,
                    vc_public_id: watcher.vc_public_id,
                    user_id: watcher.user_id,
                    provider: watcher.provider,
                    watcher_registered: watcher.watcher_registered,
                    watcher_email: watcher.watcher_email,
                    watcher_callback_url: watcher.watcher_callback_url,
                    forward_watcher_callback_url: watcher.forward_watcher_callback_url,
                    created_at: now,
                    updated_at: now,
                    updated_by: watcher.created_by.clone(),
                    created_by: watcher.created_by,
                };
                self.rows.insert(id, row.clone());
                entry.insert(id);
                Ok((row, true))
            }
        }
    }

    async fn update(&self, id: i64, update: WatcherUpdate) -> Result<Option<WatcherRecord>> {
        let Some(mut row) = self.rows.get_mut(&id) else {
            return Ok(None);
        };
        let old_key = row.value().key();

        if let Some(registered) = update.watcher_registered {
            row.watcher_registered = registered;
        }
        if let Some(email) = update.watcher_email {
            row.watcher_email = email;
        }
        if let Some(url) = update.watcher_callback_url {
            row.watcher_callback_url = Some(url);
        }
        if let Some(url) = update.forward_watcher_callback_url {
            row.forward_watcher_callback_url = Some(url);
        }
        if update.updated_by.is_some() {
            row.updated_by = update.updated_by;
        }
        row.updated_at = Utc::now();

        let updated = row.clone();
        drop(row);

        let new_key = updated.key();
        if new_key != old_key {
            self.keys.remove(&old_key);
            self.keys.insert(new_key, id);
        }
        Ok(Some(updated))
    }

    async fn count(&self, registered: Option<bool>) -> Result<i64> {
        let n = self
            .rows
            .iter()
            .filter(|r| registered.map_or(true, |want| r.watcher_registered == want))
            .count();
        Ok(n as i64)
    }

    async fn count_distinct_vcs(&self) -> Result<i64> {
        let distinct: std::collections::HashSet<String> =
            self.rows.iter().map(|r| r.vc_public_id.clone()).collect();
        Ok(distinct.len() as i64)
    }
}

#[derive(Default)]
pub struct MemoryVcStore {
    rows: DashMap<i64, VcRecord>,
    keys: DashMap<(String, String, Option<Uuid>), i64>,
    next_id: AtomicI64,
}

impl MemoryVcStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VcStore for MemoryVcStore {
    async fn find_by_public_id(&self, vc_public_id: &str) -> Result<Vec<VcRecord>> {
        let rows = self
            .rows
            .iter()
            .filter(|r| r.vc_public_id == vc_public_id)
            .map(|r| r.value().clone())
            .collect();
        Ok(sorted_by_id(rows, |r: &VcRecord| r.id))
    }

    async fn exists_for_user(&self, vc_public_id: &str, user_id: Uuid) -> Result<bool> {
        Ok(self
            .rows
            .iter()
            .any(|r| r.vc_public_id == vc_public_id && r.user_id == Some(user_id)))
    }

    async fn upsert(&self, vc: NewVc) -> Result<(VcRecord, bool)> {
        let key = (vc.vc_public_id.clone(), vc.provider.clone(), vc.user_id);
        match self.keys.entry(key) {
            Entry::Occupied(entry) => {
                let id = *entry.get();
                let mut row = self
                    .rows
                    .get_mut(&id)
                    .ok_or_else(|| WalletError::store(format!("dangling vc key {id}")))?;
                if vc.vc_json.is_some() {
                    row.vc_json = vc.vc_json;
                }
                row.updated_at = Utc::now();
                row.updated_by = vc.created_by;
                Ok((row.clone(), false))
            }
            Entry::Vacant(entry) => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                let now = Utc::now();
                let row = VcRecord {
                    id,
                    vc_public_id: vc.vc_public_id,
                    user_id: vc.user_id,
                    provider: vc.provider,
                    vc_json: vc.vc_json,
                    created_at: now,
                    updated_at: now,
                    updated_by: vc.created_by.clone(),
                    created_by: vc.created_by,
                };
                self.rows.insert(id, row.clone());
                entry.insert(id);
                Ok((row, true))
            }
        }
    }

    async fn update_json(&self, id: i64, vc_json: serde_json::Value) -> Result<Option<VcRecord>> {
        Ok(self.rows.get_mut(&id).map(|mut row| {
            row.vc_json = Some(vc_json);
            row.updated_at = Utc::now();
            row.clone()
        }))
    }

    async fn page_after(&self, after: Option<i64>, limit: usize) -> Result<Vec<VcRecord>> {
        let rows: Vec<VcRecord> = self
            .rows
            .iter()
            .filter(|r| after.map_or(true, |a| r.id > a))
            .map(|r| r.value().clone())
            .collect();
        Ok(sorted_by_id(rows, |r: &VcRecord| r.id)
            .into_iter()
            .take(limit)
            .collect())
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.rows.len() as i64)
    }
}

#[derive(Default)]
pub struct MemoryUserStore {
    rows: DashMap<Uuid, User>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn find_one(&self, pred: impl Fn(&User) -> bool) -> Option<User> {
        self.rows
            .iter()
            .find(|r| pred(r.value()))
            .map(|r| r.value().clone())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.rows.get(&id).map(|r| r.value().clone()))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self.find_one(|u| u.username == username))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.find_one(|u| u.email.as_deref() == Some(email)))
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<User>> {
        Ok(self.find_one(|u| u.token.as_deref() == Some(token)))
    }

    async fn create(&self, user: NewUser) -> Result<User> {
        if self.find_one(|u| u.username == user.username).is_some() {
            return Err(WalletError::Conflict("Username already exists".into()));
        }
        let now = Utc::now();
        let row = User {
            id: Uuid::new_v4(),
            first_name: user.first_name,
            last_name: user.last_name,
            account_id: user.account_id,
            username: user.username,
            password_hash: user.password_hash,
            token: user.token,
            did: user.did,
            phone: user.phone,
            email: user.email,
            status: UserStatus::Active,
            blocked: false,
            created_at: now,
            updated_at: now,
        };
        self.rows.insert(row.id, row.clone());
        Ok(row)
    }

    async fn page_after(&self, after: Option<Uuid>, limit: usize) -> Result<Vec<User>> {
        let rows: Vec<User> = self
            .rows
            .iter()
            .filter(|r| after.map_or(true, |a| r.id > a))
            .map(|r| r.value().clone())
            .collect();
        Ok(sorted_by_id(rows, |u: &User| u.id)
            .into_iter()
            .take(limit)
            .collect())
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.rows.len() as i64)
    }
}

impl MemoryUserStore {
    /// Insert a fully formed user, replacing any row with the same id.
    pub fn insert(&self, user: User) {
        self.rows.insert(user.id, user);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_watcher(vc: &str, email: &str) -> NewWatcher {
        NewWatcher {
            vc_public_id: vc.into(),
            user_id: None,
            provider: "dhiway".into(),
            watcher_registered: false,
            watcher_email: email.into(),
            watcher_callback_url: Some("https://self/cb".into()),
            forward_watcher_callback_url: None,
            created_by: Some("test".into()),
        }
    }

    #[tokio::test]
    async fn test_find_or_create_dedupes_on_natural_key() {
        let store = MemoryWatcherStore::new();
        let (first, created) = store.find_or_create(new_watcher("vc-1", "a@x")).await.unwrap();
        assert!(created);
        let (second, created) = store.find_or_create(new_watcher("vc-1", "a@x")).await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);

        let (_, created) = store.find_or_create(new_watcher("vc-1", "b@x")).await.unwrap();
        assert!(created);
        assert_eq!(store.count(None).await.unwrap(), 2);
        assert_eq!(store.count_distinct_vcs().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_marks_registered() {
        let store = MemoryWatcherStore::new();
        let (row, _) = store.find_or_create(new_watcher("vc-1", "a@x")).await.unwrap();
        let updated = store
            .update(row.id, WatcherUpdate::registered(None, None, "cron-job"))
            .await
            .unwrap()
            .unwrap();
        assert!(updated.watcher_registered);
        assert_eq!(updated.updated_by.as_deref(), Some("cron-job"));
        assert!(store.list_unregistered().await.unwrap().is_empty());
        assert!(store.update(999, WatcherUpdate::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_reindexes_changed_email() {
        let store = MemoryWatcherStore::new();
        let (row, _) = store.find_or_create(new_watcher("vc-1", "a@x")).await.unwrap();
        let old_key = row.key();

        let updated = store
            .update(
                row.id,
                WatcherUpdate {
                    watcher_email: Some("b@x".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert!(store.find_by_key(&old_key).await.unwrap().is_none());
        let found = store.find_by_key(&updated.key()).await.unwrap().unwrap();
        assert_eq!(found.id, row.id);

        let (_, created) = store.find_or_create(new_watcher("vc-1", "a@x")).await.unwrap();
        assert!(created);
    }

    #[tokio::test]
    async fn test_vc_upsert_refreshes_json() {
        let store = MemoryVcStore::new();
        let vc = NewVc {
            vc_public_id: "vc-1".into(),
            user_id: None,
            provider: "dhiway".into(),
            vc_json: Some(serde_json::json!({"v": 1})),
            created_by: None,
        };
        let (first, created) = store.upsert(vc.clone()).await.unwrap();
        assert!(created);

        let (second, created) = store
            .upsert(NewVc {
                vc_json: Some(serde_json::json!({"v": 2})),
                ..vc
            })
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(second.vc_json, Some(serde_json::json!({"v": 2})));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_vc_page_after_is_ordered() {
        let store = MemoryVcStore::new();
        for i in 0..5 {
            store
                .upsert(NewVc {
                    vc_public_id: format!("vc-{i}"),
                    user_id: None,
                    provider: "dhiway".into(),
                    vc_json: None,
                    created_by: None,
                })
                .await
                .unwrap();
        }
        let first = store.page_after(None, 2).await.unwrap();
        assert_eq!(first.iter().map(|v| v.id).collect::<Vec<_>>(), vec![1, 2]);
        let rest = store.page_after(Some(2), 10).await.unwrap();
        assert_eq!(rest.iter().map(|v| v.id).collect::<Vec<_>>(), vec![3, 4, 5]);
    }
}
