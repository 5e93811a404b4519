//! Forum data store collaborator.
//!
//! The gateway never owns forum data; it mutates it through [`ForumStore`]. Backends report
//! failures as [`StoreError`] values rather than panicking.

use crate::error::StoreError;
use crate::principal::Role;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Active ban on an account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ban {
    /// Why the ban was issued.
    pub reason: String,
    /// Epoch millis when the ban lapses; `None` is permanent.
    pub until_ms: Option<u64>,
}

/// Active suspension on an account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suspension {
    /// Why the suspension was issued.
    pub reason: String,
    /// Epoch millis when the suspension lapses.
    pub until_ms: u64,
}

/// Account row as the gateway sees it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub role: Role,
    pub ban: Option<Ban>,
    pub suspension: Option<Suspension>,
    /// Soft-deleted (reversible).
    pub deleted: bool,
}

impl UserRecord {
    /// Active account with `role`.
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self { id: id.into(), role, ban: None, suspension: None, deleted: false }
    }
}

/// Partial update for a user. `None` leaves a field untouched; `Some(None)` clears it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub role: Option<Role>,
    pub ban: Option<Option<Ban>>,
    pub suspension: Option<Option<Suspension>>,
    pub deleted: Option<bool>,
}

/// Kind of forum content a moderation action targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Thread,
    Reply,
}

impl ContentKind {
    /// Lower-case name used as the audit target type.
    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Thread => "thread",
            ContentKind::Reply => "reply",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thread or reply row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: String,
    pub kind: ContentKind,
    pub author_id: String,
    pub deleted: bool,
    pub locked: bool,
    pub pinned: bool,
}

impl ContentRecord {
    /// Visible, unlocked, unpinned content.
    pub fn new(kind: ContentKind, id: impl Into<String>, author_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            author_id: author_id.into(),
            deleted: false,
            locked: false,
            pinned: false,
        }
    }
}

/// Partial update for content.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContentPatch {
    pub deleted: Option<bool>,
    pub locked: Option<bool>,
    pub pinned: Option<bool>,
}

/// Point lookups and updates against the forum's relational store.
#[async_trait]
pub trait ForumStore: Send + Sync {
    /// Fetch a user by id.
    async fn user(&self, id: &str) -> Result<Option<UserRecord>, StoreError>;
    /// Apply `patch` to a user and return the updated row.
    async fn update_user(&self, id: &str, patch: UserPatch) -> Result<UserRecord, StoreError>;
    /// Irreversibly remove a user.
    async fn purge_user(&self, id: &str) -> Result<(), StoreError>;
    /// Fetch a thread or reply.
    async fn content(&self, kind: ContentKind, id: &str)
        -> Result<Option<ContentRecord>, StoreError>;
    /// Apply `patch` to content and return the updated row.
    async fn update_content(
        &self,
        kind: ContentKind,
        id: &str,
        patch: ContentPatch,
    ) -> Result<ContentRecord, StoreError>;
    /// Irreversibly remove content.
    async fn purge_content(&self, kind: ContentKind, id: &str) -> Result<(), StoreError>;
}

/// In-memory forum store (tests / demos).
#[derive(Clone, Default)]
pub struct MemoryForumStore {
    users: Arc<RwLock<HashMap<String, UserRecord>>>,
    content: Arc<RwLock<HashMap<(ContentKind, String), ContentRecord>>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryForumStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user row.
    pub async fn insert_user(&self, user: UserRecord) {
        self.users.write().await.insert(user.id.clone(), user);
    }

    /// Seed a content row.
    pub async fn insert_content(&self, record: ContentRecord) {
        self.content.write().await.insert((record.kind, record.id.clone()), record);
    }

    /// Number of mutating calls that reached the store.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ForumStore for MemoryForumStore {
    async fn user(&self, id: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn update_user(&self, id: &str, patch: UserPatch) -> Result<UserRecord, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.users.write().await;
        let user = guard
            .get_mut(id)
            .ok_or_else(|| StoreError::Constraint(format!("no user with id {id}")))?;
        if let Some(role) = patch.role {
            user.role = role;
        }
        if let Some(ban) = patch.ban {
            user.ban = ban;
        }
        if let Some(suspension) = patch.suspension {
            user.suspension = suspension;
        }
        if let Some(deleted) = patch.deleted {
            user.deleted = deleted;
        }
        Ok(user.clone())
    }

    async fn purge_user(&self, id: &str) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.users
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::Constraint(format!("no user with id {id}")))
    }

    async fn content(
        &self,
        kind: ContentKind,
        id: &str,
    ) -> Result<Option<ContentRecord>, StoreError> {
        Ok(self.content.read().await.get(&(kind, id.to_string())).cloned())
    }

    async fn update_content(
        &self,
        kind: ContentKind,
        id: &str,
        patch: ContentPatch,
    ) -> Result<ContentRecord, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.content.write().await;
        let record = guard
            .get_mut(&(kind, id.to_string()))
            .ok_or_else(|| StoreError::Constraint(format!("no {kind} with id {id}")))?;
        if let Some(deleted) = patch.deleted {
            record.deleted = deleted;
        }
        if let Some(locked) = patch.locked {
            record.locked = locked;
        }
        if let Some(pinned) = patch.pinned {
            record.pinned = pinned;
        }
        Ok(record.clone())
    }

    async fn purge_content(&self, kind: ContentKind, id: &str) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.content
            .write()
            .await
            .remove(&(kind, id.to_string()))
            .map(|_| ())
            .ok_or_else(|| StoreError::Constraint(format!("no {kind} with id {id}")))
    }
}

/// Cache/route invalidation hints for the presentation layer.
pub trait Revalidate: Send + Sync {
    /// Mark `path` stale.
    fn revalidate(&self, path: &str);
}

/// Discards every hint.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopRevalidate;

impl Revalidate for NoopRevalidate {
    fn revalidate(&self, _path: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn patch_clears_and_sets() {
        let store = MemoryForumStore::new();
        let mut user = UserRecord::new("u-1", Role::Member);
        user.ban = Some(Ban { reason: "spam".into(), until_ms: None });
        store.insert_user(user).await;

        let updated = store
            .update_user("u-1", UserPatch { ban: Some(None), role: Some(Role::Vip), ..Default::default() })
            .await
            .unwrap();
        assert!(updated.ban.is_none());
        assert_eq!(updated.role, Role::Vip);
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn missing_rows_are_constraint_errors() {
        let store = MemoryForumStore::new();
        let err = store
            .update_content(ContentKind::Reply, "r-1", ContentPatch::default())
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Constraint("no reply with id r-1".into()));
        assert!(store.purge_user("ghost").await.is_err());
    }
}
