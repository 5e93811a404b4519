use super::{count_actions, page_newest_first, AuditEntry, AuditPage, AuditQuery};
use crate::error::AuditError;
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

/// Default number of entries kept by [`MemoryAuditStore`].
pub const DEFAULT_AUDIT_CAPACITY: usize = 10_000;

/// Append-only audit sink with a query side.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append one entry. Entries are never updated or deleted through this trait.
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditError>;

    /// Entries matching `query`, newest first, plus the total match count.
    async fn query(&self, query: &AuditQuery) -> Result<AuditPage, AuditError>;

    /// Number of entries per action name.
    async fn count_by_action(&self) -> Result<BTreeMap<String, u64>, AuditError>;
}

/// In-memory audit store for tests and diagnostics.
///
/// It is bounded: past `capacity` the oldest entry is dropped (with a warning), so it does
/// not keep the full append-only trail and `count_by_action` only covers retained entries.
/// Production deployments should plug in a durable [`AuditStore`].
#[derive(Clone)]
pub struct MemoryAuditStore {
    entries: Arc<Mutex<VecDeque<AuditEntry>>>,
    capacity: usize,
}

impl Default for MemoryAuditStore {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIT_CAPACITY)
    }
}

impl MemoryAuditStore {
    /// Create a store keeping at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self { entries: Arc::new(Mutex::new(VecDeque::new())), capacity: capacity.max(1) }
    }

    /// Retrieve stored entries in append order.
    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditError> {
        let mut guard = self.entries.lock().await;
        guard.push_back(entry);
        if guard.len() > self.capacity {
            if let Some(evicted) = guard.pop_front() {
                warn!(
                    target: "forumgate::audit",
                    id = %evicted.id,
                    action = %evicted.action,
                    capacity = self.capacity,
                    "memory audit store full; oldest entry evicted"
                );
            }
        }
        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> Result<AuditPage, AuditError> {
        let snapshot: Vec<AuditEntry> = self.entries.lock().await.iter().cloned().collect();
        Ok(page_newest_first(snapshot, query))
    }

    async fn count_by_action(&self) -> Result<BTreeMap<String, u64>, AuditError> {
        Ok(count_actions(self.entries.lock().await.iter()))
    }
}
