use super::{AuditEntry, AuditEvent, AuditPage, AuditQuery, AuditStore};
use crate::clock::{Clock, SystemClock};
use crate::error::AuditError;
use crate::principal::{Principal, RequestContext};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// How the writer hands entries to the store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AuditDispatch {
    /// Spawn the append on the current tokio runtime and return immediately.
    #[default]
    Detached,
    /// Await the append in place. Errors are still swallowed.
    Inline,
}

/// Best-effort audit writer.
///
/// Every entry is mirrored to the `forumgate::audit` tracing target before the durable append
/// is attempted, so the trail stays visible even when the store is down.
#[derive(Clone)]
pub struct AuditWriter {
    store: Arc<dyn AuditStore>,
    clock: Arc<dyn Clock>,
    dispatch: AuditDispatch,
}

impl std::fmt::Debug for AuditWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditWriter").field("dispatch", &self.dispatch).finish()
    }
}

impl AuditWriter {
    /// Create a writer over `store` using the wall clock and detached dispatch.
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store, clock: Arc::new(SystemClock), dispatch: AuditDispatch::Detached }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_dispatch(mut self, dispatch: AuditDispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Build the entry for `event` performed by `actor` under `ctx`.
    pub fn entry(&self, event: AuditEvent, actor: &Principal, ctx: &RequestContext) -> AuditEntry {
        AuditEntry {
            id: uuid::Uuid::new_v4().to_string(),
            actor_id: actor.id.clone(),
            action: event.action,
            target_type: event.target_type,
            target_id: event.target_id,
            reason: event.reason,
            details: event.details,
            source_address: ctx.source_address.clone(),
            user_agent: ctx.user_agent.clone(),
            created_at_ms: self.clock.now_millis(),
        }
    }

    /// Record `event`. Never fails; store errors are logged and dropped.
    pub async fn record(&self, event: AuditEvent, actor: &Principal, ctx: &RequestContext) {
        let entry = self.entry(event, actor, ctx);
        mirror(&entry);
        let store = self.store.clone();
        match self.dispatch {
            AuditDispatch::Inline => persist(store, entry).await,
            AuditDispatch::Detached => match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    // Detached: the task owns its own error boundary, including panics.
                    drop(handle.spawn(persist(store, entry)));
                }
                Err(_) => persist(store, entry).await,
            },
        }
    }
}

fn mirror(entry: &AuditEntry) {
    info!(
        target: "forumgate::audit",
        id = %entry.id,
        actor = %entry.actor_id,
        action = %entry.action,
        target_type = ?entry.target_type,
        target_id = ?entry.target_id,
        reason = ?entry.reason,
        details = %JsonValue::Object(entry.details.clone()),
        source_address = ?entry.source_address,
        user_agent = ?entry.user_agent,
        created_at_ms = entry.created_at_ms,
        "audit"
    );
}

async fn persist(store: Arc<dyn AuditStore>, entry: AuditEntry) {
    let action = entry.action.clone();
    let actor = entry.actor_id.clone();
    if let Err(e) = store.append(entry).await {
        warn!(target: "forumgate::audit", error = %e, action = %action, actor = %actor, "failed to write audit entry");
    }
}

/// Read side of the audit trail.
#[derive(Clone)]
pub struct AuditLog {
    store: Arc<dyn AuditStore>,
}

impl AuditLog {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Filtered listing, newest first.
    pub async fn list(&self, query: &AuditQuery) -> Result<AuditPage, AuditError> {
        self.store.query(query).await
    }

    /// The `limit` most recent entries.
    pub async fn recent_activity(&self, limit: usize) -> Result<Vec<AuditEntry>, AuditError> {
        Ok(self.store.query(&AuditQuery::new().limit(limit)).await?.entries)
    }

    /// Entry counts grouped by action.
    pub async fn stats_by_action(&self) -> Result<BTreeMap<String, u64>, AuditError> {
        self.store.count_by_action().await
    }
}
