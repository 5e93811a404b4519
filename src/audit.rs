//! Audit trail for privileged actions.
//!
//! - [`AuditEntry`]: one immutable row per executed privileged action.
//! - [`AuditStore`]: pluggable append-only sink with a query side.
//! - [`AuditWriter`]: best-effort writer. Failures are logged on `forumgate::audit` and
//!   never reach the caller of the gated action.
//! - [`AuditLog`]: read path (filtered listing, recent activity, per-action counts).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

pub mod store;
pub mod writer;
pub use store::{AuditStore, MemoryAuditStore, DEFAULT_AUDIT_CAPACITY};
pub use writer::{AuditDispatch, AuditLog, AuditWriter};

/// Page size used when a query does not set one.
pub const DEFAULT_PAGE_SIZE: usize = 50;
/// Largest page a single query may request.
pub const MAX_PAGE_SIZE: usize = 500;

/// Durable record of one privileged action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Unique entry id (UUID v4).
    pub id: String,
    /// Principal who performed the action.
    pub actor_id: String,
    /// Action name, e.g. `user_ban`.
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Free-form structured details.
    #[serde(default)]
    pub details: Map<String, JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Epoch millis.
    pub created_at_ms: u64,
}

/// What a gated action reports for the audit trail; the writer adds actor, origin and time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AuditEvent {
    pub(crate) action: String,
    pub(crate) target_type: Option<String>,
    pub(crate) target_id: Option<String>,
    pub(crate) reason: Option<String>,
    pub(crate) details: Map<String, JsonValue>,
}

impl AuditEvent {
    /// Event for `action`.
    pub fn new(action: impl Into<String>) -> Self {
        Self { action: action.into(), ..Self::default() }
    }

    /// Set the target of the action.
    /// Only entries aimed at this target.
    pub fn target(mut self, target_type: impl Into<String>, target_id: impl Into<String>) -> Self {
        self.target_type = Some(target_type.into());
        self.target_id = Some(target_id.into());
        self
    }

    /// Set the stated reason.
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Add a details key.
    pub fn detail(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Action name.
    pub fn action(&self) -> &str {
        &self.action
    }
}

/// Filters for listing audit entries. Unset filters match everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuditQuery {
    /// Exact actor id.
    pub actor_id: Option<String>,
    /// Exact action key, e.g. `user_ban`.
    pub action: Option<String>,
    /// Exact target kind (`user`, `thread`, `reply`).
    pub target_type: Option<String>,
    /// Exact target id.
    pub target_id: Option<String>,
    /// Inclusive lower bound on `created_at_ms`.
    pub from_ms: Option<u64>,
    /// Inclusive upper bound on `created_at_ms`.
    pub to_ms: Option<u64>,
    /// Page size; defaults to `DEFAULT_PAGE_SIZE`, see [`AuditQuery::effective_limit`].
    pub limit: Option<usize>,
    /// Matches to skip before the page starts.
    pub offset: usize,
}

impl AuditQuery {
    /// Query matching every entry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only entries by `actor_id`.
    pub fn actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    /// Only entries for `action`.
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn target(mut self, target_type: impl Into<String>, target_id: impl Into<String>) -> Self {
        self.target_type = Some(target_type.into());
        self.target_id = Some(target_id.into());
        self
    }

    /// Only entries created in `from_ms..=to_ms`.
    pub fn between(mut self, from_ms: u64, to_ms: u64) -> Self {
        self.from_ms = Some(from_ms);
        self.to_ms = Some(to_ms);
        self
    }

    /// Page size, clamped when the query runs.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first `offset` matches.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Page size after defaulting and clamping to `1..=MAX_PAGE_SIZE`.
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    /// Whether `entry` passes every set filter.
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        fn eq(filter: &Option<String>, value: Option<&str>) -> bool {
            filter.as_deref().map_or(true, |f| value == Some(f))
        }
        eq(&self.actor_id, Some(&entry.actor_id))
            && eq(&self.action, Some(&entry.action))
            && eq(&self.target_type, entry.target_type.as_deref())
            && eq(&self.target_id, entry.target_id.as_deref())
            && self.from_ms.map_or(true, |from| entry.created_at_ms >= from)
            && self.to_ms.map_or(true, |to| entry.created_at_ms <= to)
    }
}

/// One page of entries plus the total number matching the filters.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditPage {
    pub entries: Vec<AuditEntry>,
    pub total: usize,
}

/// Filter and page entries newest-first.
///
/// `entries` must be in append order; ties on `created_at_ms` keep the later append first.
pub fn page_newest_first<I>(entries: I, query: &AuditQuery) -> AuditPage
where
    I: IntoIterator<Item = AuditEntry>,
    I::IntoIter: DoubleEndedIterator,
{
    let mut matching: Vec<AuditEntry> =
        entries.into_iter().rev().filter(|e| query.matches(e)).collect();
    matching.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
    let total = matching.len();
    let entries = matching.into_iter().skip(query.offset).take(query.effective_limit()).collect();
    AuditPage { entries, total }
}

/// Group entries by `action` and count them.
pub fn count_actions<'a, I>(entries: I) -> BTreeMap<String, u64>
where
    I: IntoIterator<Item = &'a AuditEntry>,
{
    let mut counts = BTreeMap::new();
    for entry in entries {
        *counts.entry(entry.action.clone()).or_insert(0) += 1;
    }
    counts
}
