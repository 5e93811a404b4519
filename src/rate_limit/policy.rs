//! Per-action rate limit policies.
//!
//! Policies are configuration: built once (from code or JSON) and shared read-only.

use crate::principal::Role;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Rate-limit key for creating a thread.
pub const THREAD_CREATE: &str = "thread_create";
/// Rate-limit key for posting a reply.
pub const REPLY_CREATE: &str = "reply_create";
/// Rate-limit key for likes.
pub const LIKE_ACTION: &str = "like_action";
/// Rate-limit key for profile edits.
pub const PROFILE_UPDATE: &str = "profile_update";

const ONE_HOUR_MS: u64 = 3_600_000;

/// Errors produced when building or loading policies.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PolicyError {
    /// Window duration must be > 0.
    #[error("window_ms must be > 0 for action '{action}'")]
    InvalidWindow {
        /// Offending action name.
        action: String,
    },
    /// Request cap must be > 0.
    #[error("max_requests must be > 0 for action '{action}'")]
    InvalidMaxRequests {
        /// Offending action name.
        action: String,
    },
    /// The JSON document could not be parsed.
    #[error("invalid policy document: {0}")]
    Parse(String),
}

/// Fixed-window policy for one action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitPolicy {
    window_ms: u64,
    max_requests: u32,
    #[serde(default)]
    exempt_roles: HashSet<Role>,
}

impl RateLimitPolicy {
    /// Create a policy with no exemptions.
    pub fn new(window_ms: u64, max_requests: u32) -> Result<Self, PolicyError> {
        let policy = Self { window_ms, max_requests, exempt_roles: HashSet::new() };
        policy.validate("<unnamed>")?;
        Ok(policy)
    }

    /// Exempt `roles` from this policy.
    pub fn exempt(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.exempt_roles.extend(roles);
        self
    }

    /// Window length in milliseconds.
    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Requests admitted per window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Roles that bypass this policy.
    pub fn exempt_roles(&self) -> &HashSet<Role> {
        &self.exempt_roles
    }

    /// Whether `role` bypasses this policy.
    pub fn exempts(&self, role: Role) -> bool {
        self.exempt_roles.contains(&role)
    }

    fn validate(&self, action: &str) -> Result<(), PolicyError> {
        if self.window_ms == 0 {
            return Err(PolicyError::InvalidWindow { action: action.to_string() });
        }
        if self.max_requests == 0 {
            return Err(PolicyError::InvalidMaxRequests { action: action.to_string() });
        }
        Ok(())
    }
}

/// Immutable action → policy table. Unknown actions have no policy and are never limited.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PolicyCatalog {
    policies: HashMap<String, RateLimitPolicy>,
}

impl PolicyCatalog {
    /// Catalog with no policies (everything fails open).
    pub fn empty() -> Self {
        Self::default()
    }

    /// The forum's built-in limits.
    ///
    /// | action | window | max | exempt |
    /// |---|---|---|---|
    /// | `thread_create` | 1h | 5 | moderator, admin |
    /// | `reply_create` | 1h | 20 | moderator, admin |
    /// | `like_action` | 1h | 100 | none |
    /// | `profile_update` | 1h | 10 | moderator, admin |
    pub fn forum_defaults() -> Self {
        let staff = [Role::Moderator, Role::Admin];
        let mut policies = HashMap::new();
        policies.insert(
            THREAD_CREATE.to_string(),
            RateLimitPolicy { window_ms: ONE_HOUR_MS, max_requests: 5, exempt_roles: staff.into() },
        );
        policies.insert(
            REPLY_CREATE.to_string(),
            RateLimitPolicy {
                window_ms: ONE_HOUR_MS,
                max_requests: 20,
                exempt_roles: staff.into(),
            },
        );
        policies.insert(
            LIKE_ACTION.to_string(),
            RateLimitPolicy {
                window_ms: ONE_HOUR_MS,
                max_requests: 100,
                exempt_roles: HashSet::new(),
            },
        );
        policies.insert(
            PROFILE_UPDATE.to_string(),
            RateLimitPolicy {
                window_ms: ONE_HOUR_MS,
                max_requests: 10,
                exempt_roles: staff.into(),
            },
        );
        Self { policies }
    }

    /// Load a catalog from a JSON object keyed by action name.
    ///
    /// ```json
    /// { "thread_create": { "windowMs": 3600000, "maxRequests": 5, "exemptRoles": ["admin"] } }
    /// ```
    pub fn from_json(raw: &str) -> Result<Self, PolicyError> {
        let policies: HashMap<String, RateLimitPolicy> =
            serde_json::from_str(raw).map_err(|e| PolicyError::Parse(e.to_string()))?;
        for (action, policy) in &policies {
            policy.validate(action)?;
        }
        Ok(Self { policies })
    }

    /// Return a copy with `policy` registered under `action`, replacing any existing entry.
    pub fn with_policy(mut self, action: impl Into<String>, policy: RateLimitPolicy) -> Self {
        self.policies.insert(action.into(), policy);
        self
    }

    /// Policy for `action`, if any.
    pub fn get(&self, action: &str) -> Option<&RateLimitPolicy> {
        self.policies.get(action)
    }

    /// Registered action names (sorted).
    pub fn actions(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.policies.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of registered policies.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forum_defaults_match_table() {
        let catalog = PolicyCatalog::forum_defaults();
        assert_eq!(
            catalog.actions(),
            vec!["like_action", "profile_update", "reply_create", "thread_create"]
        );

        let thread = catalog.get(THREAD_CREATE).unwrap();
        assert_eq!((thread.window_ms(), thread.max_requests()), (3_600_000, 5));
        assert!(thread.exempts(Role::Moderator) && thread.exempts(Role::Admin));
        assert!(!thread.exempts(Role::Vip));

        let reply = catalog.get(REPLY_CREATE).unwrap();
        assert_eq!((reply.window_ms(), reply.max_requests()), (3_600_000, 20));

        let like = catalog.get(LIKE_ACTION).unwrap();
        assert_eq!((like.window_ms(), like.max_requests()), (3_600_000, 100));
        assert!(like.exempt_roles().is_empty());

        let profile = catalog.get(PROFILE_UPDATE).unwrap();
        assert_eq!((profile.window_ms(), profile.max_requests()), (3_600_000, 10));
        assert!(profile.exempts(Role::Admin));
    }

    #[test]
    fn json_catalog_round_trips_fields() {
        let catalog = PolicyCatalog::from_json(
            r#"{"user_ban": {"windowMs": 60000, "maxRequests": 5, "exemptRoles": ["admin"]},
                "like_action": {"windowMs": 1000, "maxRequests": 2}}"#,
        )
        .unwrap();
        let ban = catalog.get("user_ban").unwrap();
        assert_eq!(ban.window_ms(), 60_000);
        assert!(ban.exempts(Role::Admin));
        assert!(catalog.get("like_action").unwrap().exempt_roles().is_empty());
    }

    #[test]
    fn json_catalog_rejects_zero_values() {
        let err = PolicyCatalog::from_json(r#"{"x": {"windowMs": 0, "maxRequests": 1}}"#)
            .unwrap_err();
        assert_eq!(err, PolicyError::InvalidWindow { action: "x".into() });
        let err = PolicyCatalog::from_json(r#"{"y": {"windowMs": 10, "maxRequests": 0}}"#)
            .unwrap_err();
        assert_eq!(err, PolicyError::InvalidMaxRequests { action: "y".into() });
        assert!(matches!(PolicyCatalog::from_json("[]"), Err(PolicyError::Parse(_))));
    }

    #[test]
    fn new_validates() {
        assert!(RateLimitPolicy::new(0, 1).is_err());
        assert!(RateLimitPolicy::new(1, 0).is_err());
        assert!(RateLimitPolicy::new(1, 1).is_ok());
    }
}
