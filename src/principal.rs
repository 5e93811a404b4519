//! Principals, roles, and the resolver seam that turns a request into an actor.

use crate::error::GateError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Forum role of a principal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular account.
    Member,
    /// Freshly registered account.
    Newbie,
    /// Trusted contributor.
    Vip,
    /// Can moderate content and members.
    Moderator,
    /// Full control.
    Admin,
}

impl Role {
    /// Position in the hierarchy `member/newbie < vip < moderator < admin`.
    pub fn rank(self) -> u8 {
        match self {
            Role::Member | Role::Newbie => 0,
            Role::Vip => 1,
            Role::Moderator => 2,
            Role::Admin => 3,
        }
    }

    /// Moderator or admin.
    pub fn is_privileged(self) -> bool {
        matches!(self, Role::Moderator | Role::Admin)
    }

    /// Lower-case name used in configuration and audit details.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Newbie => "newbie",
            Role::Vip => "vip",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown role name.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "member" => Ok(Role::Member),
            "newbie" => Ok(Role::Newbie),
            "vip" => Ok(Role::Vip),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

/// Authenticated actor performing a request.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    /// Opaque principal identifier.
    pub id: String,
    /// Current role.
    pub role: Role,
}

impl Principal {
    /// Create a principal.
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self { id: id.into(), role }
    }
}

/// Ambient request data handed to the gateway by the request-handling runtime.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Session or bearer credential, verified by the resolver.
    pub credential: Option<String>,
    /// Network origin (e.g. `x-forwarded-for`).
    pub source_address: Option<String>,
    /// Client user-agent header.
    pub user_agent: Option<String>,
    /// Path the caller originally asked for; round-tripped into login redirects.
    pub requested_path: Option<String>,
}

impl RequestContext {
    /// Context carrying only a credential.
    pub fn with_credential(credential: impl Into<String>) -> Self {
        Self { credential: Some(credential.into()), ..Self::default() }
    }

    /// Context with no credential at all.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Attach the network origin.
    pub fn source_address(mut self, addr: impl Into<String>) -> Self {
        self.source_address = Some(addr.into());
        self
    }

    /// Attach the user-agent header.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Attach the originally requested path.
    pub fn requested_path(mut self, path: impl Into<String>) -> Self {
        self.requested_path = Some(path.into());
        self
    }
}

/// Session/credential lookup. Yields `None` for unauthenticated requests.
#[async_trait]
pub trait PrincipalResolver: Send + Sync {
    /// Resolve the principal behind `ctx`.
    async fn resolve(&self, ctx: &RequestContext) -> Result<Option<Principal>, GateError>;
}

/// Fixed credential → principal table (dev/testing).
#[derive(Clone, Debug, Default)]
pub struct StaticResolver {
    sessions: HashMap<String, Principal>,
}

impl StaticResolver {
    /// Empty table; every request resolves to `None`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `credential` to `principal`.
    pub fn with_session(mut self, credential: impl Into<String>, principal: Principal) -> Self {
        self.sessions.insert(credential.into(), principal);
        self
    }

    /// Map a principal's id to itself, so the id doubles as the credential.
    pub fn with_principal(self, principal: Principal) -> Self {
        let credential = principal.id.clone();
        self.with_session(credential, principal)
    }
}

#[async_trait]
impl PrincipalResolver for StaticResolver {
    async fn resolve(&self, ctx: &RequestContext) -> Result<Option<Principal>, GateError> {
        Ok(ctx.credential.as_ref().and_then(|c| self.sessions.get(c)).cloned())
    }
}
