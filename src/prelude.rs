//! Convenient re-exports for wiring a gateway and writing actions against it.
pub use crate::{
    audit::{AuditEvent, AuditQuery, AuditStore, MemoryAuditStore},
    clock::{Clock, ManualClock},
    error::{ActionResult, GateError},
    gate::{ensure_can_act_on, ensure_can_assign, ensure_not_self, SelfAction},
    gateway::{action_keys, Access, Gateway, Outcome},
    principal::{Principal, PrincipalResolver, RequestContext, Role},
    rate_limit::{PolicyCatalog, RateLimitLayer, RateLimitPolicy, RateLimiter},
    store::{ContentKind, ForumStore, MemoryForumStore},
};
