#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # forumgate
//!
//! Privileged-action gateway for a community forum: every moderator or administrator
//! mutation passes an authorization gate, a per-action rate limiter and a best-effort audit
//! writer before and after it touches the data store.
//!
//! ## Features
//!
//! - **Fixed-window rate limiting** per (principal, action) with role exemptions
//! - **Authorization gate** with role-hierarchy rules and page-level redirects
//! - **Audit trail** mirrored to `tracing`, never failing the action it records
//! - **Uniform results**: every action returns an [`ActionResult`] envelope
//! - **Tower middleware** for rate limiting arbitrary services
//!
//! ## Quick Start
//!
//! ```rust
//! use forumgate::{
//!     Gateway, MemoryAuditStore, MemoryForumStore, Principal, RequestContext, Role,
//!     StaticResolver, UserRecord,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let resolver = StaticResolver::new().with_principal(Principal::new("mod-1", Role::Moderator));
//!     let store = Arc::new(MemoryForumStore::new());
//!     store.insert_user(UserRecord::new("u-7", Role::Member)).await;
//!
//!     let gateway = Gateway::builder(Arc::new(resolver), store, Arc::new(MemoryAuditStore::default()))
//!         .build();
//!
//!     let ctx = RequestContext::with_credential("mod-1");
//!     let result = gateway.ban_user(&ctx, "u-7", "spam", Some(7)).await;
//!     assert!(result.success());
//! }
//! ```

pub mod audit;
pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod gateway;
pub mod prelude;
pub mod principal;
pub mod rate_limit;
pub mod store;

// Re-exports
pub use audit::{
    AuditDispatch, AuditEntry, AuditEvent, AuditLog, AuditPage, AuditQuery, AuditStore,
    AuditWriter, MemoryAuditStore,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{GatewayConfig, GatewayConfigBuilder};
pub use error::{ActionResult, AuditError, GateError, StoreError};
pub use gate::{AuthorizationGate, Redirect};
pub use gateway::{Access, BulkOutcome, BulkSkip, Gateway, GatewayBuilder, Outcome, Stage, PIPELINE};
pub use principal::{Principal, PrincipalResolver, RequestContext, Role, StaticResolver};
pub use rate_limit::{
    format_retry_time, FixedWindowLimiter, InMemoryWindowStore, PolicyCatalog, RateLimitLayer,
    RateLimitPolicy, RateLimitStatus, RateLimiter,
};
pub use store::{
    ContentKind, ContentRecord, ForumStore, MemoryForumStore, NoopRevalidate, Revalidate,
    UserRecord,
};
