//! The privileged-action gateway.
//!
//! Every gated call walks the same ordered pipeline ([`PIPELINE`]):
//!
//! 1. [`Stage::Resolve`]: resolve the caller; nobody is `Unauthenticated`.
//! 2. [`Stage::Authorize`]: role requirement plus argument-only rules (self-targeting,
//!    promotion limits, input validation). These never depend on limiter or store state.
//! 3. [`Stage::RateLimit`]: consume one slot of the action's window.
//! 4. [`Stage::Execute`]: target lookups, hierarchy checks against the stored role, then the
//!    mutation itself.
//! 5. [`Stage::Audit`]: best-effort audit entry and revalidation hints.
//!
//! A failing stage short-circuits; later stages never run. Rejections before `Execute`
//! therefore leave both the store and the audit trail untouched.

use crate::audit::{AuditEvent, AuditLog, AuditPage, AuditQuery, AuditStore, AuditWriter};
use crate::clock::{Clock, SystemClock};
use crate::config::GatewayConfig;
use crate::error::{ActionResult, AuditError, GateError};
use crate::gate::{settle, AuthorizationGate};
use crate::principal::{Principal, PrincipalResolver, RequestContext};
use crate::rate_limit::{FixedWindowLimiter, InMemoryWindowStore, RateLimitStatus, RateLimiter};
use crate::store::{ForumStore, NoopRevalidate, Revalidate};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error};

mod actions;
pub use actions::{action_keys, BulkOutcome, BulkSkip, MAX_BAN_DAYS, MAX_REASON_LEN, MAX_SUSPENSION_HOURS};

/// One step of the gated-action pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Resolve,
    Authorize,
    RateLimit,
    Execute,
    Audit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Resolve => "resolve",
            Stage::Authorize => "authorize",
            Stage::RateLimit => "rate_limit",
            Stage::Execute => "execute",
            Stage::Audit => "audit",
        };
        f.write_str(name)
    }
}

/// Stages in execution order.
pub const PIPELINE: [Stage; 5] =
    [Stage::Resolve, Stage::Authorize, Stage::RateLimit, Stage::Execute, Stage::Audit];

/// Role requirement of a gated call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    /// Any authenticated principal.
    Authenticated,
    /// `moderator` or `admin`.
    Privileged,
}

/// What a successful `Execute` stage hands to the rest of the pipeline.
#[derive(Debug)]
pub struct Outcome<T> {
    data: T,
    audit: Option<AuditEvent>,
    revalidate: Vec<String>,
}

impl<T> Outcome<T> {
    /// Result with nothing to audit.
    pub fn new(data: T) -> Self {
        Self { data, audit: None, revalidate: Vec::new() }
    }

    /// Result plus the audit event describing the mutation.
    pub fn audited(data: T, event: AuditEvent) -> Self {
        Self { data, audit: Some(event), revalidate: Vec::new() }
    }

    /// Add a presentation path to invalidate once the action has succeeded.
    pub fn revalidate(mut self, path: impl Into<String>) -> Self {
        self.revalidate.push(path.into());
        self
    }
}

/// Gateway in front of every privileged forum mutation.
#[derive(Clone)]
pub struct Gateway {
    gate: AuthorizationGate,
    limiter: Arc<dyn RateLimiter>,
    store: Arc<dyn ForumStore>,
    audit: AuditWriter,
    audit_log: AuditLog,
    revalidate: Arc<dyn Revalidate>,
    clock: Arc<dyn Clock>,
    config: GatewayConfig,
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Gateway {
    /// Start building a gateway over the three required collaborators.
    pub fn builder(
        resolver: Arc<dyn PrincipalResolver>,
        store: Arc<dyn ForumStore>,
        audit_store: Arc<dyn AuditStore>,
    ) -> GatewayBuilder {
        GatewayBuilder {
            resolver,
            store,
            audit_store,
            config: GatewayConfig::default(),
            clock: Arc::new(SystemClock),
            revalidate: Arc::new(NoopRevalidate),
            limiter: None,
        }
    }

    /// The authorization gate, for page-level checks.
    pub fn gate(&self) -> &AuthorizationGate {
        &self.gate
    }

    /// The shared limiter, e.g. to wrap a tower service with
    /// [`RateLimitLayer::shared`](crate::rate_limit::RateLimitLayer::shared).
    pub fn limiter(&self) -> Arc<dyn RateLimiter> {
        self.limiter.clone()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Walk the pipeline for one gated call.
    ///
    /// `precheck` runs in [`Stage::Authorize`] and must only inspect the principal and the
    /// call arguments. `op` runs in [`Stage::Execute`].
    pub async fn run<T, P, F, Fut>(
        &self,
        ctx: &RequestContext,
        access: Access,
        action_key: &str,
        precheck: P,
        op: F,
    ) -> ActionResult<T>
    where
        P: FnOnce(&Principal) -> Result<(), GateError>,
        F: FnOnce(Principal) -> Fut,
        Fut: Future<Output = Result<Outcome<T>, GateError>>,
    {
        settle(self.walk(ctx, access, action_key, precheck, op).await, action_key)
    }

    async fn walk<T, P, F, Fut>(
        &self,
        ctx: &RequestContext,
        access: Access,
        action_key: &str,
        precheck: P,
        op: F,
    ) -> Result<T, GateError>
    where
        P: FnOnce(&Principal) -> Result<(), GateError>,
        F: FnOnce(Principal) -> Fut,
        Fut: Future<Output = Result<Outcome<T>, GateError>>,
    {
        let principal =
            self.gate.authenticate(ctx).await.map_err(|e| rejected(Stage::Resolve, action_key, e))?;

        if access == Access::Privileged {
            AuthorizationGate::check_privileged(&principal)
                .map_err(|e| rejected(Stage::Authorize, action_key, e))?;
        }
        precheck(&principal).map_err(|e| rejected(Stage::Authorize, action_key, e))?;

        self.limiter
            .check(&principal, action_key)
            .await
            .and_then(RateLimitStatus::into_result)
            .map_err(|e| rejected(Stage::RateLimit, action_key, e))?;

        let outcome =
            op(principal.clone()).await.map_err(|e| rejected(Stage::Execute, action_key, e))?;

        if let Some(event) = outcome.audit {
            self.audit.record(event, &principal, ctx).await;
        }
        for path in &outcome.revalidate {
            self.revalidate.revalidate(path);
        }
        Ok(outcome.data)
    }

    /// Non-privileged entry point for ordinary forum writes (`thread_create`,
    /// `reply_create`, `like_action`, `profile_update`): authenticate and consume a slot.
    pub async fn check_member_action(
        &self,
        ctx: &RequestContext,
        action: &str,
    ) -> ActionResult<RateLimitStatus> {
        let outcome = async {
            let principal = self.gate.authenticate(ctx).await?;
            self.limiter.check(&principal, action).await?.into_result()
        };
        settle(outcome.await, action)
    }

    /// Report the caller's standing for `action` without consuming a slot.
    ///
    /// An exhausted window is still a successful call; the status carries `allowed: false`.
    pub async fn peek_member_action(
        &self,
        ctx: &RequestContext,
        action: &str,
    ) -> ActionResult<RateLimitStatus> {
        let outcome = async {
            let principal = self.gate.authenticate(ctx).await?;
            self.limiter.peek_status(&principal, action).await
        };
        settle(outcome.await, action)
    }

    /// Filtered audit listing for moderators and admins.
    pub async fn audit_entries(
        &self,
        ctx: &RequestContext,
        query: AuditQuery,
    ) -> ActionResult<AuditPage> {
        self.gate
            .with_privileged_auth(ctx, |_| async move {
                self.audit_log.list(&query).await.map_err(audit_read_failed)
            })
            .await
    }

    /// The `limit` most recent audit entries.
    pub async fn recent_activity(
        &self,
        ctx: &RequestContext,
        limit: usize,
    ) -> ActionResult<Vec<crate::audit::AuditEntry>> {
        self.gate
            .with_privileged_auth(ctx, |_| async move {
                self.audit_log.recent_activity(limit).await.map_err(audit_read_failed)
            })
            .await
    }

    /// Audit entry counts per action name.
    pub async fn audit_stats(&self, ctx: &RequestContext) -> ActionResult<BTreeMap<String, u64>> {
        self.gate
            .with_privileged_auth(ctx, |_| async move {
                self.audit_log.stats_by_action().await.map_err(audit_read_failed)
            })
            .await
    }
}

fn rejected(stage: Stage, action: &str, err: GateError) -> GateError {
    debug!(target: "forumgate::gate", %stage, action, error = %err, "pipeline stopped");
    err
}

fn audit_read_failed(err: AuditError) -> GateError {
    error!(target: "forumgate::audit", error = %err, "audit read failed");
    GateError::Unexpected("failed to load audit log".into())
}

/// Builder for [`Gateway`].
pub struct GatewayBuilder {
    resolver: Arc<dyn PrincipalResolver>,
    store: Arc<dyn ForumStore>,
    audit_store: Arc<dyn AuditStore>,
    config: GatewayConfig,
    clock: Arc<dyn Clock>,
    revalidate: Arc<dyn Revalidate>,
    limiter: Option<Arc<dyn RateLimiter>>,
}

impl GatewayBuilder {
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Clock shared by the default limiter, the audit writer and ban/suspension expiry.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn revalidate(mut self, revalidate: Arc<dyn Revalidate>) -> Self {
        self.revalidate = revalidate;
        self
    }

    /// Use a custom limiter instead of the in-memory fixed window built from the config.
    pub fn limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn build(self) -> Gateway {
        let config = self.config;
        let limiter: Arc<dyn RateLimiter> = match self.limiter {
            Some(limiter) => limiter,
            None => Arc::new(
                FixedWindowLimiter::new(InMemoryWindowStore::new(), config.policies().clone())
                    .with_clock(self.clock.clone())
                    .with_sweep_probability(config.sweep_probability()),
            ),
        };
        let gate = AuthorizationGate::new(self.resolver)
            .with_paths(config.login_path(), config.unauthorized_path());
        let audit = AuditWriter::new(self.audit_store.clone())
            .with_clock(self.clock.clone())
            .with_dispatch(config.audit_dispatch());
        Gateway {
            gate,
            limiter,
            store: self.store,
            audit,
            audit_log: AuditLog::new(self.audit_store),
            revalidate: self.revalidate,
            clock: self.clock,
            config,
        }
    }
}
