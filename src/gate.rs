//! Authorization gate: resolve the caller, require a privileged role, and turn every outcome
//! into an [`ActionResult`] instead of letting errors cross the action boundary.

use crate::error::{ActionResult, GateError};
use crate::principal::{Principal, PrincipalResolver, RequestContext};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error};

pub mod hierarchy;
pub use hierarchy::{
    ensure_can_act_on, ensure_can_assign, ensure_hard_delete, ensure_not_self, validate_bulk,
    SelfAction, MAX_BULK_TARGETS,
};

/// Default login destination for page-level redirects.
pub const DEFAULT_LOGIN_PATH: &str = "/login";
/// Default destination for authenticated but under-privileged callers.
pub const DEFAULT_UNAUTHORIZED_PATH: &str = "/unauthorized";

const PRIVILEGED_REQUIRED: &str = "moderator or administrator role required";

/// Navigation redirect produced by [`AuthorizationGate::require_privileged`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Redirect {
    /// Target location, including the `next` return hint.
    pub location: String,
}

/// Resolves principals and enforces the privileged-role requirement.
#[derive(Clone)]
pub struct AuthorizationGate {
    resolver: Arc<dyn PrincipalResolver>,
    login_path: String,
    unauthorized_path: String,
}

impl AuthorizationGate {
    /// Create a gate over `resolver` with the default redirect paths.
    pub fn new(resolver: Arc<dyn PrincipalResolver>) -> Self {
        Self {
            resolver,
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            unauthorized_path: DEFAULT_UNAUTHORIZED_PATH.to_string(),
        }
    }

    /// Override the redirect destinations.
    pub fn with_paths(mut self, login: impl Into<String>, unauthorized: impl Into<String>) -> Self {
        self.login_path = login.into();
        self.unauthorized_path = unauthorized.into();
        self
    }

    /// Resolve an authenticated principal of any role.
    pub async fn authenticate(&self, ctx: &RequestContext) -> Result<Principal, GateError> {
        self.resolver.resolve(ctx).await?.ok_or(GateError::Unauthenticated)
    }

    /// Resolve a principal holding `moderator` or `admin`.
    pub async fn authorize(&self, ctx: &RequestContext) -> Result<Principal, GateError> {
        let principal = self.authenticate(ctx).await?;
        Self::check_privileged(&principal)?;
        Ok(principal)
    }

    /// Role half of [`authorize`](Self::authorize), for callers that already resolved.
    pub fn check_privileged(principal: &Principal) -> Result<(), GateError> {
        if !principal.role.is_privileged() {
            return Err(GateError::forbidden(PRIVILEGED_REQUIRED));
        }
        Ok(())
    }

    /// Run `action` for a verified privileged principal.
    ///
    /// Client-facing failures become `success: false` without fault logging; anything else
    /// is logged on `forumgate::gate` first.
    pub async fn with_privileged_auth<T, F, Fut>(
        &self,
        ctx: &RequestContext,
        action: F,
    ) -> ActionResult<T>
    where
        F: FnOnce(Principal) -> Fut,
        Fut: Future<Output = Result<T, GateError>>,
    {
        let outcome = match self.authorize(ctx).await {
            Ok(principal) => action(principal).await,
            Err(e) => Err(e),
        };
        settle(outcome, "privileged action")
    }

    /// Page-level variant: return the principal or a redirect.
    ///
    /// Unauthenticated callers go to the login path, under-privileged ones to the
    /// unauthorized path. Both carry `next=<requested path>`; `fallback_path` is used when the
    /// request did not record one.
    pub async fn require_privileged(
        &self,
        ctx: &RequestContext,
        fallback_path: &str,
    ) -> Result<Principal, Redirect> {
        let next = ctx.requested_path.as_deref().unwrap_or(fallback_path);
        match self.authorize(ctx).await {
            Ok(principal) => Ok(principal),
            Err(GateError::Forbidden(_)) => Err(redirect(&self.unauthorized_path, next)),
            Err(GateError::Unauthenticated) => Err(redirect(&self.login_path, next)),
            Err(e) => {
                error!(target: "forumgate::gate", error = %e, "principal resolution failed");
                Err(redirect(&self.login_path, next))
            }
        }
    }
}

fn redirect(base: &str, next: &str) -> Redirect {
    let sep = if base.contains('?') { '&' } else { '?' };
    Redirect { location: format!("{base}{sep}next={}", urlencoding::encode(next)) }
}

/// Convert an action outcome into the uniform envelope, logging faults.
pub(crate) fn settle<T>(outcome: Result<T, GateError>, what: &str) -> ActionResult<T> {
    match outcome {
        Ok(data) => ActionResult::ok(data),
        Err(e) if e.is_client_error() => {
            debug!(target: "forumgate::gate", action = what, error = %e, "action rejected");
            e.into()
        }
        Err(e) => {
            match &e {
                GateError::Store { verb, source } => {
                    error!(target: "forumgate::gate", action = what, verb = *verb, error = %source, "store failure")
                }
                other => error!(target: "forumgate::gate", action = what, error = %other, "unexpected failure"),
            }
            e.into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::{Role, StaticResolver};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn gate() -> AuthorizationGate {
        let resolver = StaticResolver::new()
            .with_principal(Principal::new("mod-1", Role::Moderator))
            .with_principal(Principal::new("admin-1", Role::Admin))
            .with_principal(Principal::new("u-1", Role::Vip));
        AuthorizationGate::new(Arc::new(resolver))
    }

    #[tokio::test]
    async fn unauthenticated_never_runs_action() {
        let ran = AtomicBool::new(false);
        let res = gate()
            .with_privileged_auth(&RequestContext::anonymous(), |_| async {
                ran.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(res.error(), Some("authentication required"));
    }

    #[tokio::test]
    async fn members_are_forbidden() {
        let res: ActionResult<()> = gate()
            .with_privileged_auth(&RequestContext::with_credential("u-1"), |_| async { Ok(()) })
            .await;
        assert!(!res.success());
        assert_eq!(res.error(), Some(PRIVILEGED_REQUIRED));
    }

    #[tokio::test]
    async fn moderators_get_their_principal() {
        let res = gate()
            .with_privileged_auth(&RequestContext::with_credential("mod-1"), |p| async move {
                Ok(p.id)
            })
            .await;
        assert_eq!(res.data().map(String::as_str), Some("mod-1"));
    }

    #[tokio::test]
    async fn unexpected_errors_become_failures() {
        let res: ActionResult<()> = gate()
            .with_privileged_auth(&RequestContext::with_credential("admin-1"), |_| async {
                Err(GateError::Unexpected(String::new()))
            })
            .await;
        assert_eq!(res.error(), Some(crate::error::GENERIC_FAILURE));
    }

    #[tokio::test]
    async fn redirects_round_trip_requested_path() {
        let g = gate();
        let anon = RequestContext::anonymous().requested_path("/admin/users?page=2");
        let r = g.require_privileged(&anon, "/admin").await.unwrap_err();
        assert_eq!(r.location, "/login?next=%2Fadmin%2Fusers%3Fpage%3D2");

        let member = RequestContext::with_credential("u-1");
        let r = g.require_privileged(&member, "/admin").await.unwrap_err();
        assert_eq!(r.location, "/unauthorized?next=%2Fadmin");

        let admin = RequestContext::with_credential("admin-1");
        assert_eq!(g.require_privileged(&admin, "/admin").await.unwrap().id, "admin-1");
    }

    #[tokio::test]
    async fn custom_paths_with_query_append() {
        let g = gate().with_paths("/auth?mode=signin", "/denied");
        let r = g.require_privileged(&RequestContext::anonymous(), "/mod").await.unwrap_err();
        assert_eq!(r.location, "/auth?mode=signin&next=%2Fmod");
    }
}
