use crate::clock::{Clock, SystemClock};
use crate::error::GateError;
use crate::principal::{Principal, Role};
use crate::rate_limit::policy::{PolicyCatalog, RateLimitPolicy};
use crate::rate_limit::store::{RateLimitWindow, WindowStore};
use crate::rate_limit::{RateLimitStatus, RateLimiter};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Compare-and-set attempts before a contended check gives up and denies.
const MAX_CAS_ATTEMPTS: usize = 16;

/// Default probability that a `check` call also sweeps expired windows.
pub const DEFAULT_SWEEP_PROBABILITY: f64 = 0.01;

/// A fixed-window rate limiter keyed by (principal, action).
///
/// The window opens on the first admitted request and admits `max_requests` until
/// `window_ms` has elapsed; then the next request opens a fresh window.
pub struct FixedWindowLimiter<S> {
    store: Arc<S>,
    catalog: Arc<PolicyCatalog>,
    clock: Arc<dyn Clock>,
    sweep_probability: f64,
}

impl<S> std::fmt::Debug for FixedWindowLimiter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedWindowLimiter")
            .field("policies", &self.catalog.len())
            .field("sweep_probability", &self.sweep_probability)
            .finish()
    }
}

impl<S> FixedWindowLimiter<S>
where
    S: WindowStore + 'static,
{
    /// Create a limiter backed by `store`, using the wall clock.
    pub fn new(store: S, catalog: PolicyCatalog) -> Self {
        Self {
            store: Arc::new(store),
            catalog: Arc::new(catalog),
            clock: Arc::new(SystemClock),
            sweep_probability: DEFAULT_SWEEP_PROBABILITY,
        }
    }

    /// Replace the clock (tests drive a `ManualClock`).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Fraction of `check` calls that also sweep expired windows. Clamped to `0.0..=1.0`.
    pub fn with_sweep_probability(mut self, probability: f64) -> Self {
        self.sweep_probability = if probability.is_nan() { 0.0 } else { probability.clamp(0.0, 1.0) };
        self
    }

    /// Policy table in use.
    pub fn catalog(&self) -> &PolicyCatalog {
        &self.catalog
    }

    /// Backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Store key for a (principal, action) pair.
    ///
    /// Both parts are percent-encoded, so a `:` inside either one can never shift the
    /// separator and merge two distinct pairs into one window.
    pub fn window_key(principal_id: &str, action: &str) -> String {
        format!("{}:{}", urlencoding::encode(action), urlencoding::encode(principal_id))
    }

    fn exempt(policy: &RateLimitPolicy, role: Role) -> Option<RateLimitStatus> {
        policy.exempts(role).then(|| RateLimitStatus::allowed(policy.max_requests(), None))
    }

    fn fault(err: S::Error) -> GateError {
        error!(target: "forumgate::rate_limit", error = %err, "window store failed");
        GateError::Unexpected("rate limiter unavailable".into())
    }

    fn denial(window: &RateLimitWindow, now: u64) -> RateLimitStatus {
        let reset_at = window.reset_at_ms();
        let wait_ms = reset_at.saturating_sub(now);
        RateLimitStatus::denied((wait_ms + 999) / 1000, reset_at)
    }

    async fn maybe_sweep(&self, now: u64) {
        if self.sweep_probability <= 0.0 || rand::random::<f64>() >= self.sweep_probability {
            return;
        }
        match self.store.sweep_expired(now).await {
            Ok(removed) => {
                debug!(target: "forumgate::rate_limit", removed, "swept expired windows")
            }
            Err(e) => warn!(target: "forumgate::rate_limit", error = %e, "window sweep failed"),
        }
    }
}

#[async_trait]
impl<S> RateLimiter for FixedWindowLimiter<S>
where
    S: WindowStore + 'static,
{
    async fn check(
        &self,
        principal: &Principal,
        action: &str,
    ) -> Result<RateLimitStatus, GateError> {
        let Some(policy) = self.catalog.get(action) else {
            return Ok(RateLimitStatus::unlimited());
        };
        if let Some(status) = Self::exempt(policy, principal.role) {
            return Ok(status);
        }

        let key = Self::window_key(&principal.id, action);
        let mut now = self.clock.now_millis();
        self.maybe_sweep(now).await;

        // Optimistic locking loop
        for _ in 0..MAX_CAS_ATTEMPTS {
            now = self.clock.now_millis();
            let stored = self.store.get(&key).await.map_err(Self::fault)?;
            let window = match stored {
                Some(w) if !w.is_expired(now) => w,
                _ => RateLimitWindow::fresh(now, policy.window_ms()),
            };

            if window.count >= policy.max_requests() {
                let status = Self::denial(&window, now);
                debug!(
                    target: "forumgate::rate_limit",
                    principal = %principal.id,
                    action,
                    retry_after_secs = status.retry_after_secs,
                    "rate limit denied"
                );
                return Ok(status);
            }

            let next = window.incremented();
            if self.store.compare_and_set(&key, next, stored).await.map_err(Self::fault)? {
                return Ok(RateLimitStatus::allowed(
                    policy.max_requests() - next.count,
                    Some(next.reset_at_ms()),
                ));
            }
            // Race detected, loop again
        }

        warn!(
            target: "forumgate::rate_limit",
            principal = %principal.id,
            action,
            "window store contention; denying"
        );
        Ok(RateLimitStatus::denied(1, now.saturating_add(1_000)))
    }

    async fn peek_status(
        &self,
        principal: &Principal,
        action: &str,
    ) -> Result<RateLimitStatus, GateError> {
        let Some(policy) = self.catalog.get(action) else {
            return Ok(RateLimitStatus::unlimited());
        };
        if let Some(status) = Self::exempt(policy, principal.role) {
            return Ok(status);
        }

        let now = self.clock.now_millis();
        let key = Self::window_key(&principal.id, action);
        match self.store.get(&key).await.map_err(Self::fault)? {
            Some(w) if !w.is_expired(now) => {
                if w.count >= policy.max_requests() {
                    Ok(Self::denial(&w, now))
                } else {
                    Ok(RateLimitStatus::allowed(
                        policy.max_requests() - w.count,
                        Some(w.reset_at_ms()),
                    ))
                }
            }
            _ => Ok(RateLimitStatus::allowed(policy.max_requests(), None)),
        }
    }

    async fn reset(
        &self,
        principal_id: &str,
        action: &str,
        requesting: &Principal,
    ) -> Result<(), GateError> {
        if requesting.role != Role::Admin {
            return Err(GateError::forbidden("Only administrators can reset rate limits"));
        }
        let key = Self::window_key(principal_id, action);
        let existed = self.store.remove(&key).await.map_err(Self::fault)?;
        debug!(
            target: "forumgate::rate_limit",
            principal = principal_id,
            action,
            existed,
            by = %requesting.id,
            "rate limit window reset"
        );
        Ok(())
    }
}
