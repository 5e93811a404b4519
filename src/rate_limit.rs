//! Rate limiting primitives.
//!
//! This module provides the building blocks for per-(principal, action) limiting:
//! - [`RateLimiter`]: The core trait (`check`, `peek_status`, `reset`).
//! - [`FixedWindowLimiter`](strategies::FixedWindowLimiter): fixed-window counter with role
//!   exemptions, driven by a [`PolicyCatalog`](policy::PolicyCatalog).
//! - [`RateLimitLayer`]: Tower middleware that enforces the limit.
//! - [`RateLimitStatus`]: The result of a check.
//!
//! # Architecture
//!
//! - **Middleware**: `RateLimitLayer` wraps your service. It doesn't know *how* limiting works,
//!   only that it should ask a `RateLimiter`.
//! - **Logic**: `FixedWindowLimiter` handles the window math and exemptions.
//! - **Storage**: `WindowStore` (in `store` module) holds the windows. The bundled
//!   `InMemoryWindowStore` is process-local: limits are enforced per process and reset on
//!   restart. Multi-instance deployments need a shared backend behind the same trait.

use crate::error::GateError;
use crate::principal::Principal;
use serde::Serialize;

pub mod middleware;
pub mod policy;
pub mod store;
pub mod strategies;
pub use middleware::{ActionRequest, RateLimitLayer, RateLimitService};
pub use policy::{PolicyCatalog, PolicyError, RateLimitPolicy};
pub use store::{InMemoryWindowStore, RateLimitWindow, WindowStore};
pub use strategies::FixedWindowLimiter;

/// The outcome of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Slots left in the current window. Absent when no policy applies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
    /// Whole seconds until a denied caller may retry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    /// Epoch milliseconds at which the current window closes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_at_ms: Option<u64>,
}

impl RateLimitStatus {
    /// No policy for the action; always allowed.
    pub fn unlimited() -> Self {
        Self { allowed: true, remaining: None, retry_after_secs: None, reset_at_ms: None }
    }

    /// Allowed with `remaining` slots left.
    pub fn allowed(remaining: u32, reset_at_ms: Option<u64>) -> Self {
        Self { allowed: true, remaining: Some(remaining), retry_after_secs: None, reset_at_ms }
    }

    /// Denied until `reset_at_ms`.
    pub fn denied(retry_after_secs: u64, reset_at_ms: u64) -> Self {
        Self {
            allowed: false,
            remaining: Some(0),
            retry_after_secs: Some(retry_after_secs),
            reset_at_ms: Some(reset_at_ms),
        }
    }

    /// Helper to check if allowed.
    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// Turn a denial into [`GateError::RateLimited`].
    pub fn into_result(self) -> Result<Self, GateError> {
        if self.allowed {
            Ok(self)
        } else {
            Err(GateError::RateLimited { retry_after_secs: self.retry_after_secs.unwrap_or(1) })
        }
    }
}

/// Core interface for rate limiting logic.
///
/// Implementations must make `check` atomic per (principal, action): two concurrent callers
/// never both take the last slot of a window.
#[async_trait::async_trait]
pub trait RateLimiter: Send + Sync {
    /// Evaluate and, when allowed, consume one slot.
    async fn check(&self, principal: &Principal, action: &str)
        -> Result<RateLimitStatus, GateError>;

    /// Evaluate without consuming a slot.
    async fn peek_status(
        &self,
        principal: &Principal,
        action: &str,
    ) -> Result<RateLimitStatus, GateError>;

    /// Administrative override: drop the window for `(principal_id, action)`.
    async fn reset(
        &self,
        principal_id: &str,
        action: &str,
        requesting: &Principal,
    ) -> Result<(), GateError>;
}

/// Render a retry delay as `"N second(s)"`, `"N minute(s)"`, or `"N hour(s)"`.
///
/// Minutes and hours round up.
pub fn format_retry_time(seconds: u64) -> String {
    if seconds < 60 {
        return plural(seconds, "second");
    }
    let minutes = (seconds + 59) / 60;
    if minutes < 60 {
        return plural(minutes, "minute");
    }
    plural((minutes + 59) / 60, "hour")
}

fn plural(n: u64, unit: &str) -> String {
    if n == 1 {
        format!("1 {unit}")
    } else {
        format!("{n} {unit}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_time_formatting() {
        assert_eq!(format_retry_time(1), "1 second");
        assert_eq!(format_retry_time(30), "30 seconds");
        assert_eq!(format_retry_time(60), "1 minute");
        assert_eq!(format_retry_time(61), "2 minutes");
        assert_eq!(format_retry_time(120), "2 minutes");
        assert_eq!(format_retry_time(3599), "1 hour");
        assert_eq!(format_retry_time(3600), "1 hour");
        assert_eq!(format_retry_time(7200), "2 hours");
    }

    #[test]
    fn denied_status_maps_to_error() {
        let err = RateLimitStatus::denied(42, 1_000).into_result().unwrap_err();
        assert_eq!(err.retry_after_secs(), Some(42));
        assert!(RateLimitStatus::unlimited().into_result().is_ok());
    }
}
