//! Gateway configuration. Built once at startup and shared read-only.

use crate::audit::AuditDispatch;
use crate::gate::{DEFAULT_LOGIN_PATH, DEFAULT_UNAUTHORIZED_PATH, MAX_BULK_TARGETS};
use crate::rate_limit::strategies::DEFAULT_SWEEP_PROBABILITY;
use crate::rate_limit::PolicyCatalog;

/// Validated gateway configuration.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    policies: PolicyCatalog,
    sweep_probability: f64,
    audit_dispatch: AuditDispatch,
    max_bulk_targets: usize,
    login_path: String,
    unauthorized_path: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl GatewayConfig {
    /// Start from the forum defaults.
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }

    /// Rate-limit policy table.
    pub fn policies(&self) -> &PolicyCatalog {
        &self.policies
    }

    /// Fraction of limiter checks that sweep expired windows, in `0.0..=1.0`.
    pub fn sweep_probability(&self) -> f64 {
        self.sweep_probability
    }

    /// How audit entries reach the store.
    pub fn audit_dispatch(&self) -> AuditDispatch {
        self.audit_dispatch
    }

    /// Cap on targets per bulk call, in `1..=MAX_BULK_TARGETS`.
    pub fn max_bulk_targets(&self) -> usize {
        self.max_bulk_targets
    }

    /// Redirect target for unauthenticated page requests.
    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    /// Redirect target for under-privileged page requests.
    pub fn unauthorized_path(&self) -> &str {
        &self.unauthorized_path
    }
}

/// Builder for [`GatewayConfig`].
#[derive(Clone, Debug)]
pub struct GatewayConfigBuilder {
    policies: PolicyCatalog,
    sweep_probability: f64,
    audit_dispatch: AuditDispatch,
    max_bulk_targets: usize,
    login_path: String,
    unauthorized_path: String,
}

impl Default for GatewayConfigBuilder {
    fn default() -> Self {
        Self {
            policies: PolicyCatalog::forum_defaults(),
            sweep_probability: DEFAULT_SWEEP_PROBABILITY,
            audit_dispatch: AuditDispatch::Detached,
            max_bulk_targets: MAX_BULK_TARGETS,
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            unauthorized_path: DEFAULT_UNAUTHORIZED_PATH.to_string(),
        }
    }
}

impl GatewayConfigBuilder {
    /// Replace the whole policy table.
    pub fn policies(mut self, policies: PolicyCatalog) -> Self {
        self.policies = policies;
        self
    }

    /// Fraction of limiter checks that sweep expired windows.
    pub fn sweep_probability(mut self, p: f64) -> Self {
        self.sweep_probability = p;
        self
    }

    pub fn audit_dispatch(mut self, dispatch: AuditDispatch) -> Self {
        self.audit_dispatch = dispatch;
        self
    }

    /// Bulk cap; values above [`MAX_BULK_TARGETS`] are clamped down to it.
    pub fn max_bulk_targets(mut self, cap: usize) -> Self {
        self.max_bulk_targets = cap;
        self
    }

    pub fn login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    pub fn unauthorized_path(mut self, path: impl Into<String>) -> Self {
        self.unauthorized_path = path.into();
        self
    }

    pub fn build(self) -> GatewayConfig {
        let sweep_probability =
            if self.sweep_probability.is_nan() { 0.0 } else { self.sweep_probability.clamp(0.0, 1.0) };
        GatewayConfig {
            policies: self.policies,
            sweep_probability,
            audit_dispatch: self.audit_dispatch,
            max_bulk_targets: self.max_bulk_targets.clamp(1, MAX_BULK_TARGETS),
            login_path: self.login_path,
            unauthorized_path: self.unauthorized_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = GatewayConfig::default();
        assert_eq!(cfg.policies(), &PolicyCatalog::forum_defaults());
        assert_eq!(cfg.max_bulk_targets(), 50);
        assert_eq!(cfg.audit_dispatch(), AuditDispatch::Detached);
        assert_eq!(cfg.login_path(), "/login");
    }

    #[test]
    fn build_clamps() {
        let cfg = GatewayConfig::builder().sweep_probability(4.0).max_bulk_targets(500).build();
        assert_eq!(cfg.sweep_probability(), 1.0);
        assert_eq!(cfg.max_bulk_targets(), 50);
        let cfg = GatewayConfig::builder().sweep_probability(f64::NAN).max_bulk_targets(0).build();
        assert_eq!(cfg.sweep_probability(), 0.0);
        assert_eq!(cfg.max_bulk_targets(), 1);
    }
}
