//! Error taxonomy and the uniform result envelope returned by gated actions.
use crate::rate_limit::format_retry_time;
use serde::Serialize;

/// Failures reported by the forum data store collaborator.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreError {
    /// The store rejected the write (constraint violation and friends).
    #[error("constraint violated: {0}")]
    Constraint(String),
    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// Anything else the backend reported.
    #[error("store error: {0}")]
    Other(String),
}

/// Failures reported by an audit store. Never surfaced to callers of gated actions.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuditError {
    /// The durable sink rejected or failed the append.
    #[error("audit write failed: {0}")]
    Write(String),
    /// Reading entries back failed.
    #[error("audit read failed: {0}")]
    Read(String),
}

/// Unified error kind for everything that can stop a gated action.
///
/// The `Display` output is the caller-facing message; it never includes backend details.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GateError {
    /// No principal could be resolved for the request.
    #[error("authentication required")]
    Unauthenticated,
    /// The principal lacks the role, or breaks a role-hierarchy rule.
    #[error("{0}")]
    Forbidden(String),
    /// The principal exhausted the window for this action.
    #[error("rate limit exceeded, try again in {}", retry_text(.retry_after_secs))]
    RateLimited {
        /// Whole seconds until the current window closes.
        retry_after_secs: u64,
    },
    /// Malformed input to a gated action.
    #[error("{0}")]
    Validation(String),
    /// The underlying mutation failed.
    #[error("failed to {verb}")]
    Store {
        /// Human verb phrase, e.g. "ban user".
        verb: &'static str,
        /// Backend error, logged but not displayed.
        #[source]
        source: StoreError,
    },
    /// Anything not classified above.
    #[error("{0}")]
    Unexpected(String),
}

fn retry_text(secs: &u64) -> String {
    format_retry_time(*secs)
}

/// Fallback message for unclassified failures with nothing safe to show.
pub const GENERIC_FAILURE: &str = "an unexpected error occurred";

impl GateError {
    /// Build a `Forbidden` error.
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// Build a `Validation` error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Wrap a store failure behind a "failed to <verb>" message.
    pub fn store(verb: &'static str, source: StoreError) -> Self {
        Self::Store { verb, source }
    }

    /// Expected, client-facing outcomes. These are never logged as faults.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Unauthenticated
                | Self::Forbidden(_)
                | Self::RateLimited { .. }
                | Self::Validation(_)
        )
    }

    /// Check if this error is due to a missing principal.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::Unauthenticated)
    }

    /// Check if this error is a role or hierarchy denial.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden(_))
    }

    /// Check if this error is a rate-limit denial.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Check if this error is an input validation failure.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this error came from the data store.
    pub fn is_store(&self) -> bool {
        matches!(self, Self::Store { .. })
    }

    /// Seconds to wait, if this is a rate-limit denial.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// Message safe to hand back to the caller.
    pub fn public_message(&self) -> String {
        match self {
            Self::Unexpected(msg) if msg.trim().is_empty() => GENERIC_FAILURE.to_string(),
            other => other.to_string(),
        }
    }
}

/// Uniform envelope returned by every gated action.
///
/// `success == true` implies `error` is absent; `success == false` implies `data` is absent.
/// Fields are private so the pairing cannot be broken after construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ActionResult<T> {
    /// Successful outcome carrying `data`.
    pub fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }

    /// Failed outcome carrying a caller-facing message.
    pub fn fail(error: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(error.into()) }
    }

    /// Whether the action ran to completion.
    pub fn success(&self) -> bool {
        self.success
    }

    /// Borrow the returned data, if any.
    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    /// Borrow the failure message, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Consume the envelope and return the data, if any.
    pub fn into_data(self) -> Option<T> {
        self.data
    }
}

impl<T> From<GateError> for ActionResult<T> {
    fn from(err: GateError) -> Self {
        Self::fail(err.public_message())
    }
}

impl<T> From<Result<T, GateError>> for ActionResult<T> {
    fn from(res: Result<T, GateError>) -> Self {
        match res {
            Ok(data) => Self::ok(data),
            Err(e) => e.into(),
        }
    }
}
