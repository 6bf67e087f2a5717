//! Quota Error Types
//!
//! This module defines all error types that can occur during quota operations.

use std::time::Duration;

use super::scope::{Scope, Target};

/// Result type alias for quota operations
pub type QuotaResult<T> = Result<T, QuotaError>;

/// Error types for quota operations
#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    /// Scope is not one of global, org, user, or not applicable to a target
    #[error("Invalid quota scope: {0}")]
    InvalidScope(String),

    /// Target has no configured defaults or fails the name predicate
    #[error("Invalid quota target: {0}")]
    InvalidTarget(String),

    /// Target is known but no usage reporter has been registered for it
    #[error("No usage reporter registered for target: {0}")]
    ReporterMissing(Target),

    /// A reporter or the custom limit store failed
    #[error("Usage report failed during {operation}: {source}")]
    UsageReportFailure {
        operation: String,
        #[source]
        source: anyhow::Error,
    },

    /// A reporter did not return usage for a scope it has a limit for
    #[error("No usage for target:{target} scope:{scope}")]
    ConsistencyViolation { target: Target, scope: Scope },

    /// The caller cancelled the operation
    #[error("Quota operation cancelled")]
    Cancelled,

    /// The operation deadline expired
    #[error("Quota operation timed out after {0:?}")]
    Timeout(Duration),

    /// Quotas are turned off in configuration
    #[error("Quotas not enabled")]
    Disabled,
}

impl QuotaError {
    /// Wrap a reporter failure for the given target
    pub fn reporter(target: &Target, source: anyhow::Error) -> Self {
        QuotaError::UsageReportFailure {
            operation: format!("usage report for {}", target),
            source,
        }
    }

    /// Wrap a custom limit store failure
    pub fn store(operation: &str, source: anyhow::Error) -> Self {
        QuotaError::UsageReportFailure {
            operation: format!("limit store {}", operation),
            source,
        }
    }

    /// True for cancellation and deadline expiry, as opposed to business errors
    pub fn is_cancellation(&self) -> bool {
        matches!(self, QuotaError::Cancelled | QuotaError::Timeout(_))
    }
}
