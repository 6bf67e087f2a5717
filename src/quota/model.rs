//! Quota Records
//!
//! Values exchanged with callers of the engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::scope::{Scope, ScopeParameters, Target};

/// Limits keyed by target, then scope
pub type Limits = HashMap<Target, HashMap<Scope, i64>>;

/// How a raw limit value is enforced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    /// Negative limit: never reached
    Unlimited,
    /// Zero: the resource may not be created at all
    Disabled,
    /// Positive ceiling compared against usage
    Ceiling(i64),
}

impl LimitKind {
    pub fn of(limit: i64) -> Self {
        match limit {
            l if l < 0 => LimitKind::Unlimited,
            0 => LimitKind::Disabled,
            l => LimitKind::Ceiling(l),
        }
    }
}

/// Resolved limit and observed usage of one target for one scope instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaDto {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub org_id: i64,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub user_id: i64,

    pub target: String,

    pub limit: i64,

    pub used: i64,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

/// Request to persist a custom limit for one org or one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateQuotaCmd {
    pub target: String,

    pub limit: i64,

    #[serde(skip)]
    pub org_id: i64,

    #[serde(skip)]
    pub user_id: i64,
}

impl UpdateQuotaCmd {
    /// Override for an organization
    pub fn for_org(org_id: i64, target: impl Into<String>, limit: i64) -> Self {
        Self {
            target: target.into(),
            limit,
            org_id,
            user_id: 0,
        }
    }

    /// Override for a user
    pub fn for_user(user_id: i64, target: impl Into<String>, limit: i64) -> Self {
        Self {
            target: target.into(),
            limit,
            org_id: 0,
            user_id,
        }
    }

    /// Owner of the override
    pub fn owner(&self) -> ScopeParameters {
        ScopeParameters::new(self.org_id, self.user_id)
    }
}

/// Identity of the request a quota check is made for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestIdentity {
    pub org_id: i64,
    pub user_id: i64,
    pub is_signed_in: bool,
}

impl RequestIdentity {
    pub fn signed_in(org_id: i64, user_id: i64) -> Self {
        Self {
            org_id,
            user_id,
            is_signed_in: true,
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Scope parameters for a quota check; `None` means global only
    pub fn scope_params(&self) -> Option<ScopeParameters> {
        self.is_signed_in
            .then(|| ScopeParameters::new(self.org_id, self.user_id))
    }
}
