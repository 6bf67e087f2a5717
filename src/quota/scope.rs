//! Scope and Target Model
//!
//! Scopes are the closed set of granularities a limit applies at. Targets are
//! the open set of resource kinds a limit is defined over.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::QuotaError;

/// Longest accepted target name, in bytes
pub const MAX_TARGET_LEN: usize = 64;

/// Target names known to the engine out of the box
pub const BUILTIN_TARGETS: [&str; 8] = [
    "org",
    "user",
    "data_source",
    "dashboard",
    "api_key",
    "session",
    "alert_rule",
    "file",
];

/// Granularity at which a quota limit applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Whole installation
    Global,
    /// A single organization
    Org,
    /// A single user
    User,
}

impl Scope {
    /// All scopes, in evaluation order
    pub const ALL: [Scope; 3] = [Scope::Global, Scope::Org, Scope::User];

    /// Wire name of the scope
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::Org => "org",
            Scope::User => "user",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = QuotaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global" => Ok(Scope::Global),
            "org" => Ok(Scope::Org),
            "user" => Ok(Scope::User),
            other => Err(QuotaError::InvalidScope(other.to_string())),
        }
    }
}

/// Resource kind a quota is defined over (e.g. `dashboard`, `api_key`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Target(String);

impl Target {
    /// Create a target, checking the name predicate
    pub fn new(name: impl Into<String>) -> Result<Self, QuotaError> {
        let name = name.into();
        if is_valid_target_name(&name) {
            Ok(Self(name))
        } else {
            Err(QuotaError::InvalidTarget(name))
        }
    }

    fn builtin(name: &'static str) -> Self {
        Self(name.to_string())
    }

    pub fn org() -> Self {
        Self::builtin("org")
    }

    pub fn user() -> Self {
        Self::builtin("user")
    }

    pub fn data_source() -> Self {
        Self::builtin("data_source")
    }

    pub fn dashboard() -> Self {
        Self::builtin("dashboard")
    }

    pub fn api_key() -> Self {
        Self::builtin("api_key")
    }

    pub fn session() -> Self {
        Self::builtin("session")
    }

    pub fn alert_rule() -> Self {
        Self::builtin("alert_rule")
    }

    pub fn file() -> Self {
        Self::builtin("file")
    }

    /// Name of the target
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is one of the built-in targets
    pub fn is_builtin(&self) -> bool {
        BUILTIN_TARGETS.contains(&self.0.as_str())
    }
}

/// Lowercase ASCII identifier: a letter, then letters, digits or `_`
pub fn is_valid_target_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    name.len() <= MAX_TARGET_LEN
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Target {
    type Err = QuotaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Target {
    type Error = QuotaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Target> for String {
    fn from(target: Target) -> Self {
        target.0
    }
}

/// Owner identifiers a quota query is made for. Zero means "not applicable".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeParameters {
    pub org_id: i64,
    pub user_id: i64,
}

impl ScopeParameters {
    pub fn new(org_id: i64, user_id: i64) -> Self {
        Self { org_id, user_id }
    }

    pub fn for_org(org_id: i64) -> Self {
        Self::new(org_id, 0)
    }

    pub fn for_user(user_id: i64) -> Self {
        Self::new(0, user_id)
    }

    /// Parameters addressing a single scope instance, as used by listings
    pub fn for_scope(scope: Scope, id: i64) -> Self {
        match scope {
            Scope::Global => Self::default(),
            Scope::Org => Self::for_org(id),
            Scope::User => Self::for_user(id),
        }
    }

    /// True when neither an org nor a user is set
    pub fn is_empty(&self) -> bool {
        self.org_id == 0 && self.user_id == 0
    }
}
