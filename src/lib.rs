//! Quota Engine Library
//!
//! Resolves per-scope resource limits from configured defaults and stored
//! overrides, collects live usage from pluggable reporters, and answers
//! whether a tenant may create more of a resource.

pub mod config;
pub mod metrics;
pub mod quota;
