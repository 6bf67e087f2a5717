//! Quota Resolution and Enforcement
//!
//! Decides whether a tenant (the whole server, an organization or a user)
//! may create more of a resource, and reports limit and usage per scope.
//!
//! # Features
//!
//! - Default limits per (target, scope) fixed at startup
//! - Per-org and per-user overrides read from a pluggable store
//! - Usage reporters contributed by resource subsystems at runtime
//! - Concurrent, fail-fast usage collection bounded by a caller context
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Quota Engine                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────┐      ┌──────────────────────┐     │
//! │  │    Limit Resolver    │      │   Usage Aggregator   │     │
//! │  │ defaults + overrides │      │  concurrent fan-out  │     │
//! │  └──────────┬───────────┘      └──────────┬───────────┘     │
//! ├─────────────┼─────────────────────────────┼─────────────────┤
//! │  ┌──────────▼───────────┐      ┌──────────▼───────────┐     │
//! │  │  Custom Limit Store  │      │  Reporter Registry   │     │
//! │  └──────────────────────┘      └──────────────────────┘     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod aggregator;
pub mod context;
pub mod engine;
pub mod error;
pub mod limits;
pub mod model;
pub mod registry;
pub mod scope;
pub mod store;

#[cfg(test)]
mod proptests;

pub use aggregator::{Usage, UsageAggregator};
pub use context::QuotaContext;
pub use engine::{evaluate_limits, EngineMode, QuotaEngine};
pub use error::{QuotaError, QuotaResult};
pub use limits::{DefaultLimits, LimitResolver, ScopeLimits};
pub use model::{LimitKind, Limits, QuotaDto, RequestIdentity, UpdateQuotaCmd};
pub use registry::{reporter_fn, ReporterRegistry, UsageMap, UsageReporter};
pub use scope::{Scope, ScopeParameters, Target};
pub use store::{CustomLimitStore, InMemoryLimitStore};
