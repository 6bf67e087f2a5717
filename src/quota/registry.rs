//! Usage Reporter Registry
//!
//! Resource subsystems register one usage reporter per target, at any point
//! in the process lifetime. The engine looks reporters up for single-target
//! checks and snapshots the whole registry for listings.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, warn};

use super::context::QuotaContext;
use super::scope::{Scope, ScopeParameters, Target};
use crate::metrics;

/// Usage counts for one target, keyed by scope
pub type UsageMap = HashMap<Scope, i64>;

/// Reports current usage for a single target
///
/// Implementations must be side-effect free and must return a count for
/// every scope the target has a limit in.
#[async_trait]
pub trait UsageReporter: Send + Sync {
    async fn usage(&self, ctx: &QuotaContext, params: &ScopeParameters) -> anyhow::Result<UsageMap>;
}

/// Adapter turning an async closure into a [`UsageReporter`]
pub struct FnReporter<F> {
    f: F,
}

impl<F> FnReporter<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> UsageReporter for FnReporter<F>
where
    F: Fn(ScopeParameters) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<UsageMap>> + Send + 'static,
{
    async fn usage(&self, _ctx: &QuotaContext, params: &ScopeParameters) -> anyhow::Result<UsageMap> {
        (self.f)(*params).await
    }
}

/// Wrap an async closure as a shareable reporter
///
/// The closure only receives the scope parameters, not the [`QuotaContext`].
/// It cannot poll for cancellation itself; on cancellation or deadline expiry
/// the engine drops its future at the next await point. Reporters that need
/// the context (to pass a deadline to a database client, say) implement
/// [`UsageReporter`] directly.
///
/// # Example
///
/// ```
/// use std::collections::HashMap;
/// use quota_engine::quota::{reporter_fn, Scope};
///
/// let reporter = reporter_fn(|_params| async move {
///     Ok(HashMap::from([(Scope::Global, 3)]))
/// });
/// # let _ = reporter;
/// ```
pub fn reporter_fn<F, Fut>(f: F) -> Arc<dyn UsageReporter>
where
    F: Fn(ScopeParameters) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<UsageMap>> + Send + 'static,
{
    Arc::new(FnReporter::new(f))
}

/// Concurrency-safe map from target to its usage reporter
///
/// Re-registering a target replaces the previous reporter (last write wins);
/// the replaced reporter is handed back to the caller.
#[derive(Clone, Default)]
pub struct ReporterRegistry {
    reporters: Arc<RwLock<HashMap<Target, Arc<dyn UsageReporter>>>>,
}

impl ReporterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    // Entries are whole Arcs, so a poisoned lock never exposes a half-written entry.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Target, Arc<dyn UsageReporter>>> {
        self.reporters.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Target, Arc<dyn UsageReporter>>> {
        self.reporters.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a reporter, returning the one it replaced
    pub fn register(
        &self,
        target: Target,
        reporter: Arc<dyn UsageReporter>,
    ) -> Option<Arc<dyn UsageReporter>> {
        let mut reporters = self.write();
        let previous = reporters.insert(target.clone(), reporter);
        metrics::REGISTERED_REPORTERS.set(reporters.len() as i64);
        drop(reporters);

        if previous.is_some() {
            warn!(target = %target, "Usage reporter replaced by a later registration");
        } else {
            info!(target = %target, "Registered usage reporter");
        }
        previous
    }

    /// Look up the reporter for a target
    pub fn lookup(&self, target: &Target) -> Option<Arc<dyn UsageReporter>> {
        self.read().get(target).cloned()
    }

    /// Point-in-time copy of all registered reporters
    pub fn snapshot(&self) -> Vec<(Target, Arc<dyn UsageReporter>)> {
        self.read()
            .iter()
            .map(|(target, reporter)| (target.clone(), Arc::clone(reporter)))
            .collect()
    }

    /// Registered targets, sorted by name
    pub fn targets(&self) -> Vec<Target> {
        let mut targets: Vec<Target> = self.read().keys().cloned().collect();
        targets.sort();
        targets
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

impl fmt::Debug for ReporterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReporterRegistry")
            .field("targets", &self.targets())
            .finish()
    }
}
