//! Usage Aggregator
//!
//! Fans out to every registered reporter at once and merges their results.
//! The first failure cancels the remaining reporters and is returned; a
//! partial snapshot is never handed out.

use std::collections::HashMap;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::context::QuotaContext;
use super::error::{QuotaError, QuotaResult};
use super::registry::{ReporterRegistry, UsageMap, UsageReporter};
use super::scope::{Scope, ScopeParameters, Target};
use crate::metrics;

/// Usage of every reported target, built fresh per call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Usage {
    targets: HashMap<Target, UsageMap>,
}

impl Usage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the usage reported for one target
    pub fn add(&mut self, target: Target, usage: UsageMap) {
        self.targets.insert(target, usage);
    }

    /// Reported count, or 0 when the target or scope was not reported
    pub fn get(&self, target: &Target, scope: Scope) -> i64 {
        self.targets
            .get(target)
            .and_then(|u| u.get(&scope))
            .copied()
            .unwrap_or(0)
    }

    /// Everything reported for one target
    pub fn target(&self, target: &Target) -> Option<&UsageMap> {
        self.targets.get(target)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Collects usage from the reporters in a registry
#[derive(Debug, Clone)]
pub struct UsageAggregator {
    registry: ReporterRegistry,
}

impl UsageAggregator {
    pub fn new(registry: ReporterRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ReporterRegistry {
        &self.registry
    }

    /// Invoke every registered reporter concurrently
    pub async fn collect_all(
        &self,
        ctx: &QuotaContext,
        params: &ScopeParameters,
    ) -> QuotaResult<Usage> {
        let snapshot = self.registry.snapshot();
        debug!(reporters = snapshot.len(), ?params, "Collecting usage from all reporters");

        // Cancelling the group stops siblings without touching the caller's context
        let group = ctx.child();
        let mut tasks = JoinSet::new();

        for (target, reporter) in snapshot {
            let task_ctx = group.clone();
            let params = *params;
            tasks.spawn(async move {
                let result = invoke(&task_ctx, &target, reporter.as_ref(), &params).await;
                (target, result)
            });
        }

        let result = ctx
            .run(async {
                let mut usage = Usage::new();
                while let Some(joined) = tasks.join_next().await {
                    let (target, reported) = joined.map_err(|e| QuotaError::UsageReportFailure {
                        operation: "usage report task".to_string(),
                        source: e.into(),
                    })?;
                    usage.add(target, reported?);
                }
                Ok(usage)
            })
            .await;

        if let Err(err) = &result {
            debug!(error = %err, remaining = tasks.len(), "Aborting outstanding reporters");
            group.cancel();
            tasks.abort_all();
        }

        result
    }

    /// Invoke only the reporter registered for `target`
    pub async fn collect_target(
        &self,
        ctx: &QuotaContext,
        target: &Target,
        params: &ScopeParameters,
    ) -> QuotaResult<UsageMap> {
        let reporter = self
            .registry
            .lookup(target)
            .ok_or_else(|| QuotaError::ReporterMissing(target.clone()))?;

        invoke(ctx, target, reporter.as_ref(), params).await
    }
}

async fn invoke(
    ctx: &QuotaContext,
    target: &Target,
    reporter: &dyn UsageReporter,
    params: &ScopeParameters,
) -> QuotaResult<UsageMap> {
    let started = Instant::now();

    let result = ctx
        .run(async {
            reporter
                .usage(ctx, params)
                .await
                .map_err(|e| QuotaError::reporter(target, e))
        })
        .await;

    metrics::REPORTER_DURATION_SECONDS
        .with_label_values(&[target.as_str()])
        .observe(started.elapsed().as_secs_f64());

    if let Err(err) = &result {
        if !err.is_cancellation() {
            metrics::REPORTER_ERRORS_TOTAL
                .with_label_values(&[target.as_str()])
                .inc();
            warn!(target = %target, error = %err, "Usage reporter failed");
        }
    }

    result
}
