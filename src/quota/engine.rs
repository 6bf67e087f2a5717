//! Quota Engine
//!
//! Public entry point: lists quotas for a scope instance, answers whether a
//! target is at its quota, persists overrides and accepts late reporter
//! registrations.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::aggregator::UsageAggregator;
use super::context::QuotaContext;
use super::error::{QuotaError, QuotaResult};
use super::limits::{DefaultLimits, LimitResolver, ScopeLimits};
use super::model::{LimitKind, QuotaDto, RequestIdentity, UpdateQuotaCmd};
use super::registry::{ReporterRegistry, UsageMap, UsageReporter};
use super::scope::{Scope, ScopeParameters, Target};
use super::store::CustomLimitStore;
use crate::config::QuotaConfig;
use crate::metrics;

const INVALID_TARGET_LABEL: &str = "invalid";

/// Whether the engine enforces quotas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    /// Defaults loaded, all operations available
    Active,
    /// Quotas turned off; every query fails with `Disabled`
    Disabled,
}

/// Quota resolution and enforcement engine
///
/// Cheap to clone; clones share the registry, defaults and store.
#[derive(Clone)]
pub struct QuotaEngine {
    mode: EngineMode,
    resolver: LimitResolver,
    aggregator: UsageAggregator,
    usage_timeout: Option<Duration>,
}

impl QuotaEngine {
    /// Create an active engine over an explicit default table
    pub fn new(
        defaults: DefaultLimits,
        store: Arc<dyn CustomLimitStore>,
        registry: ReporterRegistry,
    ) -> Self {
        Self {
            mode: EngineMode::Active,
            resolver: LimitResolver::new(Arc::new(defaults), store),
            aggregator: UsageAggregator::new(registry),
            usage_timeout: None,
        }
    }

    /// Create an engine from configuration
    ///
    /// Builds a disabled engine when `config.enabled` is false.
    pub fn from_config(
        config: &QuotaConfig,
        store: Arc<dyn CustomLimitStore>,
        registry: ReporterRegistry,
    ) -> QuotaResult<Self> {
        if let Err(e) = metrics::init() {
            warn!(error = %e, "Failed to register quota metrics");
        }

        if !config.enabled {
            info!("Quotas disabled by configuration");
            return Ok(Self {
                mode: EngineMode::Disabled,
                ..Self::new(DefaultLimits::new(), store, registry)
            });
        }

        let defaults = DefaultLimits::from_config(config)?;
        info!(targets = defaults.len(), "Loaded default quota limits");

        Ok(Self::new(defaults, store, registry).with_usage_timeout(config.usage_timeout()))
    }

    /// Deadline applied to calls whose context carries none
    pub fn with_usage_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.usage_timeout = timeout;
        self
    }

    pub fn mode(&self) -> EngineMode {
        self.mode
    }

    pub fn is_enabled(&self) -> bool {
        self.mode == EngineMode::Active
    }

    pub fn defaults(&self) -> &DefaultLimits {
        self.resolver.defaults()
    }

    pub fn registry(&self) -> &ReporterRegistry {
        self.aggregator.registry()
    }

    fn ensure_active(&self) -> QuotaResult<()> {
        match self.mode {
            EngineMode::Active => Ok(()),
            EngineMode::Disabled => Err(QuotaError::Disabled),
        }
    }

    fn call_context(&self, ctx: &QuotaContext) -> QuotaContext {
        ctx.with_default_timeout(self.usage_timeout)
    }

    /// Register the usage reporter of a resource subsystem
    ///
    /// Accepted in every mode so subsystems can wire up unconditionally.
    pub fn add_reporter(
        &self,
        target: Target,
        reporter: Arc<dyn UsageReporter>,
    ) -> Option<Arc<dyn UsageReporter>> {
        self.aggregator.registry().register(target, reporter)
    }

    /// Limit and usage of every configured target for one scope instance
    ///
    /// All reporters are queried so the listing is one consistent snapshot;
    /// any failure fails the whole listing.
    pub async fn list_quotas(
        &self,
        ctx: &QuotaContext,
        scope: &str,
        scope_id: i64,
    ) -> QuotaResult<Vec<QuotaDto>> {
        self.ensure_active()?;
        let scope: Scope = scope.parse()?;
        let ctx = self.call_context(ctx);
        let params = ScopeParameters::for_scope(scope, scope_id);

        let result = self.build_listing(&ctx, scope, &params).await;

        metrics::QUOTA_LISTINGS_TOTAL
            .with_label_values(&[scope.as_str(), if result.is_ok() { "ok" } else { "error" }])
            .inc();
        result
    }

    async fn build_listing(
        &self,
        ctx: &QuotaContext,
        scope: Scope,
        params: &ScopeParameters,
    ) -> QuotaResult<Vec<QuotaDto>> {
        let limits = self.resolver.resolve_scope(ctx, scope, params).await?;
        let usage = self.aggregator.collect_all(ctx, params).await?;

        let quotas: Vec<QuotaDto> = limits
            .into_iter()
            .map(|(target, limit)| QuotaDto {
                org_id: params.org_id,
                user_id: params.user_id,
                used: usage.get(&target, scope),
                target: target.to_string(),
                limit,
            })
            .collect();

        debug!(%scope, count = quotas.len(), "Listed quotas");
        Ok(quotas)
    }

    /// Persist a custom limit for one org or one user
    ///
    /// Any signed value is accepted; negative means unlimited.
    pub async fn update_limit(&self, ctx: &QuotaContext, cmd: &UpdateQuotaCmd) -> QuotaResult<()> {
        self.ensure_active()?;
        let target = self.resolver.known_target(&cmd.target)?;

        let owner = cmd.owner();
        let scope = match (owner.org_id != 0, owner.user_id != 0) {
            (true, false) => Scope::Org,
            (false, true) => Scope::User,
            _ => {
                return Err(QuotaError::InvalidScope(
                    "custom limit needs exactly one of org or user".to_string(),
                ))
            }
        };

        let store = Arc::clone(self.resolver.store());
        self.call_context(ctx)
            .run(async {
                store
                    .set_custom_limit(&target, &owner, cmd.limit)
                    .await
                    .map_err(|e| QuotaError::store("update", e))
            })
            .await?;

        info!(
            target = %target,
            %scope,
            org_id = owner.org_id,
            user_id = owner.user_id,
            limit = cmd.limit,
            "Updated custom quota limit"
        );
        Ok(())
    }

    /// Whether `target` is at or over its quota in any applicable scope
    ///
    /// Without scope parameters only the global scope is checked.
    pub async fn is_quota_reached(
        &self,
        ctx: &QuotaContext,
        target: &str,
        params: Option<&ScopeParameters>,
    ) -> QuotaResult<bool> {
        self.ensure_active()?;
        let ctx = self.call_context(ctx);

        let result = self.check(&ctx, target, params).await;

        let outcome = match &result {
            Ok(true) => "reached",
            Ok(false) => "allowed",
            Err(_) => "error",
        };
        // Unvalidated names share one series
        let label = match &result {
            Err(QuotaError::InvalidTarget(_)) => INVALID_TARGET_LABEL,
            _ => target,
        };
        metrics::QUOTA_CHECKS_TOTAL
            .with_label_values(&[label, outcome])
            .inc();
        result
    }

    async fn check(
        &self,
        ctx: &QuotaContext,
        name: &str,
        params: Option<&ScopeParameters>,
    ) -> QuotaResult<bool> {
        let (target, limits) = self.resolver.resolve_target(ctx, name, params).await?;

        let params = params.copied().unwrap_or_default();
        let usage = self.aggregator.collect_target(ctx, &target, &params).await?;

        let reached = evaluate_limits(&target, &limits, Some(&usage))?;
        debug!(target = %target, reached, "Checked quota");
        Ok(reached)
    }

    /// Quota check driven by the identity of an incoming request
    ///
    /// No request at all (background jobs) is never limited. Anonymous
    /// requests are checked against global limits only.
    pub async fn quota_reached_for_request(
        &self,
        ctx: &QuotaContext,
        target: &str,
        identity: Option<&RequestIdentity>,
    ) -> QuotaResult<bool> {
        self.ensure_active()?;
        let Some(identity) = identity else {
            return Ok(false);
        };
        let params = identity.scope_params();
        self.is_quota_reached(ctx, target, params.as_ref()).await
    }

    /// Remove every custom limit owned by the user
    pub async fn delete_by_user(&self, ctx: &QuotaContext, user_id: i64) -> QuotaResult<()> {
        self.ensure_active()?;
        let store = Arc::clone(self.resolver.store());
        self.call_context(ctx)
            .run(async {
                store
                    .delete_by_user(user_id)
                    .await
                    .map_err(|e| QuotaError::store("delete", e))
            })
            .await?;

        info!(user_id, "Deleted user quota limits");
        Ok(())
    }
}

/// Compare resolved limits against reported usage, in scope order
///
/// Negative limits are skipped, a zero limit is reached immediately, and a
/// positive limit is reached when usage is at or above it. A positive limit
/// with no reported usage is a `ConsistencyViolation`.
pub fn evaluate_limits(
    target: &Target,
    limits: &ScopeLimits,
    usage: Option<&UsageMap>,
) -> QuotaResult<bool> {
    for (scope, limit) in limits {
        match LimitKind::of(*limit) {
            LimitKind::Unlimited => continue,
            LimitKind::Disabled => return Ok(true),
            LimitKind::Ceiling(ceiling) => {
                let used = usage.and_then(|u| u.get(scope)).ok_or_else(|| {
                    QuotaError::ConsistencyViolation {
                        target: target.clone(),
                        scope: *scope,
                    }
                })?;
                if *used >= ceiling {
                    return Ok(true);
                }
            }
        }
    }
    Ok(false)
}
