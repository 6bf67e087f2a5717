//! Default Limits and Limit Resolution
//!
//! Default limits are fixed at startup from configuration. Custom limits are
//! read from the store on every request and override defaults scope by scope.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use super::context::QuotaContext;
use super::error::{QuotaError, QuotaResult};
use super::model::Limits;
use super::scope::{Scope, ScopeParameters, Target};
use super::store::CustomLimitStore;
use crate::config::QuotaConfig;

/// Limits per scope for one target, in scope order
pub type ScopeLimits = BTreeMap<Scope, i64>;

/// Immutable default limit table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultLimits {
    limits: BTreeMap<Target, HashMap<Scope, i64>>,
}

impl DefaultLimits {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one default, builder style
    pub fn with(mut self, target: Target, scope: Scope, limit: i64) -> Self {
        self.limits.entry(target).or_default().insert(scope, limit);
        self
    }

    /// Build the table from quota configuration
    ///
    /// Alert rule limits are forced to 0 (disabled) when alerting is off.
    pub fn from_config(config: &QuotaConfig) -> QuotaResult<Self> {
        let (org_alert_rule, global_alert_rule) = if config.alerting_enabled {
            (config.org_alert_rule, config.global_alert_rule)
        } else {
            (0, 0)
        };

        let mut table = Self::new()
            .with(Target::user(), Scope::Global, config.global_user)
            .with(Target::org(), Scope::Global, config.global_org)
            .with(Target::org(), Scope::Org, config.org_user)
            .with(Target::org(), Scope::User, config.user_org)
            .with(Target::dashboard(), Scope::Global, config.global_dashboard)
            .with(Target::dashboard(), Scope::Org, config.org_dashboard)
            .with(Target::data_source(), Scope::Global, config.global_data_source)
            .with(Target::data_source(), Scope::Org, config.org_data_source)
            .with(Target::api_key(), Scope::Global, config.global_api_key)
            .with(Target::api_key(), Scope::Org, config.org_api_key)
            .with(Target::session(), Scope::Global, config.global_session)
            .with(Target::alert_rule(), Scope::Global, global_alert_rule)
            .with(Target::alert_rule(), Scope::Org, org_alert_rule)
            .with(Target::file(), Scope::Global, config.global_file);

        for (name, scopes) in &config.custom_targets {
            let target = Target::new(name.as_str())?;
            for (scope, limit) in scopes {
                table = table.with(target.clone(), scope.parse()?, *limit);
            }
        }

        Ok(table)
    }

    /// Per-scope defaults for a target
    pub fn get(&self, target: &Target) -> Option<&HashMap<Scope, i64>> {
        self.limits.get(target)
    }

    /// Default for one (target, scope) pair
    pub fn limit(&self, target: &Target, scope: Scope) -> Option<i64> {
        self.limits.get(target)?.get(&scope).copied()
    }

    pub fn contains(&self, target: &Target) -> bool {
        self.limits.contains_key(target)
    }

    /// Configured targets, sorted by name
    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.limits.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Target, &HashMap<Scope, i64>)> {
        self.limits.iter()
    }

    pub fn len(&self) -> usize {
        self.limits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }
}

/// Overlay custom values on defaults. Scopes missing from the defaults are
/// not visible for the target, so custom values for them are dropped.
pub fn merge_overrides(
    defaults: &HashMap<Scope, i64>,
    custom: Option<&HashMap<Scope, i64>>,
) -> ScopeLimits {
    defaults
        .iter()
        .map(|(scope, default)| {
            let limit = custom
                .and_then(|c| c.get(scope))
                .copied()
                .unwrap_or(*default);
            (*scope, limit)
        })
        .collect()
}

/// Resolves effective limits from defaults and stored overrides
#[derive(Clone)]
pub struct LimitResolver {
    defaults: Arc<DefaultLimits>,
    store: Arc<dyn CustomLimitStore>,
}

impl LimitResolver {
    pub fn new(defaults: Arc<DefaultLimits>, store: Arc<dyn CustomLimitStore>) -> Self {
        Self { defaults, store }
    }

    pub fn defaults(&self) -> &DefaultLimits {
        &self.defaults
    }

    pub fn store(&self) -> &Arc<dyn CustomLimitStore> {
        &self.store
    }

    /// Configured target by name, or `InvalidTarget`
    pub fn known_target(&self, name: &str) -> QuotaResult<Target> {
        let target = Target::new(name)?;
        if self.defaults.contains(&target) {
            Ok(target)
        } else {
            Err(QuotaError::InvalidTarget(name.to_string()))
        }
    }

    /// Fetch stored overrides for the given owners
    pub async fn custom_limits(
        &self,
        ctx: &QuotaContext,
        params: &ScopeParameters,
    ) -> QuotaResult<Limits> {
        let store = Arc::clone(&self.store);
        ctx.run(async move {
            store
                .get_custom_limits(params)
                .await
                .map_err(|e| QuotaError::store("get", e))
        })
        .await
    }

    /// Effective limits of one target for the scopes that apply to `params`
    ///
    /// The global scope always applies; `org` and `user` apply only when the
    /// matching id is set. Without parameters only the global scope is
    /// returned and the store is not consulted.
    pub async fn resolve_target(
        &self,
        ctx: &QuotaContext,
        name: &str,
        params: Option<&ScopeParameters>,
    ) -> QuotaResult<(Target, ScopeLimits)> {
        let target = self.known_target(name)?;
        let defaults = self
            .defaults
            .get(&target)
            .ok_or_else(|| QuotaError::InvalidTarget(name.to_string()))?;

        let params = match params {
            Some(p) if !p.is_empty() => p,
            _ => {
                let global: ScopeLimits = defaults
                    .get(&Scope::Global)
                    .map(|limit| (Scope::Global, *limit))
                    .into_iter()
                    .collect();
                debug!(target = %target, "Resolved global-only limits");
                return Ok((target, global));
            }
        };

        let custom = self.custom_limits(ctx, params).await?;
        let mut limits = merge_overrides(defaults, custom.get(&target));
        limits.retain(|scope, _| match scope {
            Scope::Global => true,
            Scope::Org => params.org_id != 0,
            Scope::User => params.user_id != 0,
        });

        debug!(target = %target, ?limits, "Resolved target limits");
        Ok((target, limits))
    }

    /// Effective limit of every configured target for one scope
    ///
    /// Fails with `InvalidScope` if any target has no default for `scope`.
    pub async fn resolve_scope(
        &self,
        ctx: &QuotaContext,
        scope: Scope,
        params: &ScopeParameters,
    ) -> QuotaResult<Vec<(Target, i64)>> {
        let custom = self.custom_limits(ctx, params).await?;

        self.defaults
            .iter()
            .map(|(target, defaults)| {
                let default = defaults.get(&scope).ok_or_else(|| {
                    QuotaError::InvalidScope(format!("{} (not applicable to {})", scope, target))
                })?;
                let limit = custom
                    .get(target)
                    .and_then(|c| c.get(&scope))
                    .copied()
                    .unwrap_or(*default);
                Ok((target.clone(), limit))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::store::InMemoryLimitStore;

    fn resolver(defaults: DefaultLimits) -> (LimitResolver, InMemoryLimitStore) {
        let store = InMemoryLimitStore::new();
        let resolver = LimitResolver::new(Arc::new(defaults), Arc::new(store.clone()));
        (resolver, store)
    }

    #[test]
    fn test_defaults_from_config() {
        let config = QuotaConfig::default();
        let defaults = DefaultLimits::from_config(&config).unwrap();

        assert_eq!(defaults.len(), 8);
        assert_eq!(defaults.limit(&Target::org(), Scope::Org), Some(10));
        assert_eq!(defaults.limit(&Target::org(), Scope::User), Some(10));
        assert_eq!(defaults.limit(&Target::dashboard(), Scope::Global), Some(-1));
        assert_eq!(defaults.limit(&Target::session(), Scope::Org), None);
        assert_eq!(defaults.limit(&Target::alert_rule(), Scope::Org), Some(100));
    }

    #[test]
    fn test_alert_rules_disabled_without_alerting() {
        let config = QuotaConfig {
            alerting_enabled: false,
            ..QuotaConfig::default()
        };
        let defaults = DefaultLimits::from_config(&config).unwrap();
        assert_eq!(defaults.limit(&Target::alert_rule(), Scope::Org), Some(0));
        assert_eq!(defaults.limit(&Target::alert_rule(), Scope::Global), Some(0));
    }

    #[test]
    fn test_custom_targets_from_config() {
        let mut config = QuotaConfig::default();
        config.custom_targets.insert(
            "widget".to_string(),
            HashMap::from([("org".to_string(), 5), ("global".to_string(), -1)]),
        );
        let defaults = DefaultLimits::from_config(&config).unwrap();
        let widget = Target::new("widget").unwrap();
        assert_eq!(defaults.limit(&widget, Scope::Org), Some(5));

        config.custom_targets.insert(
            "gadget".to_string(),
            HashMap::from([("team".to_string(), 5)]),
        );
        assert!(matches!(
            DefaultLimits::from_config(&config),
            Err(QuotaError::InvalidScope(_))
        ));
    }

    #[test]
    fn test_merge_overrides() {
        let defaults = HashMap::from([(Scope::Global, -1), (Scope::Org, 10)]);
        let custom = HashMap::from([(Scope::Org, 3), (Scope::User, 1)]);

        let merged = merge_overrides(&defaults, Some(&custom));
        assert_eq!(merged.get(&Scope::Global), Some(&-1));
        assert_eq!(merged.get(&Scope::Org), Some(&3));
        // Custom-only scopes are ignored
        assert_eq!(merged.get(&Scope::User), None);

        assert_eq!(merge_overrides(&defaults, None).get(&Scope::Org), Some(&10));
    }

    #[tokio::test]
    async fn test_resolve_target_unknown() {
        let (resolver, _) = resolver(DefaultLimits::new().with(Target::dashboard(), Scope::Org, 10));
        let ctx = QuotaContext::new();

        let err = resolver
            .resolve_target(&ctx, "widget", Some(&ScopeParameters::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, QuotaError::InvalidTarget(ref t) if t == "widget"));

        let err = resolver.resolve_target(&ctx, "Bad Name", None).await.unwrap_err();
        assert!(matches!(err, QuotaError::InvalidTarget(_)));
    }

    #[tokio::test]
    async fn test_resolve_target_with_override() {
        let (resolver, store) = resolver(
            DefaultLimits::new()
                .with(Target::dashboard(), Scope::Global, -1)
                .with(Target::dashboard(), Scope::Org, 10),
        );
        store
            .set_custom_limit(&Target::dashboard(), &ScopeParameters::for_org(5), 2)
            .await
            .unwrap();
        let ctx = QuotaContext::new();

        let (_, limits) = resolver
            .resolve_target(&ctx, "dashboard", Some(&ScopeParameters::for_org(5)))
            .await
            .unwrap();
        assert_eq!(limits.get(&Scope::Org), Some(&2));
        assert_eq!(limits.get(&Scope::Global), Some(&-1));

        let (_, limits) = resolver
            .resolve_target(&ctx, "dashboard", Some(&ScopeParameters::for_org(6)))
            .await
            .unwrap();
        assert_eq!(limits.get(&Scope::Org), Some(&10));
    }

    #[tokio::test]
    async fn test_resolve_target_without_params_is_global_only() {
        let (resolver, _) = resolver(
            DefaultLimits::new()
                .with(Target::org(), Scope::Global, 100)
                .with(Target::org(), Scope::Org, 10)
                .with(Target::org(), Scope::User, 10),
        );
        let ctx = QuotaContext::new();

        let (_, limits) = resolver.resolve_target(&ctx, "org", None).await.unwrap();
        assert_eq!(limits.len(), 1);
        assert_eq!(limits.get(&Scope::Global), Some(&100));
    }

    #[tokio::test]
    async fn test_resolve_target_drops_unset_owner_scopes() {
        let (resolver, _) = resolver(
            DefaultLimits::new()
                .with(Target::org(), Scope::Global, -1)
                .with(Target::org(), Scope::Org, 10)
                .with(Target::org(), Scope::User, 10),
        );
        let ctx = QuotaContext::new();

        let (_, limits) = resolver
            .resolve_target(&ctx, "org", Some(&ScopeParameters::for_user(4)))
            .await
            .unwrap();
        assert_eq!(
            limits.keys().copied().collect::<Vec<_>>(),
            vec![Scope::Global, Scope::User]
        );
    }

    #[tokio::test]
    async fn test_resolve_scope_missing_scope_fails() {
        let (resolver, _) = resolver(
            DefaultLimits::new()
                .with(Target::dashboard(), Scope::Org, 10)
                .with(Target::session(), Scope::Global, -1),
        );
        let ctx = QuotaContext::new();

        let err = resolver
            .resolve_scope(&ctx, Scope::Org, &ScopeParameters::for_org(1))
            .await
            .unwrap_err();
        assert!(matches!(err, QuotaError::InvalidScope(_)));
    }

    #[tokio::test]
    async fn test_resolve_scope_applies_overrides() {
        let (resolver, store) = resolver(
            DefaultLimits::new()
                .with(Target::dashboard(), Scope::Org, 10)
                .with(Target::api_key(), Scope::Org, 5),
        );
        store
            .set_custom_limit(&Target::api_key(), &ScopeParameters::for_org(1), 50)
            .await
            .unwrap();
        let ctx = QuotaContext::new();

        let resolved = resolver
            .resolve_scope(&ctx, Scope::Org, &ScopeParameters::for_org(1))
            .await
            .unwrap();
        assert_eq!(
            resolved,
            vec![(Target::api_key(), 50), (Target::dashboard(), 10)]
        );
    }
}
