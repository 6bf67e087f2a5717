// Property-based tests with Proptest
use super::*;
use proptest::prelude::*;
use std::collections::HashMap;

fn scope() -> impl Strategy<Value = Scope> {
    prop_oneof![Just(Scope::Global), Just(Scope::Org), Just(Scope::User)]
}

fn scope_map() -> impl Strategy<Value = HashMap<Scope, i64>> {
    prop::collection::hash_map(scope(), -5i64..50, 0..=3)
}

proptest! {
    #[test]
    fn prop_override_wins_per_scope(defaults in scope_map(), custom in scope_map()) {
        let merged = limits::merge_overrides(&defaults, Some(&custom));

        prop_assert_eq!(merged.len(), defaults.len());
        for (scope, default) in &defaults {
            let expected = custom.get(scope).copied().unwrap_or(*default);
            prop_assert_eq!(merged.get(scope), Some(&expected));
        }
    }

    #[test]
    fn prop_threshold(limit in 1i64..1000, used in 0i64..2000, scope in scope()) {
        let limits: ScopeLimits = [(scope, limit)].into_iter().collect();
        let usage: UsageMap = HashMap::from([(scope, used)]);

        let reached = evaluate_limits(&Target::dashboard(), &limits, Some(&usage)).unwrap();
        prop_assert_eq!(reached, used >= limit);
    }

    #[test]
    fn prop_negative_never_reached(limit in i64::MIN..0, used in 0i64..i64::MAX, scope in scope()) {
        let limits: ScopeLimits = [(scope, limit)].into_iter().collect();
        let usage: UsageMap = HashMap::from([(scope, used)]);

        prop_assert!(!evaluate_limits(&Target::file(), &limits, Some(&usage)).unwrap());
        prop_assert!(!evaluate_limits(&Target::file(), &limits, None).unwrap());
    }

    #[test]
    fn prop_zero_always_reached(others in scope_map(), scope in scope()) {
        let mut limits: ScopeLimits = others.into_iter().collect();
        limits.insert(scope, 0);
        let usage: UsageMap = Scope::ALL.iter().map(|s| (*s, 0)).collect();

        prop_assert!(evaluate_limits(&Target::org(), &limits, Some(&usage)).unwrap());
    }

    #[test]
    fn prop_more_usage_stays_reached(limits in scope_map(), used in 0i64..60, extra in 0i64..60) {
        let limits: ScopeLimits = limits.into_iter().collect();
        let low: UsageMap = Scope::ALL.iter().map(|s| (*s, used)).collect();
        let high: UsageMap = Scope::ALL.iter().map(|s| (*s, used + extra)).collect();

        let before = evaluate_limits(&Target::api_key(), &limits, Some(&low)).unwrap();
        let after = evaluate_limits(&Target::api_key(), &limits, Some(&high)).unwrap();
        prop_assert!(!before || after);
    }

    #[test]
    fn prop_valid_target_names_accepted(name in "[a-z][a-z0-9_]{0,63}") {
        prop_assert!(Target::new(name.as_str()).is_ok());
    }

    #[test]
    fn prop_uppercase_target_names_rejected(name in "[A-Z][a-zA-Z0-9_]{0,20}") {
        prop_assert!(Target::new(name.as_str()).is_err());
    }
}
