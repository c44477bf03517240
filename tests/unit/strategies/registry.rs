//! Unit tests for the strategy registry

use optscreen::error::StrategyError;
use optscreen::models::{MarketParameter, OptionChainSnapshot, StockMetadata};
use optscreen::strategies::{Strategy, StrategyRegistry};

fn always(
    _s: &OptionChainSnapshot,
    _m: &MarketParameter,
    _st: &StockMetadata,
) -> Result<bool, StrategyError> {
    Ok(true)
}

#[test]
fn builtin_registry_has_every_named_strategy() {
    let registry = StrategyRegistry::builtin();
    assert_eq!(
        registry.names(),
        vec![
            "find_cheap_weeklies",
            "covered_call",
            "cash_secured_put",
            "test_screener"
        ]
    );
    assert!(registry.contains("covered_call"));
    assert!(!registry.contains("Covered_Call"));
    assert!(registry.get("iron_condor").is_none());
    assert_eq!(StrategyRegistry::default().names(), registry.names());
}

#[test]
fn custom_registry_only_knows_its_own_strategies() {
    let registry = StrategyRegistry::with_strategies(vec![Strategy::new(
        "everything",
        "matches every row",
        always,
    )]);
    assert_eq!(registry.names(), vec!["everything"]);
    assert!(!registry.contains("covered_call"));
}

#[test]
fn strategies_serialize_without_predicate() {
    let registry = StrategyRegistry::builtin();
    let value = serde_json::to_value(registry.all()).unwrap();
    let first = &value[0];
    assert_eq!(first["name"], "find_cheap_weeklies");
    assert!(first["description"].is_string());
    assert_eq!(first.as_object().unwrap().len(), 2);
}
