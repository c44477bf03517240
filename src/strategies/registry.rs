//! Name → predicate table, built once at startup.

use super::predicates;
use crate::error::StrategyError;
use crate::models::{MarketParameter, OptionChainSnapshot, StockMetadata};
use serde::Serialize;

pub type StrategyFn =
    fn(&OptionChainSnapshot, &MarketParameter, &StockMetadata) -> Result<bool, StrategyError>;

#[derive(Clone, Copy, Serialize)]
pub struct Strategy {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(skip)]
    predicate: StrategyFn,
}

impl Strategy {
    pub const fn new(name: &'static str, description: &'static str, predicate: StrategyFn) -> Self {
        Self {
            name,
            description,
            predicate,
        }
    }

    pub fn matches(
        &self,
        snapshot: &OptionChainSnapshot,
        market: &MarketParameter,
        stock: &StockMetadata,
    ) -> Result<bool, StrategyError> {
        (self.predicate)(snapshot, market, stock)
    }
}

impl std::fmt::Debug for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategy")
            .field("name", &self.name)
            .finish()
    }
}

const BUILTIN: &[Strategy] = &[
    Strategy::new(
        "find_cheap_weeklies",
        "Contracts expiring within 10 days with a bid and a midpoint under $1.00",
        predicates::find_cheap_weeklies,
    ),
    Strategy::new(
        "covered_call",
        "OTM calls (delta 0.15-0.40, 7-45 DTE) yielding more than rate plus dividend",
        predicates::covered_call,
    ),
    Strategy::new(
        "cash_secured_put",
        "OTM puts (delta -0.40 to -0.15, 7-45 DTE) yielding more than the risk-free rate",
        predicates::cash_secured_put,
    ),
    Strategy::new(
        "test_screener",
        "Diagnostic: every contract with a live bid",
        predicates::test_screener,
    ),
];

/// Immutable strategy lookup shared by the gateway and the screening engine.
#[derive(Debug, Clone)]
pub struct StrategyRegistry {
    strategies: Vec<Strategy>,
}

impl StrategyRegistry {
    pub fn builtin() -> Self {
        Self {
            strategies: BUILTIN.to_vec(),
        }
    }

    /// Registry with an explicit set of strategies.
    pub fn with_strategies(strategies: Vec<Strategy>) -> Self {
        Self { strategies }
    }

    pub fn get(&self, name: &str) -> Option<&Strategy> {
        self.strategies.iter().find(|s| s.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name).collect()
    }

    pub fn all(&self) -> &[Strategy] {
        &self.strategies
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
