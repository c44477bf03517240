//! Screening strategies: pure predicates over one option contract.

pub mod predicates;
pub mod registry;

pub use registry::{Strategy, StrategyFn, StrategyRegistry};
