//! Built-in screening predicates.
//!
//! Each predicate is a pure function of one snapshot and the market context.
//! A missing quote or Greek means "no match"; a computation that produces a
//! non-finite value is an error and aborts the ticker.

use crate::error::StrategyError;
use crate::models::{MarketParameter, OptionChainSnapshot, OptionType, StockMetadata};

const CHEAP_WEEKLY_MAX_DAYS: i64 = 10;
const CHEAP_WEEKLY_MAX_MID: f64 = 1.00;

const INCOME_MIN_DAYS: i64 = 7;
const INCOME_MAX_DAYS: i64 = 45;
const INCOME_MIN_ABS_DELTA: f64 = 0.15;
const INCOME_MAX_ABS_DELTA: f64 = 0.40;

/// Near-dated contracts with a live bid and a midpoint under $1.00.
pub fn find_cheap_weeklies(
    snapshot: &OptionChainSnapshot,
    _market: &MarketParameter,
    _stock: &StockMetadata,
) -> Result<bool, StrategyError> {
    let dte = snapshot.days_to_expiry();
    if !(0..=CHEAP_WEEKLY_MAX_DAYS).contains(&dte) {
        return Ok(false);
    }
    if !has_bid(snapshot) {
        return Ok(false);
    }
    let Some(mid) = snapshot.mid_price() else {
        return Ok(false);
    };
    let mid = finite("find_cheap_weeklies", snapshot, "mid price", mid)?;
    Ok(mid < CHEAP_WEEKLY_MAX_MID)
}

/// Out-of-the-money calls whose annualised premium beats the carry of
/// holding the stock (risk-free rate plus dividend yield).
pub fn covered_call(
    snapshot: &OptionChainSnapshot,
    market: &MarketParameter,
    stock: &StockMetadata,
) -> Result<bool, StrategyError> {
    if snapshot.option_type != OptionType::Call || !has_bid(snapshot) {
        return Ok(false);
    }
    let Some(delta) = snapshot.delta else {
        return Ok(false);
    };
    if !(INCOME_MIN_ABS_DELTA..=INCOME_MAX_ABS_DELTA).contains(&delta) {
        return Ok(false);
    }
    let Some(yield_) = annualised_yield("covered_call", snapshot)? else {
        return Ok(false);
    };
    Ok(yield_ > market.risk_free_rate + stock.dividend_yield)
}

/// Out-of-the-money puts whose annualised premium beats parking the
/// collateral at the risk-free rate.
pub fn cash_secured_put(
    snapshot: &OptionChainSnapshot,
    market: &MarketParameter,
    _stock: &StockMetadata,
) -> Result<bool, StrategyError> {
    if snapshot.option_type != OptionType::Put || !has_bid(snapshot) {
        return Ok(false);
    }
    let Some(delta) = snapshot.delta else {
        return Ok(false);
    };
    if !(-INCOME_MAX_ABS_DELTA..=-INCOME_MIN_ABS_DELTA).contains(&delta) {
        return Ok(false);
    }
    let Some(yield_) = annualised_yield("cash_secured_put", snapshot)? else {
        return Ok(false);
    };
    Ok(yield_ > market.risk_free_rate)
}

/// Diagnostic: every contract with a live bid.
pub fn test_screener(
    snapshot: &OptionChainSnapshot,
    _market: &MarketParameter,
    _stock: &StockMetadata,
) -> Result<bool, StrategyError> {
    Ok(has_bid(snapshot))
}

fn has_bid(snapshot: &OptionChainSnapshot) -> bool {
    matches!(snapshot.bid, Some(bid) if bid > 0.0)
}

/// `mid / strike * 365 / dte`, or `None` when the contract is outside the
/// income window or has no two-sided quote.
fn annualised_yield(
    strategy: &'static str,
    snapshot: &OptionChainSnapshot,
) -> Result<Option<f64>, StrategyError> {
    let dte = snapshot.days_to_expiry();
    if !(INCOME_MIN_DAYS..=INCOME_MAX_DAYS).contains(&dte) {
        return Ok(None);
    }
    let Some(mid) = snapshot.mid_price() else {
        return Ok(None);
    };
    let value = mid / snapshot.strike * 365.0 / dte as f64;
    finite(strategy, snapshot, "annualised yield", value).map(Some)
}

fn finite(
    strategy: &'static str,
    snapshot: &OptionChainSnapshot,
    what: &str,
    value: f64,
) -> Result<f64, StrategyError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(StrategyError::Evaluation {
            strategy,
            snapshot_id: snapshot.id,
            reason: format!("{} is not finite ({})", what, value),
        })
    }
}
