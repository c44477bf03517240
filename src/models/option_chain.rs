use crate::error::DataIntegrityError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    /// Single-letter code used in the `call_put` column.
    pub fn code(&self) -> &'static str {
        match self {
            OptionType::Call => "C",
            OptionType::Put => "P",
        }
    }
}

impl FromStr for OptionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "C" | "c" | "call" | "CALL" => Ok(OptionType::Call),
            "P" | "p" | "put" | "PUT" => Ok(OptionType::Put),
            other => Err(format!("unknown option type '{}'", other)),
        }
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionType::Call => write!(f, "call"),
            OptionType::Put => write!(f, "put"),
        }
    }
}

/// Point-in-time market data for one option contract. Never updated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionChainSnapshot {
    pub id: i64,
    pub underlying: String,
    pub as_of: DateTime<Utc>,
    pub expiry: NaiveDate,
    pub strike: f64,
    pub option_type: OptionType,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub iv: Option<f64>,
    pub delta: Option<f64>,
    pub theta: Option<f64>,
    pub gamma: Option<f64>,
    pub vega: Option<f64>,
    pub rho: Option<f64>,
}

impl OptionChainSnapshot {
    /// Midpoint of bid and ask, when both sides are quoted.
    pub fn mid_price(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => Some((bid + ask) / 2.0),
            _ => None,
        }
    }

    /// Calendar days from the snapshot's own as-of date to expiry.
    ///
    /// Measured against `as_of` rather than the wall clock so strategy
    /// predicates stay pure functions of the row.
    pub fn days_to_expiry(&self) -> i64 {
        (self.expiry - self.as_of.date_naive()).num_days()
    }

    /// Reject rows the strategies cannot reason about.
    pub fn validate(&self) -> Result<(), DataIntegrityError> {
        let malformed = |reason: String| DataIntegrityError::MalformedSnapshot {
            id: self.id,
            reason,
        };

        if !self.strike.is_finite() || self.strike <= 0.0 {
            return Err(malformed(format!("strike {} is not positive", self.strike)));
        }
        for (side, quote) in [("bid", self.bid), ("ask", self.ask)] {
            if let Some(q) = quote {
                if !q.is_finite() || q < 0.0 {
                    return Err(malformed(format!("{} {} is negative or not finite", side, q)));
                }
            }
        }
        if let (Some(bid), Some(ask)) = (self.bid, self.ask) {
            if bid > ask {
                return Err(malformed(format!("bid {} above ask {}", bid, ask)));
            }
        }
        if self.days_to_expiry() < 0 {
            return Err(malformed(format!(
                "expiry {} precedes as-of {}",
                self.expiry,
                self.as_of.date_naive()
            )));
        }
        Ok(())
    }
}

/// Write shape used by the ingest producer; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSnapshot {
    pub underlying: String,
    pub as_of: DateTime<Utc>,
    pub expiry: NaiveDate,
    pub strike: f64,
    pub option_type: OptionType,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub iv: Option<f64>,
    pub delta: Option<f64>,
    pub theta: Option<f64>,
    pub gamma: Option<f64>,
    pub vega: Option<f64>,
    pub rho: Option<f64>,
}

impl NewSnapshot {
    pub fn new(
        underlying: impl Into<String>,
        as_of: DateTime<Utc>,
        expiry: NaiveDate,
        strike: f64,
        option_type: OptionType,
    ) -> Self {
        Self {
            underlying: underlying.into(),
            as_of,
            expiry,
            strike,
            option_type,
            bid: None,
            ask: None,
            iv: None,
            delta: None,
            theta: None,
            gamma: None,
            vega: None,
            rho: None,
        }
    }

    pub fn with_quote(mut self, bid: f64, ask: f64) -> Self {
        self.bid = Some(bid);
        self.ask = Some(ask);
        self
    }

    pub fn with_iv(mut self, iv: f64) -> Self {
        self.iv = Some(iv);
        self
    }

    pub fn with_delta(mut self, delta: f64) -> Self {
        self.delta = Some(delta);
        self
    }

    pub fn with_greeks(mut self, theta: f64, gamma: f64, vega: f64, rho: f64) -> Self {
        self.theta = Some(theta);
        self.gamma = Some(gamma);
        self.vega = Some(vega);
        self.rho = Some(rho);
        self
    }

    pub fn into_snapshot(self, id: i64) -> OptionChainSnapshot {
        OptionChainSnapshot {
            id,
            underlying: self.underlying,
            as_of: self.as_of,
            expiry: self.expiry,
            strike: self.strike,
            option_type: self.option_type,
            bid: self.bid,
            ask: self.ask,
            iv: self.iv,
            delta: self.delta,
            theta: self.theta,
            gamma: self.gamma,
            vega: self.vega,
            rho: self.rho,
        }
    }

    /// Natural key: (underlying, as_of, expiry, strike, type).
    pub fn same_contract_as(&self, other: &OptionChainSnapshot) -> bool {
        self.underlying == other.underlying
            && self.as_of == other.as_of
            && self.expiry == other.expiry
            && self.strike == other.strike
            && self.option_type == other.option_type
    }
}
