use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Risk-free rate in effect on a given date (decimal, 0.045 = 4.5%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketParameter {
    pub as_of_date: NaiveDate,
    pub risk_free_rate: f64,
}

impl MarketParameter {
    /// Used when ingest has not published a rate yet.
    pub fn zero_rate(as_of_date: NaiveDate) -> Self {
        Self {
            as_of_date,
            risk_free_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMetadata {
    pub ticker: String,
    pub dividend_yield: f64,
}

impl StockMetadata {
    pub fn no_dividend(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            dividend_yield: 0.0,
        }
    }
}
