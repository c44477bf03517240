use super::notification::{NewNotificationJob, NotificationJob};
use super::option_chain::OptionType;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One contract matched by one screening run. Append-only history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenerResult {
    pub id: i64,
    pub screener_name: String,
    pub option_chain_id: i64,
    pub correlation_id: Uuid,
    pub found_at: DateTime<Utc>,
}

/// Result joined with its contract, as served by `GET /results/{screener}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenerResultSummary {
    pub found_at: DateTime<Utc>,
    pub correlation_id: Uuid,
    pub underlying: String,
    pub expiry: NaiveDate,
    pub strike: f64,
    pub option_type: OptionType,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
}

/// Everything a finished screening run commits in a single transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreeningRecord {
    pub correlation_id: Uuid,
    pub screener_name: String,
    pub matched_option_ids: Vec<i64>,
    pub notification: NewNotificationJob,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersistedScreening {
    pub results: Vec<ScreenerResult>,
    pub job: NotificationJob,
}
