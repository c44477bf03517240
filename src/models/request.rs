use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Processing => "processing",
            RequestStatus::Completed => "completed",
            RequestStatus::Failed => "failed",
        }
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "processing" => Ok(RequestStatus::Processing),
            "completed" => Ok(RequestStatus::Completed),
            "failed" => Ok(RequestStatus::Failed),
            other => Err(format!("unknown request status '{}'", other)),
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated screen request waiting for (or owned by) a screening engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenRequest {
    pub id: i64,
    pub correlation_id: Uuid,
    pub tickers: Vec<String>,
    pub strategy: String,
    pub recipient: String,
    pub status: RequestStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub claimed_by: Option<String>,
    pub available_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewScreenRequest {
    pub correlation_id: Uuid,
    pub tickers: Vec<String>,
    pub strategy: String,
    pub recipient: String,
}

/// Outcome applied to a request the caller holds in `processing` when
/// screening could not complete.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestTransition {
    Retry {
        attempts: u32,
        available_at: DateTime<Utc>,
        error: String,
    },
    Failed {
        attempts: u32,
        error: String,
    },
}

impl RequestTransition {
    pub fn target_status(&self) -> RequestStatus {
        match self {
            RequestTransition::Retry { .. } => RequestStatus::Pending,
            RequestTransition::Failed { .. } => RequestStatus::Failed,
        }
    }
}
