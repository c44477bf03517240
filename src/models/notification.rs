use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle of a notification job.
///
/// `pending → sending → {sent | pending (retry) | failed}`. Only the
/// dispatcher moves a job out of `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Sending,
    Sent,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Sending => "sending",
            JobStatus::Sent => "sent",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Sent | JobStatus::Failed)
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "sending" => Ok(JobStatus::Sending),
            "sent" => Ok(JobStatus::Sent),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationJob {
    pub id: i64,
    pub correlation_id: Uuid,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub status: JobStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub claimed_by: Option<String>,
    pub available_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Job as produced by the screening engine. Always inserted as `pending`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNotificationJob {
    pub correlation_id: Uuid,
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Outcome applied to a job the caller holds in `sending`.
///
/// `attempts` is the new total, already including the attempt just made.
#[derive(Debug, Clone, PartialEq)]
pub enum JobTransition {
    Sent {
        attempts: u32,
    },
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

impl JobTransition {
    pub fn target_status(&self) -> JobStatus {
        match self {
            JobTransition::Sent { .. } => JobStatus::Sent,
            JobTransition::Retry { .. } => JobStatus::Pending,
            JobTransition::Failed { .. } => JobStatus::Failed,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            JobTransition::Sent { attempts }
            | JobTransition::Retry { attempts, .. }
            | JobTransition::Failed { attempts, .. } => *attempts,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            JobTransition::Sent { .. } => None,
            JobTransition::Retry { error, .. } | JobTransition::Failed { error, .. } => {
                Some(error.as_str())
            }
        }
    }
}

/// A row moved out of its in-flight state by the staleness sweep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reclaimed {
    pub id: i64,
    pub correlation_id: Uuid,
    pub attempts: u32,
    /// True when the row had no attempts left and was failed instead of requeued.
    pub exhausted: bool,
}
