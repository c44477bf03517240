//! Value types produced by the screening and dispatch jobs

use crate::models::OptionChainSnapshot;
use serde::Serialize;
use uuid::Uuid;

/// What a caller gets back once a request has been screened and its
/// notification enqueued.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobHandle {
    pub correlation_id: Uuid,
    pub job_id: i64,
    pub match_count: usize,
    pub skipped_tickers: Vec<String>,
}

/// A ticker that contributed no matches because of bad or missing data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedTicker {
    pub ticker: String,
    pub reason: String,
}

/// Per-ticker evaluation result.
#[derive(Debug, Clone)]
pub enum TickerOutcome {
    Evaluated {
        ticker: String,
        matches: Vec<OptionChainSnapshot>,
        malformed: usize,
    },
    Skipped(SkippedTicker),
}

/// Matches and skips across every ticker of one request, in request order.
#[derive(Debug, Clone, Default)]
pub struct ScreeningOutcome {
    pub matches: Vec<OptionChainSnapshot>,
    pub skipped: Vec<SkippedTicker>,
}

impl ScreeningOutcome {
    pub fn push(&mut self, outcome: TickerOutcome) {
        match outcome {
            TickerOutcome::Evaluated { matches, .. } => self.matches.extend(matches),
            TickerOutcome::Skipped(skip) => self.skipped.push(skip),
        }
    }

    pub fn matched_ids(&self) -> Vec<i64> {
        self.matches.iter().map(|s| s.id).collect()
    }
}

/// How a single claimed job left the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    Retried,
    Failed,
    /// The conditional update found the job no longer `sending`.
    Lost,
}
