//! Screening engine: evaluates a request's tickers against one strategy,
//! persists the matches and enqueues exactly one notification.

use super::context::JobContext;
use super::render;
use super::types::{JobHandle, ScreeningOutcome, SkippedTicker, TickerOutcome};
use crate::config::ScreenerConfig;
use crate::core::retry::{store_backoff, RetrySchedule};
use crate::core::runtime::{CycleReport, PollingWorker};
use crate::db::ScreeningStore;
use crate::error::{DataIntegrityError, ScreenerError, StoreError, ValidationError};
use crate::models::{
    MarketParameter, NewNotificationJob, NewScreenRequest, RequestStatus, RequestTransition,
    ScreenRequest, ScreeningRecord, StockMetadata,
};
use crate::strategies::{Strategy, StrategyRegistry};
use async_trait::async_trait;
use backon::Retryable;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const MAX_TICKER_LEN: usize = 10;

pub struct ScreeningEngine {
    store: Arc<dyn ScreeningStore>,
    registry: Arc<StrategyRegistry>,
    config: ScreenerConfig,
    retry: RetrySchedule,
    ctx: JobContext,
}

impl ScreeningEngine {
    pub fn new(
        store: Arc<dyn ScreeningStore>,
        registry: Arc<StrategyRegistry>,
        config: ScreenerConfig,
        ctx: JobContext,
    ) -> Self {
        let retry = RetrySchedule::new(config.retry_base_delay, config.retry_max_delay);
        Self {
            store,
            registry,
            config,
            retry,
            ctx,
        }
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Normalise and check a request. Tickers are trimmed, upper-cased and
    /// de-duplicated in order. No side effects.
    pub fn validate(
        &self,
        tickers: &[String],
        strategy: &str,
        recipient: &str,
    ) -> Result<NewScreenRequest, ValidationError> {
        let mut normalised: Vec<String> = Vec::with_capacity(tickers.len());
        for raw in tickers {
            let ticker = raw.trim().to_ascii_uppercase();
            if ticker.is_empty() {
                continue;
            }
            if !is_valid_ticker(&ticker) {
                return Err(ValidationError::InvalidTicker(raw.clone()));
            }
            if !normalised.contains(&ticker) {
                normalised.push(ticker);
            }
        }
        if normalised.is_empty() {
            return Err(ValidationError::EmptyTickers);
        }

        if !self.registry.contains(strategy) {
            return Err(ValidationError::UnknownStrategy(strategy.to_string()));
        }

        let recipient = recipient.trim();
        if !is_valid_email(recipient) {
            return Err(ValidationError::InvalidRecipient(recipient.to_string()));
        }

        Ok(NewScreenRequest {
            correlation_id: Uuid::new_v4(),
            tickers: normalised,
            strategy: strategy.to_string(),
            recipient: recipient.to_string(),
        })
    }

    /// Validate and queue a request for a worker. Returns its correlation id.
    pub async fn submit(
        &self,
        tickers: &[String],
        strategy: &str,
        recipient: &str,
    ) -> Result<Uuid, ScreenerError> {
        let request = self.validated(tickers, strategy, recipient)?;
        let row = self
            .store
            .insert_request(&request, RequestStatus::Pending, None)
            .await?;

        info!(
            correlation_id = %row.correlation_id,
            strategy = %row.strategy,
            tickers = row.tickers.len(),
            "Screen request queued"
        );
        Ok(row.correlation_id)
    }

    /// Validate and screen synchronously in the caller's task.
    ///
    /// A failed screening is released like a polled one: transient errors
    /// requeue the row for the workers, anything else fails it.
    pub async fn screen(
        &self,
        tickers: &[String],
        strategy: &str,
        recipient: &str,
    ) -> Result<JobHandle, ScreenerError> {
        let request = self.validated(tickers, strategy, recipient)?;
        let row = self
            .store
            .insert_request(&request, RequestStatus::Processing, Some(&self.ctx.worker_id))
            .await?;
        let result = self.process_request(&row).await;
        if let Err(e) = &result {
            if !matches!(e, ScreenerError::Store(StoreError::Conflict(_))) {
                warn!(correlation_id = %row.correlation_id, error = %e, "Screening failed");
                self.release(&row, e).await;
            }
        }
        result
    }

    fn validated(
        &self,
        tickers: &[String],
        strategy: &str,
        recipient: &str,
    ) -> Result<NewScreenRequest, ValidationError> {
        self.validate(tickers, strategy, recipient).inspect_err(|e| {
            warn!(strategy, error = %e, "Screen request rejected");
            self.ctx.record(|m| m.screen_requests_rejected_total.inc());
        })
    }

    /// Screen a request this worker holds in `processing`.
    ///
    /// Results, the notification job and the completion commit together; a
    /// request that was reclaimed in the meantime fails with `Conflict` and
    /// leaves nothing behind.
    pub async fn process_request(&self, request: &ScreenRequest) -> Result<JobHandle, ScreenerError> {
        let started = Instant::now();
        let strategy = self
            .registry
            .get(&request.strategy)
            .ok_or_else(|| ValidationError::UnknownStrategy(request.strategy.clone()))?;

        let mut outcome = ScreeningOutcome::default();
        for ticker in &request.tickers {
            let ticker_outcome = self.evaluate_ticker(ticker, strategy).await?;
            if let TickerOutcome::Evaluated {
                ticker,
                matches,
                malformed,
            } = &ticker_outcome
            {
                debug!(
                    correlation_id = %request.correlation_id,
                    ticker = %ticker,
                    matches = matches.len(),
                    malformed,
                    "Ticker evaluated"
                );
            }
            outcome.push(ticker_outcome);
        }

        let record = ScreeningRecord {
            correlation_id: request.correlation_id,
            screener_name: request.strategy.clone(),
            matched_option_ids: outcome.matched_ids(),
            notification: NewNotificationJob {
                correlation_id: request.correlation_id,
                recipient: request.recipient.clone(),
                subject: render::subject(&request.strategy),
                body: render::body(&request.strategy, &outcome, self.config.top_matches),
            },
        };
        let persisted = self
            .store
            .complete_screening(&record, &self.ctx.worker_id)
            .await?;

        let elapsed = started.elapsed().as_secs_f64();
        self.ctx.record(|m| {
            m.screen_requests_total.inc();
            m.screen_matches_total.inc_by(outcome.matches.len() as u64);
            m.screen_tickers_skipped_total
                .inc_by(outcome.skipped.len() as u64);
            m.screen_duration_seconds.observe(elapsed);
        });
        info!(
            correlation_id = %request.correlation_id,
            strategy = %request.strategy,
            matches = outcome.matches.len(),
            skipped = outcome.skipped.len(),
            job_id = persisted.job.id,
            "Screening complete, notification enqueued"
        );

        Ok(JobHandle {
            correlation_id: request.correlation_id,
            job_id: persisted.job.id,
            match_count: persisted.results.len(),
            skipped_tickers: outcome.skipped.into_iter().map(|s| s.ticker).collect(),
        })
    }

    /// Evaluate one ticker at its own latest as-of. Data problems skip the
    /// ticker; only store errors propagate.
    async fn evaluate_ticker(
        &self,
        ticker: &str,
        strategy: &Strategy,
    ) -> Result<TickerOutcome, StoreError> {
        let snapshots = (|| async { self.store.latest_snapshots(ticker).await })
            .retry(store_backoff())
            .when(StoreError::is_transient)
            .notify(|e, delay| {
                warn!(ticker, error = %e, delay_ms = delay.as_millis() as u64, "Snapshot read failed, retrying");
            })
            .await?;

        let Some(first) = snapshots.first() else {
            let missing = DataIntegrityError::MissingSnapshot {
                ticker: ticker.to_string(),
            };
            warn!(ticker, error = %missing, "Skipping ticker");
            return Ok(TickerOutcome::Skipped(SkippedTicker {
                ticker: ticker.to_string(),
                reason: missing.to_string(),
            }));
        };

        let as_of_date = first.as_of.date_naive();
        let market = (|| async { self.store.market_parameter(as_of_date).await })
            .retry(store_backoff())
            .when(StoreError::is_transient)
            .await?
            .unwrap_or_else(|| MarketParameter::zero_rate(as_of_date));
        let stock = (|| async { self.store.stock_metadata(ticker).await })
            .retry(store_backoff())
            .when(StoreError::is_transient)
            .await?
            .unwrap_or_else(|| StockMetadata::no_dividend(ticker));

        let mut matches = Vec::new();
        let mut malformed = 0;
        for snapshot in snapshots {
            if let Err(e) = snapshot.validate() {
                warn!(ticker, error = %e, "Skipping malformed snapshot");
                malformed += 1;
                continue;
            }
            match strategy.matches(&snapshot, &market, &stock) {
                Ok(true) => matches.push(snapshot),
                Ok(false) => {}
                Err(e) => {
                    warn!(ticker, error = %e, "Strategy failed, discarding ticker");
                    return Ok(TickerOutcome::Skipped(SkippedTicker {
                        ticker: ticker.to_string(),
                        reason: e.to_string(),
                    }));
                }
            }
        }

        Ok(TickerOutcome::Evaluated {
            ticker: ticker.to_string(),
            matches,
            malformed,
        })
    }

    /// Put a request that could not complete back in the queue, or fail it.
    async fn release(&self, request: &ScreenRequest, err: &ScreenerError) -> Option<RequestStatus> {
        let attempts = request.attempts + 1;
        let transition = if err.is_transient() && attempts < self.config.max_attempts {
            RequestTransition::Retry {
                attempts,
                available_at: self.retry.next_available_at(self.ctx.clock.now(), attempts),
                error: err.to_string(),
            }
        } else {
            RequestTransition::Failed {
                attempts,
                error: err.to_string(),
            }
        };

        match self
            .store
            .release_request(request.correlation_id, &self.ctx.worker_id, &transition)
            .await
        {
            Ok(true) => Some(transition.target_status()),
            Ok(false) => {
                warn!(correlation_id = %request.correlation_id, "Request no longer processing, release skipped");
                None
            }
            Err(e) => {
                error!(correlation_id = %request.correlation_id, error = %e, "Failed to release request");
                None
            }
        }
    }
}

#[async_trait]
impl PollingWorker for ScreeningEngine {
    fn name(&self) -> &str {
        "screening-engine"
    }

    async fn run_cycle(&self) -> Result<CycleReport, Box<dyn std::error::Error + Send + Sync>> {
        let mut report = CycleReport::default();

        let reclaimed = self
            .store
            .reclaim_stale_requests(self.config.stale_after, self.config.max_attempts)
            .await?;
        for r in &reclaimed {
            warn!(
                correlation_id = %r.correlation_id,
                attempts = r.attempts,
                exhausted = r.exhausted,
                "Reclaimed stale screen request"
            );
        }
        report.reclaimed = reclaimed.len();

        let claimed = self
            .store
            .claim_pending_requests(self.config.batch_size, &self.ctx.worker_id)
            .await?;
        report.claimed = claimed.len();

        for request in &claimed {
            match self.process_request(request).await {
                Ok(_) => report.completed += 1,
                Err(ScreenerError::Store(StoreError::Conflict(reason))) => {
                    warn!(correlation_id = %request.correlation_id, reason = %reason, "Lost request to another worker");
                }
                Err(e) => {
                    warn!(correlation_id = %request.correlation_id, error = %e, "Screening failed");
                    match self.release(request, &e).await {
                        Some(RequestStatus::Pending) => report.retried += 1,
                        Some(RequestStatus::Failed) => report.failed += 1,
                        _ => {}
                    }
                }
            }
        }

        Ok(report)
    }
}

fn is_valid_ticker(ticker: &str) -> bool {
    ticker.len() <= MAX_TICKER_LEN
        && ticker
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.' || c == '-')
}

fn is_valid_email(address: &str) -> bool {
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !address.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}
