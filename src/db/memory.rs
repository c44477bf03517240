//! In-process store with the same conditional-update semantics as Postgres.
//!
//! All tables sit behind one mutex, so every repository call is atomic. Used
//! by the test suite and for running the pipeline without a database.

use super::repository::{
    IngestWriter, MarketDataReader, NotificationRepository, ScreeningRepository, StoreHealth,
};
use crate::core::clock::{Clock, SystemClock};
use crate::error::StoreError;
use crate::models::{
    JobStatus, JobTransition, MarketParameter, NewScreenRequest, NewSnapshot, NotificationJob,
    OptionChainSnapshot, PersistedScreening, Reclaimed, RequestStatus, RequestTransition,
    ScreenRequest, ScreenerResult, ScreenerResultSummary, ScreeningRecord, StockMetadata,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

const ABANDONED: &str = "abandoned while in flight";

#[derive(Default)]
struct Tables {
    snapshots: Vec<OptionChainSnapshot>,
    market_parameters: BTreeMap<NaiveDate, f64>,
    stock_metadata: BTreeMap<String, f64>,
    requests: Vec<ScreenRequest>,
    results: Vec<ScreenerResult>,
    jobs: Vec<NotificationJob>,
    next_snapshot_id: i64,
    next_request_id: i64,
    next_result_id: i64,
    next_job_id: i64,
}

pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            tables: Mutex::new(Tables::default()),
        }
    }

    /// Row counts per table: (requests, results, jobs).
    pub async fn row_counts(&self) -> (usize, usize, usize) {
        let t = self.tables.lock().await;
        (t.requests.len(), t.results.len(), t.jobs.len())
    }

    /// Force a job into `sending` with a given `updated_at`, as if a
    /// dispatcher had claimed it and then died.
    pub async fn mark_sending_since(&self, id: i64, since: DateTime<Utc>) -> bool {
        let mut t = self.tables.lock().await;
        match t.jobs.iter_mut().find(|j| j.id == id) {
            Some(job) => {
                job.status = JobStatus::Sending;
                job.claimed_by = Some("crashed-worker".to_string());
                job.updated_at = since;
                true
            }
            None => false,
        }
    }

    fn stale_cutoff(&self, stale_after: Duration) -> DateTime<Utc> {
        let window = chrono::Duration::from_std(stale_after).unwrap_or_else(|_| chrono::Duration::days(365));
        self.clock.now() - window
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataReader for MemoryStore {
    async fn latest_snapshots(&self, ticker: &str) -> Result<Vec<OptionChainSnapshot>, StoreError> {
        let t = self.tables.lock().await;
        let latest = t
            .snapshots
            .iter()
            .filter(|s| s.underlying == ticker)
            .map(|s| s.as_of)
            .max();

        Ok(match latest {
            Some(as_of) => t
                .snapshots
                .iter()
                .filter(|s| s.underlying == ticker && s.as_of == as_of)
                .cloned()
                .collect(),
            None => Vec::new(),
        })
    }

    async fn market_parameter(
        &self,
        date: NaiveDate,
    ) -> Result<Option<MarketParameter>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.market_parameters
            .range(..=date)
            .next_back()
            .map(|(d, rate)| MarketParameter {
                as_of_date: *d,
                risk_free_rate: *rate,
            }))
    }

    async fn stock_metadata(&self, ticker: &str) -> Result<Option<StockMetadata>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.stock_metadata.get(ticker).map(|y| StockMetadata {
            ticker: ticker.to_string(),
            dividend_yield: *y,
        }))
    }
}

#[async_trait]
impl IngestWriter for MemoryStore {
    async fn insert_snapshots(&self, snapshots: &[NewSnapshot]) -> Result<u64, StoreError> {
        let mut t = self.tables.lock().await;
        let mut inserted = 0;
        for snapshot in snapshots {
            if t.snapshots.iter().any(|s| snapshot.same_contract_as(s)) {
                continue;
            }
            t.next_snapshot_id += 1;
            let id = t.next_snapshot_id;
            t.snapshots.push(snapshot.clone().into_snapshot(id));
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn upsert_market_parameter(&self, parameter: &MarketParameter) -> Result<(), StoreError> {
        let mut t = self.tables.lock().await;
        t.market_parameters
            .insert(parameter.as_of_date, parameter.risk_free_rate);
        Ok(())
    }

    async fn upsert_stock_metadata(&self, metadata: &StockMetadata) -> Result<(), StoreError> {
        let mut t = self.tables.lock().await;
        t.stock_metadata
            .insert(metadata.ticker.clone(), metadata.dividend_yield);
        Ok(())
    }
}

#[async_trait]
impl ScreeningRepository for MemoryStore {
    async fn insert_request(
        &self,
        request: &NewScreenRequest,
        status: RequestStatus,
        claimed_by: Option<&str>,
    ) -> Result<ScreenRequest, StoreError> {
        let now = self.clock.now();
        let mut t = self.tables.lock().await;
        if t
            .requests
            .iter()
            .any(|r| r.correlation_id == request.correlation_id)
        {
            return Err(StoreError::Conflict(format!(
                "request {} already exists",
                request.correlation_id
            )));
        }

        t.next_request_id += 1;
        let row = ScreenRequest {
            id: t.next_request_id,
            correlation_id: request.correlation_id,
            tickers: request.tickers.clone(),
            strategy: request.strategy.clone(),
            recipient: request.recipient.clone(),
            status,
            attempts: 0,
            last_error: None,
            claimed_by: claimed_by.map(str::to_string),
            available_at: now,
            created_at: now,
            updated_at: now,
        };
        t.requests.push(row.clone());
        Ok(row)
    }

    async fn claim_pending_requests(
        &self,
        limit: usize,
        worker_id: &str,
    ) -> Result<Vec<ScreenRequest>, StoreError> {
        let now = self.clock.now();
        let mut t = self.tables.lock().await;

        let mut eligible: Vec<&mut ScreenRequest> = t
            .requests
            .iter_mut()
            .filter(|r| r.status == RequestStatus::Pending && r.available_at <= now)
            .collect();
        eligible.sort_by_key(|r| (r.available_at, r.id));

        Ok(eligible
            .into_iter()
            .take(limit)
            .map(|r| {
                r.status = RequestStatus::Processing;
                r.claimed_by = Some(worker_id.to_string());
                r.updated_at = now;
                r.clone()
            })
            .collect())
    }

    async fn release_request(
        &self,
        correlation_id: Uuid,
        worker_id: &str,
        transition: &RequestTransition,
    ) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let mut t = self.tables.lock().await;
        let Some(request) = t.requests.iter_mut().find(|r| {
            r.correlation_id == correlation_id
                && r.status == RequestStatus::Processing
                && r.claimed_by.as_deref() == Some(worker_id)
        }) else {
            return Ok(false);
        };

        request.status = transition.target_status();
        request.claimed_by = None;
        request.updated_at = now;
        match transition {
            RequestTransition::Retry {
                attempts,
                available_at,
                error,
            } => {
                request.attempts = *attempts;
                request.available_at = *available_at;
                request.last_error = Some(error.clone());
            }
            RequestTransition::Failed { attempts, error } => {
                request.attempts = *attempts;
                request.last_error = Some(error.clone());
            }
        }
        Ok(true)
    }

    async fn reclaim_stale_requests(
        &self,
        stale_after: Duration,
        max_attempts: u32,
    ) -> Result<Vec<Reclaimed>, StoreError> {
        let now = self.clock.now();
        let cutoff = self.stale_cutoff(stale_after);
        let mut t = self.tables.lock().await;

        Ok(t.requests
            .iter_mut()
            .filter(|r| r.status == RequestStatus::Processing && r.updated_at < cutoff)
            .map(|r| {
                r.attempts += 1;
                let exhausted = r.attempts >= max_attempts;
                r.status = if exhausted {
                    RequestStatus::Failed
                } else {
                    RequestStatus::Pending
                };
                r.claimed_by = None;
                r.last_error = Some(ABANDONED.to_string());
                r.available_at = now;
                r.updated_at = now;
                Reclaimed {
                    id: r.id,
                    correlation_id: r.correlation_id,
                    attempts: r.attempts,
                    exhausted,
                }
            })
            .collect())
    }

    async fn complete_screening(
        &self,
        record: &ScreeningRecord,
        worker_id: &str,
    ) -> Result<PersistedScreening, StoreError> {
        let now = self.clock.now();
        let mut t = self.tables.lock().await;

        // Validate everything before the first write so a failure leaves no trace.
        let request_idx = t
            .requests
            .iter()
            .position(|r| {
                r.correlation_id == record.correlation_id
                    && r.status == RequestStatus::Processing
                    && r.claimed_by.as_deref() == Some(worker_id)
            })
            .ok_or_else(|| {
                StoreError::Conflict(format!(
                    "request {} is no longer processing for {}",
                    record.correlation_id, worker_id
                ))
            })?;
        if t
            .jobs
            .iter()
            .any(|j| j.correlation_id == record.notification.correlation_id)
        {
            return Err(StoreError::Conflict(format!(
                "notification already enqueued for {}",
                record.correlation_id
            )));
        }
        if let Some(missing) = record
            .matched_option_ids
            .iter()
            .find(|id| !t.snapshots.iter().any(|s| s.id == **id))
        {
            return Err(StoreError::Integrity(format!(
                "option chain {} does not exist",
                missing
            )));
        }

        let mut results = Vec::with_capacity(record.matched_option_ids.len());
        for option_chain_id in &record.matched_option_ids {
            t.next_result_id += 1;
            let result = ScreenerResult {
                id: t.next_result_id,
                screener_name: record.screener_name.clone(),
                option_chain_id: *option_chain_id,
                correlation_id: record.correlation_id,
                found_at: now,
            };
            t.results.push(result.clone());
            results.push(result);
        }

        t.next_job_id += 1;
        let job = NotificationJob {
            id: t.next_job_id,
            correlation_id: record.notification.correlation_id,
            recipient: record.notification.recipient.clone(),
            subject: record.notification.subject.clone(),
            body: record.notification.body.clone(),
            status: JobStatus::Pending,
            attempts: 0,
            last_error: None,
            claimed_by: None,
            available_at: now,
            created_at: now,
            updated_at: now,
        };
        t.jobs.push(job.clone());

        let request = &mut t.requests[request_idx];
        request.status = RequestStatus::Completed;
        request.claimed_by = None;
        request.updated_at = now;

        Ok(PersistedScreening { results, job })
    }

    async fn get_request(&self, correlation_id: Uuid) -> Result<Option<ScreenRequest>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.requests
            .iter()
            .find(|r| r.correlation_id == correlation_id)
            .cloned())
    }

    async fn results_for_screener(
        &self,
        screener_name: &str,
        limit: usize,
    ) -> Result<Vec<ScreenerResultSummary>, StoreError> {
        let t = self.tables.lock().await;
        let mut rows: Vec<(i64, ScreenerResultSummary)> = t
            .results
            .iter()
            .filter(|r| r.screener_name == screener_name)
            .filter_map(|r| {
                t.snapshots
                    .iter()
                    .find(|s| s.id == r.option_chain_id)
                    .map(|s| {
                        (
                            r.id,
                            ScreenerResultSummary {
                                found_at: r.found_at,
                                correlation_id: r.correlation_id,
                                underlying: s.underlying.clone(),
                                expiry: s.expiry,
                                strike: s.strike,
                                option_type: s.option_type,
                                bid: s.bid,
                                ask: s.ask,
                            },
                        )
                    })
            })
            .collect();
        rows.sort_by(|a, b| b.1.found_at.cmp(&a.1.found_at).then(b.0.cmp(&a.0)));
        Ok(rows.into_iter().take(limit).map(|(_, s)| s).collect())
    }

    async fn results_for_request(
        &self,
        correlation_id: Uuid,
    ) -> Result<Vec<ScreenerResult>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.results
            .iter()
            .filter(|r| r.correlation_id == correlation_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl NotificationRepository for MemoryStore {
    async fn claim_pending_jobs(
        &self,
        limit: usize,
        worker_id: &str,
    ) -> Result<Vec<NotificationJob>, StoreError> {
        let now = self.clock.now();
        let mut t = self.tables.lock().await;

        let mut eligible: Vec<&mut NotificationJob> = t
            .jobs
            .iter_mut()
            .filter(|j| j.status == JobStatus::Pending && j.available_at <= now)
            .collect();
        eligible.sort_by_key(|j| (j.available_at, j.id));

        Ok(eligible
            .into_iter()
            .take(limit)
            .map(|j| {
                j.status = JobStatus::Sending;
                j.claimed_by = Some(worker_id.to_string());
                j.updated_at = now;
                j.clone()
            })
            .collect())
    }

    async fn touch_job(&self, id: i64, worker_id: &str) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let mut t = self.tables.lock().await;
        match t.jobs.iter_mut().find(|j| {
            j.id == id
                && j.status == JobStatus::Sending
                && j.claimed_by.as_deref() == Some(worker_id)
        }) {
            Some(job) => {
                job.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_job_status(
        &self,
        id: i64,
        expected: JobStatus,
        worker_id: &str,
        transition: &JobTransition,
    ) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let mut t = self.tables.lock().await;
        let Some(job) = t.jobs.iter_mut().find(|j| {
            j.id == id && j.status == expected && j.claimed_by.as_deref() == Some(worker_id)
        }) else {
            return Ok(false);
        };

        job.status = transition.target_status();
        job.attempts = transition.attempts();
        job.claimed_by = None;
        job.updated_at = now;
        if let Some(error) = transition.error() {
            job.last_error = Some(error.to_string());
        }
        if let JobTransition::Retry { available_at, .. } = transition {
            job.available_at = *available_at;
        }
        Ok(true)
    }

    async fn reclaim_stale_jobs(
        &self,
        stale_after: Duration,
        max_attempts: u32,
    ) -> Result<Vec<Reclaimed>, StoreError> {
        let now = self.clock.now();
        let cutoff = self.stale_cutoff(stale_after);
        let mut t = self.tables.lock().await;

        Ok(t.jobs
            .iter_mut()
            .filter(|j| j.status == JobStatus::Sending && j.updated_at < cutoff)
            .map(|j| {
                j.attempts += 1;
                let exhausted = j.attempts >= max_attempts;
                j.status = if exhausted {
                    JobStatus::Failed
                } else {
                    JobStatus::Pending
                };
                j.claimed_by = None;
                j.last_error = Some(ABANDONED.to_string());
                j.available_at = now;
                j.updated_at = now;
                Reclaimed {
                    id: j.id,
                    correlation_id: j.correlation_id,
                    attempts: j.attempts,
                    exhausted,
                }
            })
            .collect())
    }

    async fn get_job(&self, id: i64) -> Result<Option<NotificationJob>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.jobs.iter().find(|j| j.id == id).cloned())
    }

    async fn job_for_request(
        &self,
        correlation_id: Uuid,
    ) -> Result<Option<NotificationJob>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.jobs
            .iter()
            .find(|j| j.correlation_id == correlation_id)
            .cloned())
    }

    async fn jobs_with_status(
        &self,
        status: JobStatus,
        limit: usize,
    ) -> Result<Vec<NotificationJob>, StoreError> {
        let t = self.tables.lock().await;
        let mut jobs: Vec<NotificationJob> =
            t.jobs.iter().filter(|j| j.status == status).cloned().collect();
        jobs.sort_by_key(|j| (j.updated_at, j.id));
        jobs.truncate(limit);
        Ok(jobs)
    }
}

#[async_trait]
impl StoreHealth for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
