use crate::error::StoreError;
use crate::models::{
    JobStatus, JobTransition, MarketParameter, NewScreenRequest, NewSnapshot,
    NotificationJob, OptionChainSnapshot, PersistedScreening, Reclaimed, RequestStatus,
    RequestTransition, ScreenRequest, ScreenerResult, ScreenerResultSummary, ScreeningRecord,
    StockMetadata,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::time::Duration;
use uuid::Uuid;

/// Read side of the market data written by ingest.
#[async_trait]
pub trait MarketDataReader: Send + Sync {
    /// All rows for `ticker` at that ticker's most recent `as_of`.
    async fn latest_snapshots(&self, ticker: &str) -> Result<Vec<OptionChainSnapshot>, StoreError>;

    /// Latest parameter dated on or before `date`.
    async fn market_parameter(&self, date: NaiveDate)
        -> Result<Option<MarketParameter>, StoreError>;

    async fn stock_metadata(&self, ticker: &str) -> Result<Option<StockMetadata>, StoreError>;
}

/// Write interface of the ingest producer. Append/upsert only.
#[async_trait]
pub trait IngestWriter: Send + Sync {
    /// Insert snapshots, ignoring rows whose natural key already exists.
    /// Returns how many rows were new.
    async fn insert_snapshots(&self, snapshots: &[NewSnapshot]) -> Result<u64, StoreError>;

    async fn upsert_market_parameter(&self, parameter: &MarketParameter) -> Result<(), StoreError>;

    async fn upsert_stock_metadata(&self, metadata: &StockMetadata) -> Result<(), StoreError>;
}

/// Screen requests and their results.
#[async_trait]
pub trait ScreeningRepository: Send + Sync {
    /// Insert a request in `status` (`pending` for queued requests,
    /// `processing` when the caller screens it immediately).
    async fn insert_request(
        &self,
        request: &NewScreenRequest,
        status: RequestStatus,
        claimed_by: Option<&str>,
    ) -> Result<ScreenRequest, StoreError>;

    /// Atomically move up to `limit` eligible `pending` requests to `processing`.
    async fn claim_pending_requests(
        &self,
        limit: usize,
        worker_id: &str,
    ) -> Result<Vec<ScreenRequest>, StoreError>;

    /// Conditional `processing → pending|failed`. False if the request was no
    /// longer `processing` under `worker_id`'s claim.
    async fn release_request(
        &self,
        correlation_id: Uuid,
        worker_id: &str,
        transition: &RequestTransition,
    ) -> Result<bool, StoreError>;

    /// Requeue requests left in `processing` for longer than `stale_after`.
    async fn reclaim_stale_requests(
        &self,
        stale_after: Duration,
        max_attempts: u32,
    ) -> Result<Vec<Reclaimed>, StoreError>;

    /// Commit results, the notification job and `processing → completed` as
    /// one transaction. Fails with [`StoreError::Conflict`] and writes nothing
    /// if the request is no longer `processing` under `worker_id`'s claim or
    /// already has a job.
    async fn complete_screening(
        &self,
        record: &ScreeningRecord,
        worker_id: &str,
    ) -> Result<PersistedScreening, StoreError>;

    async fn get_request(&self, correlation_id: Uuid) -> Result<Option<ScreenRequest>, StoreError>;

    /// Newest first.
    async fn results_for_screener(
        &self,
        screener_name: &str,
        limit: usize,
    ) -> Result<Vec<ScreenerResultSummary>, StoreError>;

    async fn results_for_request(
        &self,
        correlation_id: Uuid,
    ) -> Result<Vec<ScreenerResult>, StoreError>;
}

/// The notification queue.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Atomically move up to `limit` eligible `pending` jobs to `sending`.
    /// A job is returned to at most one caller.
    async fn claim_pending_jobs(
        &self,
        limit: usize,
        worker_id: &str,
    ) -> Result<Vec<NotificationJob>, StoreError>;

    /// Refresh `updated_at` on a job `worker_id` still holds in `sending`.
    /// False means the claim was lost and the job must not be sent.
    async fn touch_job(&self, id: i64, worker_id: &str) -> Result<bool, StoreError>;

    /// Apply `transition` only if the job is still in `expected` and claimed
    /// by `worker_id`.
    async fn update_job_status(
        &self,
        id: i64,
        expected: JobStatus,
        worker_id: &str,
        transition: &JobTransition,
    ) -> Result<bool, StoreError>;

    /// Requeue jobs left in `sending` for longer than `stale_after`. Each
    /// stale job is reclaimed by exactly one caller.
    async fn reclaim_stale_jobs(
        &self,
        stale_after: Duration,
        max_attempts: u32,
    ) -> Result<Vec<Reclaimed>, StoreError>;

    async fn get_job(&self, id: i64) -> Result<Option<NotificationJob>, StoreError>;

    async fn job_for_request(
        &self,
        correlation_id: Uuid,
    ) -> Result<Option<NotificationJob>, StoreError>;

    /// Oldest update first, for operator inspection.
    async fn jobs_with_status(
        &self,
        status: JobStatus,
        limit: usize,
    ) -> Result<Vec<NotificationJob>, StoreError>;
}

/// Liveness check used by the gateway's health endpoint.
#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;
}

/// What the screening engine needs from the store.
pub trait ScreeningStore: MarketDataReader + ScreeningRepository {}

impl<T> ScreeningStore for T where T: MarketDataReader + ScreeningRepository {}
