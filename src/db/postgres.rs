//! Postgres-backed store.
//!
//! Claims are `UPDATE ... WHERE id IN (SELECT ... FOR UPDATE SKIP LOCKED)`
//! guarded again by the expected status, so two workers never receive the
//! same row. Timestamps come from the injected clock, not `now()`.

use super::repository::{
    IngestWriter, MarketDataReader, NotificationRepository, ScreeningRepository, StoreHealth,
};
use crate::core::clock::Clock;
use crate::core::retry::store_backoff;
use crate::error::StoreError;
use crate::models::{
    JobStatus, JobTransition, MarketParameter, NewScreenRequest, NewSnapshot, NotificationJob,
    OptionChainSnapshot, PersistedScreening, Reclaimed, RequestStatus, RequestTransition,
    ScreenRequest, ScreenerResult, ScreenerResultSummary, ScreeningRecord, StockMetadata,
};
use async_trait::async_trait;
use backon::Retryable;
use chrono::{DateTime, NaiveDate, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio_postgres::types::FromSql;
use tokio_postgres::{Client, NoTls, Row};
use uuid::Uuid;

const SNAPSHOT_COLUMNS: &str = "id, underlying, as_of, expiry, strike, call_put, bid, ask, \
     iv, delta, theta, gamma, vega, rho";

const REQUEST_COLUMNS: &str = "id, correlation_id, tickers, strategy, recipient, status, \
     attempts, last_error, claimed_by, available_at, created_at, updated_at";

const JOB_COLUMNS: &str = "id, correlation_id, recipient, subject, body, status, attempts, \
     last_error, claimed_by, available_at, created_at, updated_at";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS option_chains (
    id BIGSERIAL PRIMARY KEY,
    underlying TEXT NOT NULL,
    as_of TIMESTAMPTZ NOT NULL,
    expiry DATE NOT NULL,
    strike DOUBLE PRECISION NOT NULL,
    call_put TEXT NOT NULL CHECK (call_put IN ('C', 'P')),
    bid DOUBLE PRECISION,
    ask DOUBLE PRECISION,
    iv DOUBLE PRECISION,
    delta DOUBLE PRECISION,
    theta DOUBLE PRECISION,
    gamma DOUBLE PRECISION,
    vega DOUBLE PRECISION,
    rho DOUBLE PRECISION,
    UNIQUE (underlying, as_of, expiry, strike, call_put)
);
CREATE INDEX IF NOT EXISTS idx_option_chains_underlying_as_of ON option_chains (underlying, as_of);
CREATE INDEX IF NOT EXISTS idx_option_chains_expiry ON option_chains (expiry);

CREATE TABLE IF NOT EXISTS market_parameters (
    as_of_date DATE PRIMARY KEY,
    risk_free_rate DOUBLE PRECISION NOT NULL
);

CREATE TABLE IF NOT EXISTS stock_metadata (
    ticker TEXT PRIMARY KEY,
    dividend_yield DOUBLE PRECISION NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS screen_requests (
    id BIGSERIAL PRIMARY KEY,
    correlation_id UUID NOT NULL UNIQUE,
    tickers TEXT[] NOT NULL,
    strategy TEXT NOT NULL,
    recipient TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('pending', 'processing', 'completed', 'failed')),
    attempts INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    claimed_by TEXT,
    available_at TIMESTAMPTZ NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_screen_requests_status ON screen_requests (status, available_at);

CREATE TABLE IF NOT EXISTS screener_results (
    id BIGSERIAL PRIMARY KEY,
    screener_name TEXT NOT NULL,
    option_chain_id BIGINT NOT NULL REFERENCES option_chains (id),
    correlation_id UUID NOT NULL REFERENCES screen_requests (correlation_id),
    found_at TIMESTAMPTZ NOT NULL,
    UNIQUE (correlation_id, option_chain_id)
);
CREATE INDEX IF NOT EXISTS idx_screener_results_name_found ON screener_results (screener_name, found_at DESC);
CREATE INDEX IF NOT EXISTS idx_screener_results_correlation ON screener_results (correlation_id);

CREATE TABLE IF NOT EXISTS notification_jobs (
    id BIGSERIAL PRIMARY KEY,
    correlation_id UUID NOT NULL UNIQUE REFERENCES screen_requests (correlation_id),
    recipient TEXT NOT NULL,
    subject TEXT NOT NULL,
    body TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('pending', 'sending', 'sent', 'failed')),
    attempts INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    claimed_by TEXT,
    available_at TIMESTAMPTZ NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_notification_jobs_status ON notification_jobs (status, available_at);
";

const ABANDONED: &str = "abandoned while in flight";

pub struct PostgresStore {
    url: String,
    client: Arc<RwLock<Client>>,
    clock: Arc<dyn Clock>,
    query_timeout: Duration,
}

impl PostgresStore {
    /// Connect (retrying with backoff) and bootstrap the schema.
    pub async fn connect(database_url: &str, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let client = open_client(database_url).await?;
        let store = Self {
            url: database_url.to_string(),
            client: Arc::new(RwLock::new(client)),
            clock,
            query_timeout: Duration::from_secs(5),
        };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Idempotent: every statement is `IF NOT EXISTS`.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        let client = self.client().await?;
        self.timed(client.batch_execute(SCHEMA)).await?;
        tracing::info!("Database schema ready");
        Ok(())
    }

    async fn client(&self) -> Result<RwLockReadGuard<'_, Client>, StoreError> {
        {
            let guard = self.client.read().await;
            if !guard.is_closed() {
                return Ok(guard);
            }
        }
        self.reconnect().await?;
        Ok(self.client.read().await)
    }

    /// Exclusive access, needed for transactions on the shared connection.
    async fn client_mut(&self) -> Result<RwLockWriteGuard<'_, Client>, StoreError> {
        let mut guard = self.client.write().await;
        if guard.is_closed() {
            tracing::warn!("Database connection closed, reconnecting");
            *guard = open_client(&self.url).await?;
        }
        Ok(guard)
    }

    async fn reconnect(&self) -> Result<(), StoreError> {
        let mut guard = self.client.write().await;
        if guard.is_closed() {
            tracing::warn!("Database connection closed, reconnecting");
            *guard = open_client(&self.url).await?;
        }
        Ok(())
    }

    async fn timed<T, E, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, E>>,
        StoreError: From<E>,
    {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::Timeout(self.query_timeout.as_secs())),
        }
    }

    fn stale_cutoff(&self, stale_after: Duration) -> DateTime<Utc> {
        let window = chrono::Duration::from_std(stale_after).unwrap_or_else(|_| chrono::Duration::days(365));
        self.clock.now() - window
    }
}

async fn open_client(database_url: &str) -> Result<Client, StoreError> {
    let url = database_url.to_string();
    let (client, connection) = (|| async { tokio_postgres::connect(&url, NoTls).await })
        .retry(store_backoff())
        .notify(|e, delay| {
            tracing::warn!(error = %e, delay_ms = delay.as_millis() as u64, "Database connect failed, retrying");
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("failed to connect to database: {}", e)))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(error = %e, "Database connection error");
        }
    });

    Ok(client)
}

fn col<'a, T: FromSql<'a>>(row: &'a Row, column: &str) -> Result<T, StoreError> {
    row.try_get(column)
        .map_err(|e| StoreError::Integrity(format!("column {}: {}", column, e)))
}

fn attempts_col(row: &Row) -> Result<u32, StoreError> {
    let raw: i32 = col(row, "attempts")?;
    u32::try_from(raw).map_err(|_| StoreError::Integrity(format!("negative attempts {}", raw)))
}

fn snapshot_from_row(row: &Row) -> Result<OptionChainSnapshot, StoreError> {
    let call_put: String = col(row, "call_put")?;
    Ok(OptionChainSnapshot {
        id: col(row, "id")?,
        underlying: col(row, "underlying")?,
        as_of: col(row, "as_of")?,
        expiry: col(row, "expiry")?,
        strike: col(row, "strike")?,
        option_type: call_put.parse().map_err(StoreError::Integrity)?,
        bid: col(row, "bid")?,
        ask: col(row, "ask")?,
        iv: col(row, "iv")?,
        delta: col(row, "delta")?,
        theta: col(row, "theta")?,
        gamma: col(row, "gamma")?,
        vega: col(row, "vega")?,
        rho: col(row, "rho")?,
    })
}

fn request_from_row(row: &Row) -> Result<ScreenRequest, StoreError> {
    let status: String = col(row, "status")?;
    Ok(ScreenRequest {
        id: col(row, "id")?,
        correlation_id: col(row, "correlation_id")?,
        tickers: col(row, "tickers")?,
        strategy: col(row, "strategy")?,
        recipient: col(row, "recipient")?,
        status: status.parse().map_err(StoreError::Integrity)?,
        attempts: attempts_col(row)?,
        last_error: col(row, "last_error")?,
        claimed_by: col(row, "claimed_by")?,
        available_at: col(row, "available_at")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

fn job_from_row(row: &Row) -> Result<NotificationJob, StoreError> {
    let status: String = col(row, "status")?;
    Ok(NotificationJob {
        id: col(row, "id")?,
        correlation_id: col(row, "correlation_id")?,
        recipient: col(row, "recipient")?,
        subject: col(row, "subject")?,
        body: col(row, "body")?,
        status: status.parse().map_err(StoreError::Integrity)?,
        attempts: attempts_col(row)?,
        last_error: col(row, "last_error")?,
        claimed_by: col(row, "claimed_by")?,
        available_at: col(row, "available_at")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

fn result_from_row(row: &Row) -> Result<ScreenerResult, StoreError> {
    Ok(ScreenerResult {
        id: col(row, "id")?,
        screener_name: col(row, "screener_name")?,
        option_chain_id: col(row, "option_chain_id")?,
        correlation_id: col(row, "correlation_id")?,
        found_at: col(row, "found_at")?,
    })
}

fn reclaimed_from_row(row: &Row, failed_status: &str) -> Result<Reclaimed, StoreError> {
    let status: String = col(row, "status")?;
    Ok(Reclaimed {
        id: col(row, "id")?,
        correlation_id: col(row, "correlation_id")?,
        attempts: attempts_col(row)?,
        exhausted: status == failed_status,
    })
}

fn attempts_param(attempts: u32) -> i32 {
    i32::try_from(attempts).unwrap_or(i32::MAX)
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

async fn complete_in_transaction(
    client: &mut Client,
    record: &ScreeningRecord,
    worker_id: &str,
    now: DateTime<Utc>,
) -> Result<PersistedScreening, StoreError> {
    let tx = client.transaction().await?;

    let moved = tx
        .execute(
            "UPDATE screen_requests
             SET status = 'completed', claimed_by = NULL, updated_at = $2
             WHERE correlation_id = $1 AND status = 'processing' AND claimed_by = $3",
            &[&record.correlation_id, &now, &worker_id],
        )
        .await?;
    if moved == 0 {
        // Dropping `tx` rolls back.
        return Err(StoreError::Conflict(format!(
            "request {} is no longer processing for {}",
            record.correlation_id, worker_id
        )));
    }

    let mut results = Vec::with_capacity(record.matched_option_ids.len());
    for option_chain_id in &record.matched_option_ids {
        let row = tx
            .query_one(
                "INSERT INTO screener_results (screener_name, option_chain_id, correlation_id, found_at)
                 VALUES ($1, $2, $3, $4)
                 RETURNING id, screener_name, option_chain_id, correlation_id, found_at",
                &[&record.screener_name, option_chain_id, &record.correlation_id, &now],
            )
            .await?;
        results.push(result_from_row(&row)?);
    }

    let notification = &record.notification;
    let row = tx
        .query_one(
            &format!(
                "INSERT INTO notification_jobs
                     (correlation_id, recipient, subject, body, status, attempts, available_at, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, 'pending', 0, $5, $5, $5)
                 RETURNING {}",
                JOB_COLUMNS
            ),
            &[
                &notification.correlation_id,
                &notification.recipient,
                &notification.subject,
                &notification.body,
                &now,
            ],
        )
        .await?;
    let job = job_from_row(&row)?;

    tx.commit().await?;
    Ok(PersistedScreening { results, job })
}

async fn insert_snapshots_in_transaction(
    client: &mut Client,
    snapshots: &[NewSnapshot],
) -> Result<u64, StoreError> {
    let tx = client.transaction().await?;
    let stmt = tx
        .prepare(
            "INSERT INTO option_chains
                 (underlying, as_of, expiry, strike, call_put, bid, ask, iv, delta, theta, gamma, vega, rho)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             ON CONFLICT (underlying, as_of, expiry, strike, call_put) DO NOTHING",
        )
        .await?;

    let mut inserted = 0;
    for s in snapshots {
        inserted += tx
            .execute(
                &stmt,
                &[
                    &s.underlying,
                    &s.as_of,
                    &s.expiry,
                    &s.strike,
                    &s.option_type.code(),
                    &s.bid,
                    &s.ask,
                    &s.iv,
                    &s.delta,
                    &s.theta,
                    &s.gamma,
                    &s.vega,
                    &s.rho,
                ],
            )
            .await?;
    }

    tx.commit().await?;
    Ok(inserted)
}

#[async_trait]
impl MarketDataReader for PostgresStore {
    async fn latest_snapshots(&self, ticker: &str) -> Result<Vec<OptionChainSnapshot>, StoreError> {
        let client = self.client().await?;
        let sql = format!(
            "SELECT {} FROM option_chains
             WHERE underlying = $1
               AND as_of = (SELECT MAX(as_of) FROM option_chains WHERE underlying = $1)
             ORDER BY expiry, strike, call_put",
            SNAPSHOT_COLUMNS
        );
        let rows = self.timed(client.query(sql.as_str(), &[&ticker])).await?;
        rows.iter().map(snapshot_from_row).collect()
    }

    async fn market_parameter(
        &self,
        date: NaiveDate,
    ) -> Result<Option<MarketParameter>, StoreError> {
        let client = self.client().await?;
        let row = self
            .timed(client.query_opt(
                "SELECT as_of_date, risk_free_rate FROM market_parameters
                 WHERE as_of_date <= $1
                 ORDER BY as_of_date DESC
                 LIMIT 1",
                &[&date],
            ))
            .await?;
        row.map(|r| {
            Ok(MarketParameter {
                as_of_date: col(&r, "as_of_date")?,
                risk_free_rate: col(&r, "risk_free_rate")?,
            })
        })
        .transpose()
    }

    async fn stock_metadata(&self, ticker: &str) -> Result<Option<StockMetadata>, StoreError> {
        let client = self.client().await?;
        let row = self
            .timed(client.query_opt(
                "SELECT ticker, dividend_yield FROM stock_metadata WHERE ticker = $1",
                &[&ticker],
            ))
            .await?;
        row.map(|r| {
            Ok(StockMetadata {
                ticker: col(&r, "ticker")?,
                dividend_yield: col(&r, "dividend_yield")?,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl IngestWriter for PostgresStore {
    async fn insert_snapshots(&self, snapshots: &[NewSnapshot]) -> Result<u64, StoreError> {
        if snapshots.is_empty() {
            return Ok(0);
        }
        let mut client = self.client_mut().await?;
        self.timed(insert_snapshots_in_transaction(&mut client, snapshots))
            .await
    }

    async fn upsert_market_parameter(&self, parameter: &MarketParameter) -> Result<(), StoreError> {
        let client = self.client().await?;
        self.timed(client.execute(
            "INSERT INTO market_parameters (as_of_date, risk_free_rate) VALUES ($1, $2)
             ON CONFLICT (as_of_date) DO UPDATE SET risk_free_rate = EXCLUDED.risk_free_rate",
            &[&parameter.as_of_date, &parameter.risk_free_rate],
        ))
        .await?;
        Ok(())
    }

    async fn upsert_stock_metadata(&self, metadata: &StockMetadata) -> Result<(), StoreError> {
        let client = self.client().await?;
        self.timed(client.execute(
            "INSERT INTO stock_metadata (ticker, dividend_yield) VALUES ($1, $2)
             ON CONFLICT (ticker) DO UPDATE SET dividend_yield = EXCLUDED.dividend_yield",
            &[&metadata.ticker, &metadata.dividend_yield],
        ))
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ScreeningRepository for PostgresStore {
    async fn insert_request(
        &self,
        request: &NewScreenRequest,
        status: RequestStatus,
        claimed_by: Option<&str>,
    ) -> Result<ScreenRequest, StoreError> {
        let now = self.clock.now();
        let client = self.client().await?;
        let sql = format!(
            "INSERT INTO screen_requests
                 (correlation_id, tickers, strategy, recipient, status, attempts, claimed_by,
                  available_at, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, 0, $6, $7, $7, $7)
             RETURNING {}",
            REQUEST_COLUMNS
        );
        let row = self
            .timed(client.query_one(
                sql.as_str(),
                &[
                    &request.correlation_id,
                    &request.tickers,
                    &request.strategy,
                    &request.recipient,
                    &status.as_str(),
                    &claimed_by,
                    &now,
                ],
            ))
            .await?;
        request_from_row(&row)
    }

    async fn claim_pending_requests(
        &self,
        limit: usize,
        worker_id: &str,
    ) -> Result<Vec<ScreenRequest>, StoreError> {
        let now = self.clock.now();
        let client = self.client().await?;
        let sql = format!(
            "UPDATE screen_requests
             SET status = 'processing', claimed_by = $2, updated_at = $3
             WHERE id IN (
                 SELECT id FROM screen_requests
                 WHERE status = 'pending' AND available_at <= $3
                 ORDER BY available_at, id
                 LIMIT $1
                 FOR UPDATE SKIP LOCKED
             )
             AND status = 'pending'
             RETURNING {}",
            REQUEST_COLUMNS
        );
        let rows = self
            .timed(client.query(sql.as_str(), &[&limit_param(limit), &worker_id, &now]))
            .await?;
        rows.iter().map(request_from_row).collect()
    }

    async fn release_request(
        &self,
        correlation_id: Uuid,
        worker_id: &str,
        transition: &RequestTransition,
    ) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let (attempts, available_at, error) = match transition {
            RequestTransition::Retry {
                attempts,
                available_at,
                error,
            } => (*attempts, Some(*available_at), error),
            RequestTransition::Failed { attempts, error } => (*attempts, None, error),
        };

        let client = self.client().await?;
        let updated = self
            .timed(client.execute(
                "UPDATE screen_requests
                 SET status = $2, attempts = $3, last_error = $4,
                     available_at = COALESCE($5, available_at),
                     claimed_by = NULL, updated_at = $6
                 WHERE correlation_id = $1 AND status = 'processing' AND claimed_by = $7",
                &[
                    &correlation_id,
                    &transition.target_status().as_str(),
                    &attempts_param(attempts),
                    error,
                    &available_at,
                    &now,
                    &worker_id,
                ],
            ))
            .await?;
        Ok(updated == 1)
    }

    async fn reclaim_stale_requests(
        &self,
        stale_after: Duration,
        max_attempts: u32,
    ) -> Result<Vec<Reclaimed>, StoreError> {
        let now = self.clock.now();
        let cutoff = self.stale_cutoff(stale_after);
        let client = self.client().await?;
        let rows = self
            .timed(client.query(
                "UPDATE screen_requests
                 SET attempts = attempts + 1,
                     status = CASE WHEN attempts + 1 >= $2 THEN 'failed' ELSE 'pending' END,
                     claimed_by = NULL, last_error = $3, available_at = $4, updated_at = $4
                 WHERE status = 'processing' AND updated_at < $1
                 RETURNING id, correlation_id, attempts, status",
                &[&cutoff, &attempts_param(max_attempts), &ABANDONED, &now],
            ))
            .await?;
        rows.iter()
            .map(|r| reclaimed_from_row(r, RequestStatus::Failed.as_str()))
            .collect()
    }

    async fn complete_screening(
        &self,
        record: &ScreeningRecord,
        worker_id: &str,
    ) -> Result<PersistedScreening, StoreError> {
        let now = self.clock.now();
        let mut client = self.client_mut().await?;
        self.timed(complete_in_transaction(&mut client, record, worker_id, now))
            .await
    }

    async fn get_request(&self, correlation_id: Uuid) -> Result<Option<ScreenRequest>, StoreError> {
        let client = self.client().await?;
        let sql = format!(
            "SELECT {} FROM screen_requests WHERE correlation_id = $1",
            REQUEST_COLUMNS
        );
        let row = self
            .timed(client.query_opt(sql.as_str(), &[&correlation_id]))
            .await?;
        row.as_ref().map(request_from_row).transpose()
    }

    async fn results_for_screener(
        &self,
        screener_name: &str,
        limit: usize,
    ) -> Result<Vec<ScreenerResultSummary>, StoreError> {
        let client = self.client().await?;
        let rows = self
            .timed(client.query(
                "SELECT r.found_at, r.correlation_id, o.underlying, o.expiry, o.strike,
                        o.call_put, o.bid, o.ask
                 FROM screener_results r
                 JOIN option_chains o ON o.id = r.option_chain_id
                 WHERE r.screener_name = $1
                 ORDER BY r.found_at DESC, r.id DESC
                 LIMIT $2",
                &[&screener_name, &limit_param(limit)],
            ))
            .await?;

        rows.iter()
            .map(|row| {
                let call_put: String = col(row, "call_put")?;
                Ok(ScreenerResultSummary {
                    found_at: col(row, "found_at")?,
                    correlation_id: col(row, "correlation_id")?,
                    underlying: col(row, "underlying")?,
                    expiry: col(row, "expiry")?,
                    strike: col(row, "strike")?,
                    option_type: call_put.parse().map_err(StoreError::Integrity)?,
                    bid: col(row, "bid")?,
                    ask: col(row, "ask")?,
                })
            })
            .collect()
    }

    async fn results_for_request(
        &self,
        correlation_id: Uuid,
    ) -> Result<Vec<ScreenerResult>, StoreError> {
        let client = self.client().await?;
        let rows = self
            .timed(client.query(
                "SELECT id, screener_name, option_chain_id, correlation_id, found_at
                 FROM screener_results WHERE correlation_id = $1 ORDER BY id",
                &[&correlation_id],
            ))
            .await?;
        rows.iter().map(result_from_row).collect()
    }
}

#[async_trait]
impl NotificationRepository for PostgresStore {
    async fn claim_pending_jobs(
        &self,
        limit: usize,
        worker_id: &str,
    ) -> Result<Vec<NotificationJob>, StoreError> {
        let now = self.clock.now();
        let client = self.client().await?;
        let sql = format!(
            "UPDATE notification_jobs
             SET status = 'sending', claimed_by = $2, updated_at = $3
             WHERE id IN (
                 SELECT id FROM notification_jobs
                 WHERE status = 'pending' AND available_at <= $3
                 ORDER BY available_at, id
                 LIMIT $1
                 FOR UPDATE SKIP LOCKED
             )
             AND status = 'pending'
             RETURNING {}",
            JOB_COLUMNS
        );
        let rows = self
            .timed(client.query(sql.as_str(), &[&limit_param(limit), &worker_id, &now]))
            .await?;
        rows.iter().map(job_from_row).collect()
    }

    async fn update_job_status(
        &self,
        id: i64,
        expected: JobStatus,
        worker_id: &str,
        transition: &JobTransition,
    ) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let available_at = match transition {
            JobTransition::Retry { available_at, .. } => Some(*available_at),
            _ => None,
        };
        let error = transition.error();

        let client = self.client().await?;
        let updated = self
            .timed(client.execute(
                "UPDATE notification_jobs
                 SET status = $3, attempts = $4,
                     last_error = COALESCE($5, last_error),
                     available_at = COALESCE($6, available_at),
                     claimed_by = NULL, updated_at = $7
                 WHERE id = $1 AND status = $2 AND claimed_by = $8",
                &[
                    &id,
                    &expected.as_str(),
                    &transition.target_status().as_str(),
                    &attempts_param(transition.attempts()),
                    &error,
                    &available_at,
                    &now,
                    &worker_id,
                ],
            ))
            .await?;
        Ok(updated == 1)
    }

    async fn touch_job(&self, id: i64, worker_id: &str) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let client = self.client().await?;
        let updated = self
            .timed(client.execute(
                "UPDATE notification_jobs SET updated_at = $3
                 WHERE id = $1 AND status = 'sending' AND claimed_by = $2",
                &[&id, &worker_id, &now],
            ))
            .await?;
        Ok(updated == 1)
    }

    async fn reclaim_stale_jobs(
        &self,
        stale_after: Duration,
        max_attempts: u32,
    ) -> Result<Vec<Reclaimed>, StoreError> {
        let now = self.clock.now();
        let cutoff = self.stale_cutoff(stale_after);
        let client = self.client().await?;
        let rows = self
            .timed(client.query(
                "UPDATE notification_jobs
                 SET attempts = attempts + 1,
                     status = CASE WHEN attempts + 1 >= $2 THEN 'failed' ELSE 'pending' END,
                     claimed_by = NULL, last_error = $3, available_at = $4, updated_at = $4
                 WHERE status = 'sending' AND updated_at < $1
                 RETURNING id, correlation_id, attempts, status",
                &[&cutoff, &attempts_param(max_attempts), &ABANDONED, &now],
            ))
            .await?;
        rows.iter()
            .map(|r| reclaimed_from_row(r, JobStatus::Failed.as_str()))
            .collect()
    }

    async fn get_job(&self, id: i64) -> Result<Option<NotificationJob>, StoreError> {
        let client = self.client().await?;
        let sql = format!("SELECT {} FROM notification_jobs WHERE id = $1", JOB_COLUMNS);
        let row = self.timed(client.query_opt(sql.as_str(), &[&id])).await?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn job_for_request(
        &self,
        correlation_id: Uuid,
    ) -> Result<Option<NotificationJob>, StoreError> {
        let client = self.client().await?;
        let sql = format!(
            "SELECT {} FROM notification_jobs WHERE correlation_id = $1",
            JOB_COLUMNS
        );
        let row = self
            .timed(client.query_opt(sql.as_str(), &[&correlation_id]))
            .await?;
        row.as_ref().map(job_from_row).transpose()
    }

    async fn jobs_with_status(
        &self,
        status: JobStatus,
        limit: usize,
    ) -> Result<Vec<NotificationJob>, StoreError> {
        let client = self.client().await?;
        let sql = format!(
            "SELECT {} FROM notification_jobs WHERE status = $1 ORDER BY updated_at, id LIMIT $2",
            JOB_COLUMNS
        );
        let rows = self
            .timed(client.query(sql.as_str(), &[&status.as_str(), &limit_param(limit)]))
            .await?;
        rows.iter().map(job_from_row).collect()
    }
}

#[async_trait]
impl StoreHealth for PostgresStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let client = self.client().await?;
        self.timed(client.simple_query("SELECT 1")).await?;
        Ok(())
    }
}
