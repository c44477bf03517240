//! Notification dispatcher.
//!
//! `pending → sending → {sent | pending (retry) | failed}`. Every transition
//! after the claim is conditional on the job still being `sending` under this
//! dispatcher's worker id. A job is touched right before its send, so the
//! staleness clock runs per delivery rather than per batch, and a job whose
//! claim was lost while it waited in the batch is never sent.

use super::context::JobContext;
use super::types::DispatchOutcome;
use crate::config::DispatcherConfig;
use crate::core::retry::RetrySchedule;
use crate::core::runtime::{CycleReport, PollingWorker};
use crate::db::NotificationRepository;
use crate::error::DeliveryError;
use crate::models::{JobStatus, JobTransition, NotificationJob};
use crate::services::delivery::{DeliveryProvider, OutboundMessage};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

pub struct NotificationDispatcher {
    repo: Arc<dyn NotificationRepository>,
    provider: Arc<dyn DeliveryProvider>,
    config: DispatcherConfig,
    retry: RetrySchedule,
    ctx: JobContext,
}

impl NotificationDispatcher {
    pub fn new(
        repo: Arc<dyn NotificationRepository>,
        provider: Arc<dyn DeliveryProvider>,
        config: DispatcherConfig,
        ctx: JobContext,
    ) -> Self {
        let retry = RetrySchedule::new(config.retry_base_delay, config.retry_max_delay);
        Self {
            repo,
            provider,
            config,
            retry,
            ctx,
        }
    }

    /// Attempt delivery of one claimed job and record the outcome.
    pub async fn deliver(&self, job: NotificationJob) -> DispatchOutcome {
        match self.repo.touch_job(job.id, &self.ctx.worker_id).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    job_id = job.id,
                    correlation_id = %job.correlation_id,
                    worker_id = %self.ctx.worker_id,
                    "Claim lost before send, skipping"
                );
                return DispatchOutcome::Lost;
            }
            Err(e) => {
                error!(job_id = job.id, error = %e, "Failed to refresh claim, skipping send");
                return DispatchOutcome::Lost;
            }
        }

        let attempts = job.attempts + 1;
        let message = OutboundMessage {
            to: job.recipient.clone(),
            subject: job.subject.clone(),
            body: job.body.clone(),
        };

        let started = Instant::now();
        let result = match tokio::time::timeout(
            self.config.delivery_timeout,
            self.provider.send(&message),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(self.config.delivery_timeout.as_secs())),
        };
        let elapsed = started.elapsed().as_secs_f64();
        self.ctx
            .record(|m| m.delivery_duration_seconds.observe(elapsed));

        let transition = match &result {
            Ok(_) => JobTransition::Sent { attempts },
            Err(e) if e.is_permanent() || attempts >= self.config.max_attempts => {
                JobTransition::Failed {
                    attempts,
                    error: e.to_string(),
                }
            }
            Err(e) => JobTransition::Retry {
                attempts,
                available_at: self.retry.next_available_at(self.ctx.clock.now(), attempts),
                error: e.to_string(),
            },
        };

        match self
            .repo
            .update_job_status(job.id, JobStatus::Sending, &self.ctx.worker_id, &transition)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    job_id = job.id,
                    correlation_id = %job.correlation_id,
                    "Job no longer held by this dispatcher, outcome discarded"
                );
                return DispatchOutcome::Lost;
            }
            Err(e) => {
                // Left in `sending`; the staleness sweep will pick it up.
                error!(job_id = job.id, error = %e, "Failed to record delivery outcome");
                return DispatchOutcome::Lost;
            }
        }

        match transition {
            JobTransition::Sent { .. } => {
                info!(job_id = job.id, correlation_id = %job.correlation_id, attempts, provider = self.provider.name(), "Notification sent");
                self.ctx.record(|m| m.notifications_sent_total.inc());
                DispatchOutcome::Sent
            }
            JobTransition::Retry {
                available_at,
                error,
                ..
            } => {
                warn!(job_id = job.id, attempts, retry_at = %available_at, error = %error, "Delivery failed, will retry");
                self.ctx.record(|m| m.notifications_retried_total.inc());
                DispatchOutcome::Retried
            }
            JobTransition::Failed { error, .. } => {
                error!(job_id = job.id, correlation_id = %job.correlation_id, attempts, error = %error, "Notification failed permanently");
                self.ctx.record(|m| m.notifications_failed_total.inc());
                DispatchOutcome::Failed
            }
        }
    }
}

#[async_trait]
impl PollingWorker for NotificationDispatcher {
    fn name(&self) -> &str {
        "notification-dispatcher"
    }

    async fn run_cycle(&self) -> Result<CycleReport, Box<dyn std::error::Error + Send + Sync>> {
        let mut report = CycleReport::default();

        let reclaimed = self
            .repo
            .reclaim_stale_jobs(self.config.stale_after, self.config.max_attempts)
            .await?;
        for r in &reclaimed {
            warn!(
                job_id = r.id,
                correlation_id = %r.correlation_id,
                attempts = r.attempts,
                exhausted = r.exhausted,
                "Reclaimed stale notification job"
            );
            if r.exhausted {
                report.failed += 1;
            }
        }
        report.reclaimed = reclaimed.len();
        self.ctx
            .record(|m| m.jobs_reclaimed_total.inc_by(reclaimed.len() as u64));

        let jobs = self
            .repo
            .claim_pending_jobs(self.config.batch_size, &self.ctx.worker_id)
            .await?;
        report.claimed = jobs.len();

        let deliveries: Vec<_> = jobs.into_iter().map(|job| self.deliver(job)).collect();
        let outcomes: Vec<DispatchOutcome> = stream::iter(deliveries)
            .buffer_unordered(self.config.delivery_concurrency.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                DispatchOutcome::Sent => report.completed += 1,
                DispatchOutcome::Retried => report.retried += 1,
                DispatchOutcome::Failed => report.failed += 1,
                DispatchOutcome::Lost => {}
            }
        }

        Ok(report)
    }
}
