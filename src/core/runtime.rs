//! Cooperative polling loop shared by the screening engine and the dispatcher.
//!
//! One iteration is: run a cycle (reclaim stale rows, claim a batch, process
//! it) then sleep for the poll interval. The shutdown signal is only observed
//! between iterations, so a claimed batch is always finished.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Configuration for the job runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub poll_interval: Duration,
    /// Stop after this many cycles. `None` runs until shutdown.
    pub max_cycles: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            max_cycles: None,
        }
    }
}

impl RuntimeConfig {
    pub fn every(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            max_cycles: None,
        }
    }
}

/// Counters from one polling cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub reclaimed: usize,
    pub claimed: usize,
    pub completed: usize,
    pub retried: usize,
    pub failed: usize,
}

impl CycleReport {
    pub fn is_idle(&self) -> bool {
        self.reclaimed == 0 && self.claimed == 0
    }

    pub fn merge(&mut self, other: CycleReport) {
        self.reclaimed += other.reclaimed;
        self.claimed += other.claimed;
        self.completed += other.completed;
        self.retried += other.retried;
        self.failed += other.failed;
    }
}

/// A worker that makes progress one polling cycle at a time.
#[async_trait]
pub trait PollingWorker: Send + Sync {
    fn name(&self) -> &str;

    /// Run one cycle. Errors are logged by the loop and the next cycle proceeds.
    async fn run_cycle(&self) -> Result<CycleReport, Box<dyn std::error::Error + Send + Sync>>;
}

/// Drive `worker` until `shutdown` flips to true (or `max_cycles` is reached).
///
/// Returns the accumulated report over all cycles.
pub async fn run_polling_loop(
    worker: Arc<dyn PollingWorker>,
    config: RuntimeConfig,
    mut shutdown: watch::Receiver<bool>,
) -> CycleReport {
    let mut total = CycleReport::default();
    let mut cycles: u64 = 0;

    info!(
        worker = worker.name(),
        interval_ms = config.poll_interval.as_millis() as u64,
        "polling loop started"
    );

    loop {
        if *shutdown.borrow() {
            break;
        }

        match worker.run_cycle().await {
            Ok(report) => {
                if report.is_idle() {
                    debug!(worker = worker.name(), "cycle idle");
                } else {
                    info!(
                        worker = worker.name(),
                        reclaimed = report.reclaimed,
                        claimed = report.claimed,
                        completed = report.completed,
                        retried = report.retried,
                        failed = report.failed,
                        "cycle finished"
                    );
                }
                total.merge(report);
            }
            Err(e) => {
                error!(worker = worker.name(), error = %e, "cycle failed");
            }
        }

        cycles += 1;
        if config.max_cycles.is_some_and(|max| cycles >= max) {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(config.poll_interval) => {}
            changed = shutdown.changed() => {
                // Sender dropped counts as shutdown too.
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!(worker = worker.name(), cycles = cycles, "polling loop stopped");
    total
}
