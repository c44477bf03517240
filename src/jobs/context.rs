//! Shared dependencies for the polling workers

use crate::core::clock::{Clock, SystemClock};
use crate::metrics::Metrics;
use std::sync::Arc;

/// Identity, time source and (optional) metrics handed to each worker.
///
/// Workers never read the wall clock directly; tests swap in a
/// `ManualClock` to drive backoff and staleness.
#[derive(Clone)]
pub struct JobContext {
    pub worker_id: String,
    pub clock: Arc<dyn Clock>,
    pub metrics: Option<Arc<Metrics>>,
}

impl JobContext {
    pub fn new(worker_id: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            worker_id: worker_id.into(),
            clock,
            metrics: None,
        }
    }

    pub fn system(worker_id: impl Into<String>) -> Self {
        Self::new(worker_id, Arc::new(SystemClock))
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run `f` against the metrics registry when one is attached.
    pub fn record(&self, f: impl FnOnce(&Metrics)) {
        if let Some(m) = &self.metrics {
            f(m);
        }
    }
}
