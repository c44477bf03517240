//! Owns a running polling loop and its shutdown signal.

use super::runtime::{run_polling_loop, CycleReport, PollingWorker, RuntimeConfig};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct PollScheduler {
    worker: Arc<dyn PollingWorker>,
    config: RuntimeConfig,
    shutdown: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<CycleReport>>>,
}

impl PollScheduler {
    pub fn new(worker: Arc<dyn PollingWorker>, config: RuntimeConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            worker,
            config,
            shutdown,
            handle: Mutex::new(None),
        }
    }

    /// Spawn the polling loop. Calling `start` on a running scheduler is a no-op.
    pub async fn start(&self) {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            warn!(worker = self.worker.name(), "PollScheduler: already running");
            return;
        }

        self.shutdown.send_replace(false);
        let worker = self.worker.clone();
        let config = self.config.clone();
        let rx = self.shutdown.subscribe();
        *handle = Some(tokio::spawn(run_polling_loop(worker, config, rx)));

        info!(worker = self.worker.name(), "PollScheduler: started");
    }

    /// Signal shutdown and wait for the in-flight batch to finish.
    pub async fn stop(&self) -> CycleReport {
        self.shutdown.send_replace(true);
        let handle = self.handle.lock().await.take();
        let report = match handle {
            Some(h) => h.await.unwrap_or_else(|e| {
                warn!(worker = self.worker.name(), error = %e, "PollScheduler: loop task ended abnormally");
                CycleReport::default()
            }),
            None => CycleReport::default(),
        };
        info!(worker = self.worker.name(), "PollScheduler: stopped");
        report
    }

    pub async fn is_running(&self) -> bool {
        self.handle
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}
