//! Notification dispatcher
//!
//! Delivers pending notification jobs through SendGrid with retry and
//! backoff. Safe to run several instances; claims never overlap.

use dotenvy::dotenv;
use optscreen::config::{self, DeliveryConfig, DispatcherConfig};
use optscreen::core::clock::SystemClock;
use optscreen::core::http::start_metrics_server;
use optscreen::core::runtime::RuntimeConfig;
use optscreen::core::scheduler::PollScheduler;
use optscreen::db::PostgresStore;
use optscreen::jobs::{JobContext, NotificationDispatcher};
use optscreen::logging;
use optscreen::metrics::Metrics;
use optscreen::services::delivery::SendGridProvider;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    logging::init_logging("notifier");

    let settings = DispatcherConfig::from_env()?;
    let delivery = DeliveryConfig::from_env()?;
    let metrics_port = config::get_metrics_port(9102)?;
    let worker_id = config::get_worker_id("notifier");
    info!("Starting notification dispatcher");
    info!(
        environment = %config::get_environment(),
        worker_id = %worker_id,
        metrics_port = metrics_port,
        poll_interval_secs = settings.poll_interval.as_secs(),
        batch_size = settings.batch_size,
        max_attempts = settings.max_attempts,
        stale_after_secs = settings.stale_after.as_secs(),
        provider = %delivery.base_url,
        "Configuration"
    );

    let metrics = Arc::new(Metrics::new()?);
    let store = Arc::new(
        PostgresStore::connect(&config::get_database_url(), Arc::new(SystemClock)).await?,
    );
    metrics.database_connected.set(1.0);

    let (metrics_stop, stopped) = oneshot::channel::<()>();
    let metrics_server = tokio::spawn(start_metrics_server(
        metrics_port,
        metrics.clone(),
        async move {
            let _ = stopped.await;
        },
    ));

    let provider = Arc::new(SendGridProvider::new(&delivery)?);
    let runtime = RuntimeConfig::every(settings.poll_interval);
    let dispatcher = Arc::new(NotificationDispatcher::new(
        store,
        provider,
        settings,
        JobContext::system(worker_id).with_metrics(metrics),
    ));

    let scheduler = PollScheduler::new(dispatcher, runtime);
    scheduler.start().await;

    signal::ctrl_c().await?;
    info!("Shutdown requested, finishing current batch...");
    let report = scheduler.stop().await;
    let _ = metrics_stop.send(());
    match metrics_server.await {
        Ok(Err(e)) => error!(error = %e, "Metrics server failed"),
        Err(e) => error!(error = %e, "Metrics server task panicked"),
        Ok(Ok(())) => {}
    }
    info!(
        sent = report.completed,
        retried = report.retried,
        failed = report.failed,
        "Notification dispatcher stopped"
    );

    Ok(())
}
