//! Options screener worker
//!
//! Claims pending screen requests from the database, evaluates them and
//! enqueues one notification per request. Any number of instances may run
//! against the same database.

use dotenvy::dotenv;
use optscreen::config::{self, ScreenerConfig};
use optscreen::core::clock::SystemClock;
use optscreen::core::http::start_metrics_server;
use optscreen::core::runtime::RuntimeConfig;
use optscreen::core::scheduler::PollScheduler;
use optscreen::db::PostgresStore;
use optscreen::jobs::{JobContext, ScreeningEngine};
use optscreen::logging;
use optscreen::metrics::Metrics;
use optscreen::strategies::StrategyRegistry;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    logging::init_logging("screener-worker");

    let settings = ScreenerConfig::from_env()?;
    let metrics_port = config::get_metrics_port(9101)?;
    let worker_id = config::get_worker_id("screener");
    info!("Starting options screener worker");
    info!(
        environment = %config::get_environment(),
        worker_id = %worker_id,
        metrics_port = metrics_port,
        poll_interval_secs = settings.poll_interval.as_secs(),
        batch_size = settings.batch_size,
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

    let ctx = JobContext::system(worker_id).with_metrics(metrics);
    let runtime = RuntimeConfig::every(settings.poll_interval);
    let engine = Arc::new(ScreeningEngine::new(
        store,
        Arc::new(StrategyRegistry::builtin()),
        settings,
        ctx,
    ));

    let scheduler = PollScheduler::new(engine, runtime);
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
        completed = report.completed,
        retried = report.retried,
        failed = report.failed,
        "Screener worker stopped"
    );

    Ok(())
}
