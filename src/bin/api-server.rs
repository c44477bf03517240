//! Options screener API server
//!
//! Accepts screen requests, serves results and exposes health and metrics.
//! Stateless apart from the shared database; run as many as needed.

use dotenvy::dotenv;
use optscreen::config::{self, ScreenerConfig};
use optscreen::core::clock::SystemClock;
use optscreen::core::http::{start_server, AppState};
use optscreen::db::PostgresStore;
use optscreen::jobs::{JobContext, ScreeningEngine};
use optscreen::logging;
use optscreen::metrics::Metrics;
use optscreen::strategies::StrategyRegistry;
use std::sync::Arc;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env if present
    dotenv().ok();

    logging::init_logging("api-server");

    let port = config::get_port()?;
    let env = config::get_environment();
    info!("Starting options screener API server");
    info!(environment = %env, port = port, "Environment");

    let metrics = Arc::new(Metrics::new()?);
    let store = Arc::new(
        PostgresStore::connect(&config::get_database_url(), Arc::new(SystemClock)).await?,
    );
    metrics.database_connected.set(1.0);
    info!("Database connected");

    let registry = Arc::new(StrategyRegistry::builtin());
    info!(strategies = ?registry.names(), "Strategies loaded");

    let ctx = JobContext::system(config::get_worker_id("api")).with_metrics(metrics.clone());
    let engine = Arc::new(ScreeningEngine::new(
        store.clone(),
        registry,
        ScreenerConfig::from_env()?,
        ctx,
    ));

    let state = AppState::new(engine, store, metrics);
    start_server(port, state, async {
        let _ = signal::ctrl_c().await;
        info!("Shutting down API server...");
    })
    .await?;

    info!("API server stopped");
    Ok(())
}
