//! Logging initialization with environment-based formatters
//!
//! - Production: one JSON object per line for the log aggregator
//! - Anything else: colored, human-readable output

use crate::config::get_environment;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber for a worker process.
///
/// `RUST_LOG` overrides the default `info` filter. `service` is attached to
/// the startup line so interleaved logs from several workers stay readable.
pub fn init_logging(service: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if is_production(&get_environment()) {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_writer(std::io::stdout),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_ansi(true)
                    .with_writer(std::io::stdout),
            )
            .init();
    }

    tracing::debug!(service = %service, "logging initialized");
}

fn is_production(env: &str) -> bool {
    matches!(env, "production" | "prod")
}
