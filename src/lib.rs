//! Options screening and notification pipeline.
//!
//! Three processes share one Postgres database and nothing else:
//! - `api-server` accepts screen requests and serves results
//! - `screener-worker` evaluates option chains against a strategy
//! - `notifier` delivers the resulting notification emails

pub mod config;
pub mod core;
pub mod db;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod strategies;
