//! Screening and notification jobs, driven by the polling runtime.

pub mod context;
pub mod dispatcher;
pub mod render;
pub mod screening;
pub mod types;

pub use context::JobContext;
pub use dispatcher::NotificationDispatcher;
pub use screening::ScreeningEngine;
pub use types::{DispatchOutcome, JobHandle, ScreeningOutcome, SkippedTicker, TickerOutcome};
