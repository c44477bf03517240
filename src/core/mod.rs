//! Core application primitives (clock, polling loop, gateway)

pub mod clock;
pub mod http;
pub mod retry;
pub mod runtime;
pub mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use retry::RetrySchedule;
pub use runtime::{run_polling_loop, CycleReport, PollingWorker, RuntimeConfig};
pub use scheduler::PollScheduler;
