//! Rows of the durable store and the views built from them.

pub mod market;
pub mod notification;
pub mod option_chain;
pub mod request;
pub mod result;

pub use market::{MarketParameter, StockMetadata};
pub use notification::{JobStatus, JobTransition, NewNotificationJob, NotificationJob, Reclaimed};
pub use option_chain::{NewSnapshot, OptionChainSnapshot, OptionType};
pub use request::{NewScreenRequest, RequestStatus, RequestTransition, ScreenRequest};
pub use result::{PersistedScreening, ScreenerResult, ScreenerResultSummary, ScreeningRecord};
