//! Durable store: system of record and work queue.
//!
//! Callers only see the repository traits in [`repository`]. Every
//! cross-process state change is a conditional update on a status column.

pub mod memory;
pub mod postgres;
pub mod repository;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use repository::{
    IngestWriter, MarketDataReader, NotificationRepository, ScreeningRepository, ScreeningStore,
    StoreHealth,
};
