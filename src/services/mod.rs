//! Clients for external services.

pub mod delivery;

pub use delivery::{DeliveryProvider, DeliveryReceipt, OutboundMessage, SendGridProvider};
