//! Outbound email delivery.

pub mod sendgrid;

use crate::error::DeliveryError;
use async_trait::async_trait;
use serde::Serialize;

pub use sendgrid::SendGridProvider;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Provider acknowledgement. `message_id` is whatever the provider returned, if anything.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReceipt {
    pub status: u16,
    pub message_id: Option<String>,
}

/// External delivery service. Implementations classify their own failures
/// into [`DeliveryError`]; only `Rejected` stops retries.
#[async_trait]
pub trait DeliveryProvider: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, DeliveryError>;

    fn name(&self) -> &str;
}
