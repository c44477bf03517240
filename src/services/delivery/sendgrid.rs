//! SendGrid v3 mail-send client.

use super::{DeliveryProvider, DeliveryReceipt, OutboundMessage};
use crate::config::DeliveryConfig;
use crate::error::{ConfigError, DeliveryError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use url::Url;

#[derive(Debug, Serialize)]
struct MailSend<'a> {
    personalizations: [Personalization<'a>; 1],
    from: Address<'a>,
    subject: &'a str,
    content: [Content<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Personalization<'a> {
    to: [Address<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Address<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    value: &'a str,
}

pub struct SendGridProvider {
    client: Client,
    endpoint: Url,
    api_key: String,
    from_email: String,
    timeout: Duration,
}

impl SendGridProvider {
    pub fn new(config: &DeliveryConfig) -> Result<Self, ConfigError> {
        let endpoint = config.mail_send_url()?;
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
            from_email: config.from_email.clone(),
            timeout: config.timeout,
        })
    }

    fn classify(status: StatusCode, body: String) -> DeliveryError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                DeliveryError::Unauthorized(status.as_u16())
            }
            StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
                DeliveryError::Transient(format!("status {}: {}", status.as_u16(), body))
            }
            s if s.is_server_error() => {
                DeliveryError::Transient(format!("status {}: {}", s.as_u16(), body))
            }
            s => DeliveryError::Rejected {
                status: s.as_u16(),
                reason: body,
            },
        }
    }
}

#[async_trait]
impl DeliveryProvider for SendGridProvider {
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, DeliveryError> {
        let payload = MailSend {
            personalizations: [Personalization {
                to: [Address { email: &message.to }],
            }],
            from: Address {
                email: &self.from_email,
            },
            subject: &message.subject,
            content: [Content {
                kind: "text/plain",
                value: &message.body,
            }],
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DeliveryError::Timeout(self.timeout.as_secs())
                } else {
                    DeliveryError::Transient(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            let message_id = response
                .headers()
                .get("x-message-id")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            tracing::debug!(to = %message.to, status = status.as_u16(), "SendGrid accepted message");
            return Ok(DeliveryReceipt {
                status: status.as_u16(),
                message_id,
            });
        }

        let body = response.text().await.unwrap_or_default();
        Err(Self::classify(status, body))
    }

    fn name(&self) -> &str {
        "sendgrid"
    }
}
