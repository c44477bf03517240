//! SendGrid client against a mock HTTP server

use optscreen::config::DeliveryConfig;
use optscreen::error::{ConfigError, DeliveryError};
use optscreen::services::delivery::sendgrid::SendGridProvider;
use optscreen::services::delivery::{DeliveryProvider, OutboundMessage};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider_for(server: &MockServer, timeout: Duration) -> SendGridProvider {
    let config = DeliveryConfig {
        api_key: "SG.test-key".to_string(),
        base_url: url::Url::parse(&server.uri()).unwrap(),
        from_email: "screener@example.com".to_string(),
        timeout,
    };
    SendGridProvider::new(&config).unwrap()
}

fn message() -> OutboundMessage {
    OutboundMessage {
        to: "trader@example.com".to_string(),
        subject: "Your options screening for 'covered_call' is complete!".to_string(),
        body: "Found 1 results.\n".to_string(),
    }
}

#[tokio::test]
async fn accepted_message_returns_receipt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v3/mail/send"))
        .and(header("authorization", "Bearer SG.test-key"))
        .and(body_partial_json(serde_json::json!({
            "personalizations": [{ "to": [{ "email": "trader@example.com" }] }],
            "from": { "email": "screener@example.com" },
            "subject": "Your options screening for 'covered_call' is complete!",
            "content": [{ "type": "text/plain", "value": "Found 1 results.\n" }]
        })))
        .respond_with(ResponseTemplate::new(202).insert_header("x-message-id", "abc123"))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider_for(&server, Duration::from_secs(2));
    let receipt = provider.send(&message()).await.unwrap();

    assert_eq!(receipt.status, 202);
    assert_eq!(receipt.message_id.as_deref(), Some("abc123"));
}

#[tokio::test]
async fn bad_request_is_a_permanent_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v3/mail/send"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid to address"))
        .mount(&server)
        .await;

    let err = provider_for(&server, Duration::from_secs(2))
        .send(&message())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        DeliveryError::Rejected {
            status: 400,
            reason: "invalid to address".to_string()
        }
    );
    assert!(err.is_permanent());
}

#[tokio::test]
async fn refused_key_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = provider_for(&server, Duration::from_secs(2))
        .send(&message())
        .await
        .unwrap_err();

    assert_eq!(err, DeliveryError::Unauthorized(401));
    assert!(!err.is_permanent());
}

#[tokio::test]
async fn server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("try later"))
        .mount(&server)
        .await;

    let err = provider_for(&server, Duration::from_secs(2))
        .send(&message())
        .await
        .unwrap_err();

    assert!(matches!(err, DeliveryError::Transient(ref m) if m.contains("503")));
}

#[tokio::test]
async fn slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(202).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let err = provider_for(&server, Duration::from_secs(1))
        .send(&message())
        .await
        .unwrap_err();

    assert_eq!(err, DeliveryError::Timeout(1));
}

#[test]
fn non_hierarchical_base_url_is_a_config_error() {
    let config = DeliveryConfig {
        api_key: "SG.test-key".to_string(),
        base_url: url::Url::parse("mailto:ops@example.com").unwrap(),
        from_email: "screener@example.com".to_string(),
        timeout: Duration::from_secs(2),
    };
    let err = SendGridProvider::new(&config).err().unwrap();
    assert!(matches!(
        err,
        ConfigError::Invalid { key: "SENDGRID_BASE_URL", .. }
    ));
}
