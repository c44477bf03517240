//! Unit tests for configuration defaults and environment parsing

use optscreen::config::{get_metrics_port, DeliveryConfig, DispatcherConfig, ScreenerConfig};
use optscreen::error::ConfigError;
use std::time::Duration;

#[test]
fn dispatcher_defaults_keep_staleness_above_timeout() {
    let config = DispatcherConfig::default();
    assert_eq!(config.max_attempts, 5);
    assert_eq!(config.retry_base_delay, Duration::from_secs(30));
    assert_eq!(config.retry_max_delay, Duration::from_secs(1800));
    assert!(config.stale_after > config.delivery_timeout);
    assert!(config.delivery_concurrency > 0);
}

#[test]
fn screener_defaults() {
    let config = ScreenerConfig::default();
    assert!(config.max_attempts > 0);
    assert!(config.retry_base_delay <= config.retry_max_delay);
    assert_eq!(config.top_matches, 5);
}

// The only test in this binary that touches the process environment.
#[test]
fn environment_values_are_validated() {
    std::env::set_var("NOTIFIER_MAX_ATTEMPTS", "4294967296");
    let err = DispatcherConfig::from_env().unwrap_err();
    assert!(matches!(
        err,
        ConfigError::Invalid { key: "NOTIFIER_MAX_ATTEMPTS", .. }
    ));

    std::env::set_var("NOTIFIER_MAX_ATTEMPTS", "0");
    assert!(DispatcherConfig::from_env().is_err());

    std::env::set_var("NOTIFIER_MAX_ATTEMPTS", "7");
    assert_eq!(DispatcherConfig::from_env().unwrap().max_attempts, 7);
    std::env::remove_var("NOTIFIER_MAX_ATTEMPTS");

    std::env::set_var("SCREENER_MAX_ATTEMPTS", "4294967301");
    let err = ScreenerConfig::from_env().unwrap_err();
    assert!(matches!(
        err,
        ConfigError::Invalid { key: "SCREENER_MAX_ATTEMPTS", .. }
    ));
    std::env::remove_var("SCREENER_MAX_ATTEMPTS");

    std::env::set_var("SENDGRID_API_KEY", "SG.test-key");
    std::env::set_var("FROM_EMAIL", "screener@example.com");
    std::env::set_var("SENDGRID_BASE_URL", "mailto:ops@example.com");
    let err = DeliveryConfig::from_env().unwrap_err();
    assert!(matches!(
        err,
        ConfigError::Invalid { key: "SENDGRID_BASE_URL", .. }
    ));

    std::env::set_var("SENDGRID_BASE_URL", "http://localhost:3000/");
    let config = DeliveryConfig::from_env().unwrap();
    assert_eq!(
        config.mail_send_url().unwrap().as_str(),
        "http://localhost:3000/v3/mail/send"
    );

    std::env::set_var("METRICS_PORT", "70000");
    assert!(get_metrics_port(9100).is_err());
    std::env::remove_var("METRICS_PORT");
    assert_eq!(get_metrics_port(9100).unwrap(), 9100);

    for key in ["SENDGRID_API_KEY", "FROM_EMAIL", "SENDGRID_BASE_URL"] {
        std::env::remove_var(key);
    }
}
