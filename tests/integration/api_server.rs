//! Integration tests for the API Server
//!
//! Tests HTTP endpoints, health checks, metrics and request intake.


use axum::http::StatusCode;
use optscreen::db::ScreeningRepository;
use optscreen::models::RequestStatus;
use serde_json::{json, Value};
use uuid::Uuid;

use test_utils::TestApiServer;

#[tokio::test]
async fn health_endpoint_reports_database_status() {
    let app = TestApiServer::new().await;
    let response = app.server.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "ok");
    assert!(body["uptime_seconds"].as_u64().is_some());
    assert_eq!(body["service"], "optscreen-api");
}

#[tokio::test]
async fn metrics_endpoint_exposes_prometheus_metrics() {
    let app = TestApiServer::new().await;
    for _ in 0..3 {
        let _ = app.server.get("/health").await;
    }

    let response = app.server.get("/metrics").await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let body = response.text();
    assert!(body.contains("http_requests_total"));
    assert!(body.contains("http_request_duration_seconds"));
    assert!(body.contains("notifications_sent_total"));
    assert!(body.contains("database_connected 1"));
}

#[tokio::test]
async fn screen_request_is_queued() {
    let app = TestApiServer::new().await;
    let response = app
        .server
        .post("/screen")
        .json(&json!({
            "tickers": [" aapl", "TSLA", "AAPL"],
            "strategy": "covered_call",
            "email": "trader@example.com"
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::ACCEPTED);

    let body: Value = response.json();
    assert_eq!(body["status"], "queued");
    let correlation_id: Uuid = body["correlation_id"].as_str().unwrap().parse().unwrap();

    let request = app.store.get_request(correlation_id).await.unwrap().unwrap();
    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.tickers, vec!["AAPL".to_string(), "TSLA".to_string()]);
    assert_eq!(request.attempts, 0);
}

#[tokio::test]
async fn invalid_screen_requests_are_rejected() {
    let app = TestApiServer::new().await;

    let cases = [
        json!({ "tickers": [], "strategy": "covered_call", "email": "trader@example.com" }),
        json!({ "tickers": ["AAPL"], "strategy": "iron_condor", "email": "trader@example.com" }),
        json!({ "tickers": ["AAPL"], "strategy": "covered_call", "email": "not-an-email" }),
        json!({ "tickers": ["AA PL"], "strategy": "covered_call", "email": "trader@example.com" }),
    ];
    for case in cases {
        let response = app.server.post("/screen").json(&case).await;
        assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY, "{}", case);
        let body: Value = response.json();
        assert!(body["error"].is_string());
    }

    assert_eq!(app.store.row_counts().await, (0, 0, 0));
    let metrics = app.server.get("/metrics").await.text();
    assert!(metrics.contains("screen_requests_rejected_total 4"));
}

#[tokio::test]
async fn unknown_strategy_names_the_strategy() {
    let app = TestApiServer::new().await;
    let response = app
        .server
        .post("/screen")
        .json(&json!({
            "tickers": ["AAPL"],
            "strategy": "not_a_real_strategy",
            "email": "trader@example.com"
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json();
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("not_a_real_strategy"));
}

#[tokio::test]
async fn results_for_unused_screener_are_empty() {
    let app = TestApiServer::new().await;
    let response = app.server.get("/results/covered_call").await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let body: Value = response.json();
    assert_eq!(body["screener"], "covered_call");
    assert_eq!(body["results"], json!([]));
}

#[tokio::test]
async fn unknown_request_is_not_found() {
    let app = TestApiServer::new().await;
    let response = app
        .server
        .get(&format!("/requests/{}", Uuid::new_v4()))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn queued_request_reports_pending_without_notification() {
    let app = TestApiServer::new().await;
    let body: Value = app
        .server
        .post("/screen")
        .json(&json!({
            "tickers": ["AAPL"],
            "strategy": "test_screener",
            "email": "trader@example.com"
        }))
        .await
        .json();
    let correlation_id = body["correlation_id"].as_str().unwrap();

    let response = app.server.get(&format!("/requests/{}", correlation_id)).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "pending");
    assert_eq!(body["strategy"], "test_screener");
    assert_eq!(body["result_count"], 0);
    assert!(body["notification"].is_null());
}

#[tokio::test]
async fn jobs_listing_validates_status() {
    let app = TestApiServer::new().await;

    let response = app.server.get("/jobs").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "failed");
    assert_eq!(body["jobs"], json!([]));

    let response = app.server.get("/jobs?status=sending&limit=5").await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let response = app.server.get("/jobs?status=lost").await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn strategies_are_listed() {
    let app = TestApiServer::new().await;
    let response = app.server.get("/strategies").await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let body: Value = response.json();
    let names: Vec<&str> = body["strategies"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(names.len(), 4);
    for expected in ["covered_call", "cash_secured_put", "find_cheap_weeklies", "test_screener"] {
        assert!(names.contains(&expected), "missing {}", expected);
    }
    assert!(body["strategies"][0]["description"].is_string());
}
