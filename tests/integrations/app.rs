//! End-to-end: publish through the application into a live HTTP endpoint.

use chrono::{TimeZone, Utc};
use notifier::app::App;
use notifier::config::Config;
use notifier::core::{Event, Target};
use notifier::job::delivery::MAX_FAILS_ENV;
use serde_json::{json, Value};
use serial_test::serial;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_config() -> Config {
    let mut config = Config::default();
    config.engine.worker_count = 2;
    config.engine.backoff_base_ms = 10;
    config.engine.backoff_max_seconds = 1;
    config.engine.backoff_jitter = 0.0;
    config.delivery.rate_limit_interval_ms = 0;
    config
}

fn event(address: String) -> Event {
    Event {
        event_type: "PUSH_ARTIFACT".to_string(),
        occur_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        operator: "admin".to_string(),
        event_data: json!({"repository": "library/nginx", "tag": "1.25"}),
        target: Target {
            address,
            skip_cert_verify: false,
            auth_header: Some("Bearer hook-token".to_string()),
        },
    }
}

async fn wait_idle(app: &App) {
    tokio::time::timeout(Duration::from_secs(10), app.engine().wait_idle())
        .await
        .expect("engine did not become idle");
}

#[tokio::test]
#[serial]
async fn test_teams_event_is_delivered_as_message_card() {
    std::env::remove_var(MAX_FAILS_ENV);
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/teams"))
        .and(header("content-type", "application/json"))
        .and(header("authorization", "Bearer hook-token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let app = App::builder(fast_config()).build().unwrap();
    let report = app
        .publish("teams", &event(format!("{}/teams", server.uri())))
        .await;
    assert_eq!(report.delivered, 1);
    wait_idle(&app).await;

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let card: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(card["@type"], "MessageCard");
    assert_eq!(card["title"], "PUSH_ARTIFACT");
    assert_eq!(app.engine().stats().succeeded, 1);

    app.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_http_event_is_delivered_as_plain_json() {
    std::env::remove_var(MAX_FAILS_ENV);
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let app = App::builder(fast_config()).build().unwrap();
    app.publish("http", &event(server.uri())).await;
    wait_idle(&app).await;

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["type"], "PUSH_ARTIFACT");
    assert_eq!(body["occur_at"], 1_700_000_000);
    assert_eq!(body["operator"], "admin");
    assert_eq!(body["event_data"]["tag"], "1.25");

    app.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_failing_endpoint_is_retried_until_max_fails() {
    std::env::set_var(MAX_FAILS_ENV, "3");
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let app = App::builder(fast_config()).build().unwrap();
    app.publish("slack", &event(server.uri())).await;
    wait_idle(&app).await;
    std::env::remove_var(MAX_FAILS_ENV);

    let stats = app.engine().stats();
    assert_eq!(stats.failed_attempts, 3);
    assert_eq!(stats.abandoned, 1);
    assert_eq!(stats.succeeded, 0);

    app.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_transient_failure_recovers_on_retry() {
    std::env::remove_var(MAX_FAILS_ENV);
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let app = App::builder(fast_config()).build().unwrap();
    app.publish("email", &event(server.uri())).await;
    wait_idle(&app).await;

    let stats = app.engine().stats();
    assert_eq!(stats.failed_attempts, 1);
    assert_eq!(stats.succeeded, 1);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);

    app.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_invalid_address_never_reaches_the_engine() {
    let app = App::builder(fast_config()).build().unwrap();
    let report = app
        .publish("http", &event("ftp://files.example.com/drop".to_string()))
        .await;

    assert_eq!(report.delivered, 0);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].handler, "HTTP");
    assert_eq!(app.engine().stats().submitted, 0);

    app.shutdown().await;
}
