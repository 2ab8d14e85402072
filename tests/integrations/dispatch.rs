//! Fan-out through real provider handlers into a recording submitter.

use chrono::Utc;
use notifier::core::{Event, NotificationHandler, Target};
use notifier::dispatcher::Dispatcher;
use notifier::job::test_utils::RecordingSubmitter;
use notifier::job::{JobName, JobSubmitter};
use notifier::notification::test_utils::RecordingHandler;
use notifier::notification::{HttpHandler, SlackHandler};
use notifier::topic::{default_registry, TopicRegistry};
use serde_json::{json, Value};
use std::sync::Arc;

fn event() -> Event {
    Event {
        event_type: "SCANNING_COMPLETED".to_string(),
        occur_at: Utc::now(),
        operator: "scanner".to_string(),
        event_data: json!({"critical": 2, "high": 7, "report": {"id": "r-1"}}),
        target: Target {
            address: "https://hooks.example.com/services/T000".to_string(),
            ..Default::default()
        },
    }
}

#[tokio::test]
async fn test_every_handler_runs_exactly_once_despite_failures() {
    let submitter = Arc::new(RecordingSubmitter::new());
    let shared: Arc<dyn JobSubmitter> = submitter.clone();
    let broken = Arc::new(RecordingHandler::new("broken").failing());

    let mut builder = TopicRegistry::builder();
    builder
        .subscribe("audit", Arc::new(HttpHandler::new(shared.clone())))
        .unwrap()
        .subscribe("audit", broken.clone())
        .unwrap()
        .subscribe("audit", Arc::new(SlackHandler::new(shared)))
        .unwrap();
    let dispatcher = Dispatcher::new(builder.build());

    let report = dispatcher.publish("audit", &event()).await;

    assert_eq!(report.delivered, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(broken.calls(), 1);

    let names: Vec<JobName> = submitter.submitted().iter().map(|job| job.name).collect();
    assert_eq!(names, vec![JobName::Webhook, JobName::Slack]);
}

#[tokio::test]
async fn test_default_registry_builds_provider_payloads() {
    let submitter = Arc::new(RecordingSubmitter::new());
    let dispatcher = Dispatcher::new(default_registry(submitter.clone()));

    for topic in ["http", "slack", "teams", "email"] {
        let report = dispatcher.publish(topic, &event()).await;
        assert_eq!(report.delivered, 1, "topic {topic}");
    }

    let jobs = submitter.submitted();
    let payloads: Vec<Value> = jobs
        .iter()
        .map(|job| serde_json::from_str(&job.params.payload).unwrap())
        .collect();

    assert_eq!(payloads[0]["type"], "SCANNING_COMPLETED");
    assert!(payloads[1]["blocks"].is_array());
    assert_eq!(payloads[2]["title"], "SCANNING_COMPLETED");
    assert_eq!(payloads[3]["subject"], "[SCANNING_COMPLETED] event notification");

    let names: Vec<JobName> = jobs.iter().map(|job| job.name).collect();
    assert_eq!(
        names,
        vec![JobName::Webhook, JobName::Slack, JobName::MsTeams, JobName::Email]
    );
}

#[tokio::test]
async fn test_unknown_topic_submits_nothing() {
    let submitter = Arc::new(RecordingSubmitter::new());
    let dispatcher = Dispatcher::new(default_registry(submitter.clone()));

    let report = dispatcher.publish("pagerduty", &event()).await;

    assert_eq!(report.handler_count(), 0);
    assert!(submitter.submitted().is_empty());
}

#[tokio::test]
async fn test_registry_is_shared_between_dispatchers() {
    let handler = Arc::new(RecordingHandler::new("counter"));
    let mut builder = TopicRegistry::builder();
    builder.subscribe("http", handler.clone()).unwrap();
    let registry = builder.build();

    let first = Dispatcher::new(registry.clone());
    let second = Dispatcher::new(registry);
    let event = event();
    tokio::join!(first.publish("http", &event), second.publish("http", &event));

    assert_eq!(handler.calls(), 2);
    assert_eq!(handler.name(), "counter");
}
