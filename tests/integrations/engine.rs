//! Concurrency limits of the job engine under a multi-worker pool.

use notifier::config::EngineConfig;
use notifier::job::test_utils::ScriptedJob;
use notifier::job::{
    DeliveryParams, JobDescription, JobEngine, JobName, JobSubmitter, SubmitError,
};
use notifier::task_manager::TaskManager;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn config(workers: usize) -> EngineConfig {
    EngineConfig {
        queue_capacity: 64,
        worker_count: workers,
        backoff_base_ms: 10,
        backoff_max_seconds: 1,
        backoff_jitter: 0.0,
    }
}

fn description(name: JobName) -> JobDescription {
    let params = DeliveryParams::new("{}".to_string(), "http://localhost/hook", false, None).unwrap();
    JobDescription::generic(name, params)
}

async fn drain(engine: &JobEngine) {
    tokio::time::timeout(Duration::from_secs(10), engine.wait_idle())
        .await
        .expect("engine did not become idle");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_max_concurrency_one_serializes_attempts() {
    let slack = Arc::new(
        ScriptedJob::new()
            .with_max_concurrency(1)
            .with_run_time(Duration::from_millis(30)),
    );
    let engine = JobEngine::builder(config(4))
        .register(JobName::Slack, slack.clone())
        .build();
    let manager = TaskManager::new();
    engine.start(&manager);

    for _ in 0..5 {
        engine.submit(description(JobName::Slack)).unwrap();
    }
    drain(&engine).await;

    assert_eq!(slack.runs(), 5);
    assert_eq!(slack.peak_concurrency(), 1);
    assert_eq!(engine.stats().succeeded, 5);
    manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unbounded_jobs_run_in_parallel() {
    let webhook = Arc::new(ScriptedJob::new().with_run_time(Duration::from_millis(200)));
    let engine = JobEngine::builder(config(4))
        .register(JobName::Webhook, webhook.clone())
        .build();
    let manager = TaskManager::new();
    engine.start(&manager);

    for _ in 0..4 {
        engine.submit(description(JobName::Webhook)).unwrap();
    }
    drain(&engine).await;

    assert_eq!(webhook.runs(), 4);
    assert!(webhook.peak_concurrency() > 1);
    manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_limit_applies_per_job_name() {
    let slack = Arc::new(
        ScriptedJob::new()
            .with_max_concurrency(1)
            .with_run_time(Duration::from_millis(100)),
    );
    let teams = Arc::new(
        ScriptedJob::new()
            .with_max_concurrency(1)
            .with_run_time(Duration::from_millis(100)),
    );
    let engine = JobEngine::builder(config(4))
        .register(JobName::Slack, slack.clone())
        .register(JobName::MsTeams, teams.clone())
        .build();
    let manager = TaskManager::new();
    engine.start(&manager);

    let started = std::time::Instant::now();
    for _ in 0..2 {
        engine.submit(description(JobName::Slack)).unwrap();
        engine.submit(description(JobName::MsTeams)).unwrap();
    }
    drain(&engine).await;

    assert_eq!(slack.peak_concurrency(), 1);
    assert_eq!(teams.peak_concurrency(), 1);
    // Two serialized attempts per name, with both names progressing together.
    assert!(started.elapsed() < Duration::from_millis(390));
    manager.shutdown().await;
}

#[tokio::test]
async fn test_submitted_jobs_get_distinct_ids() {
    let engine = JobEngine::builder(config(1))
        .register(JobName::Email, Arc::new(ScriptedJob::new()))
        .build();

    let ids: HashSet<u64> = (0..10)
        .map(|_| engine.submit(description(JobName::Email)).unwrap())
        .collect();

    assert_eq!(ids.len(), 10);
    assert_eq!(engine.queue_len(), 10);
    assert_eq!(engine.stats().submitted, 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_limited_backlog_does_not_starve_unbounded_jobs() {
    let slack = Arc::new(
        ScriptedJob::new()
            .with_max_concurrency(1)
            .with_run_time(Duration::from_millis(300)),
    );
    let webhook = Arc::new(ScriptedJob::new());
    let engine = JobEngine::builder(config(2))
        .register(JobName::Slack, slack.clone())
        .register(JobName::Webhook, webhook.clone())
        .build();
    let manager = TaskManager::new();
    engine.start(&manager);

    let started = std::time::Instant::now();
    for _ in 0..3 {
        engine.submit(description(JobName::Slack)).unwrap();
    }
    engine.submit(description(JobName::Webhook)).unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while webhook.runs() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("webhook job never ran");

    // Only the first Slack attempt may have started; the rest wait parked.
    assert!(started.elapsed() < Duration::from_millis(250));
    assert_eq!(slack.runs(), 1);

    drain(&engine).await;
    assert_eq!(slack.runs(), 3);
    assert_eq!(slack.peak_concurrency(), 1);
    manager.shutdown().await;
}

#[tokio::test]
async fn test_submit_after_shutdown_is_refused() {
    let engine = JobEngine::builder(config(2))
        .register(JobName::Webhook, Arc::new(ScriptedJob::new()))
        .build();
    let manager = TaskManager::new();
    engine.start(&manager);

    manager.shutdown().await;

    assert!(engine.is_closed());
    assert_eq!(
        engine.submit(description(JobName::Webhook)),
        Err(SubmitError::Closed)
    );
    assert_eq!(engine.stats().submitted, 0);
    tokio::time::timeout(Duration::from_millis(100), engine.wait_idle())
        .await
        .expect("refused submission left the engine busy");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_cancels_queued_and_parked_jobs() {
    let slack = Arc::new(
        ScriptedJob::new()
            .with_max_concurrency(1)
            .with_run_time(Duration::from_secs(30)),
    );
    let webhook = Arc::new(ScriptedJob::new().with_run_time(Duration::from_secs(30)));
    let engine = JobEngine::builder(config(2))
        .register(JobName::Slack, slack.clone())
        .register(JobName::Webhook, webhook.clone())
        .build();
    let manager = TaskManager::new();
    engine.start(&manager);

    for _ in 0..3 {
        engine.submit(description(JobName::Slack)).unwrap();
    }
    for _ in 0..3 {
        engine.submit(description(JobName::Webhook)).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    manager.shutdown().await;
    tokio::time::timeout(Duration::from_secs(1), engine.wait_idle())
        .await
        .expect("jobs left in flight after shutdown");

    let stats = engine.stats();
    assert_eq!(stats.submitted, 6);
    assert_eq!(stats.cancelled, 6);
    assert_eq!(stats.succeeded + stats.failed_attempts + stats.abandoned, 0);
    assert_eq!(engine.queue_len(), 0);
}

