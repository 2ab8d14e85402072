//! Notifier - publishes a lifecycle event to the handlers of a topic.

use anyhow::{Context, Result};
use clap::Parser;
use notifier::{app::App, cli::Cli, config::Config, core::Event};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = Config::load(&cli).unwrap_or_else(|err| {
        eprintln!("Failed to load configuration: {:#}", err);
        std::process::exit(1);
    });

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.core.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Notifier starting up...");
    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.core.log_level);
    info!("Workers: {}", config.engine.worker_count);
    info!("Queue Capacity: {}", config.engine.queue_capacity);
    info!("HTTP Timeout: {}s", config.http.timeout_seconds);
    info!(
        "Rate Limit Interval: {}ms",
        config.delivery.rate_limit_interval_ms
    );
    info!("-------------------------------------------------------");

    let raw = std::fs::read_to_string(&cli.event)
        .with_context(|| format!("Failed to read event file {}", cli.event.display()))?;
    let event: Event = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse event file {}", cli.event.display()))?;

    let app = App::builder(config).build()?;

    let report = app.publish(&cli.topic, &event).await;
    if report.handler_count() == 0 {
        warn!(topic = %cli.topic, "No handlers subscribed to topic");
    }
    for failure in &report.failures {
        error!(handler = %failure.handler, error = %failure.error, "Handler failed");
    }
    info!(
        topic = %report.topic,
        delivered = report.delivered,
        failed = report.failures.len(),
        "Event published"
    );

    tokio::select! {
        _ = app.engine().wait_idle() => info!("All delivery jobs finished."),
        _ = tokio::signal::ctrl_c() => info!("Ctrl-C received, abandoning pending deliveries."),
    }

    let stats = app.engine().stats();
    info!(
        succeeded = stats.succeeded,
        failed_attempts = stats.failed_attempts,
        abandoned = stats.abandoned,
        cancelled = stats.cancelled,
        "Delivery summary"
    );

    app.shutdown().await;
    Ok(())
}
