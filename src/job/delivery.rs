//! Posts a formatted payload to a webhook address.
//!
//! One `DeliveryJob` is registered with the engine per provider. The job is
//! stateless between attempts: everything it needs arrives in the parameter
//! envelope, and the HTTP clients are shared.

use super::{DeliveryParams, HttpClients, Job, JobContext, JobError, JobName, JobParameters};
use crate::config::DeliveryConfig;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Environment variable overriding [`DEFAULT_MAX_FAILS`].
pub const MAX_FAILS_ENV: &str = "WEBHOOK_JOB_MAX_RETRY";

/// With the engine's default backoff this keeps retrying for roughly an hour
/// and a half.
pub const DEFAULT_MAX_FAILS: u32 = 10;

/// Resolves the attempt limit from a raw override value.
pub fn max_fails_from(raw: Option<&str>) -> u32 {
    let Some(raw) = raw else {
        return DEFAULT_MAX_FAILS;
    };
    match raw.trim().parse::<u32>() {
        Ok(max_fails) => max_fails,
        Err(e) => {
            warn!(
                value = raw,
                error = %e,
                "Ignoring invalid {} override, using default of {}",
                MAX_FAILS_ENV,
                DEFAULT_MAX_FAILS
            );
            DEFAULT_MAX_FAILS
        }
    }
}

/// A single webhook delivery attempt.
pub struct DeliveryJob {
    name: JobName,
    clients: Arc<HttpClients>,
    rate_limit_interval: Duration,
}

impl DeliveryJob {
    /// Creates a job that pauses `rate_limit_interval` after every attempt.
    pub fn new(name: JobName, clients: Arc<HttpClients>, rate_limit_interval: Duration) -> Self {
        Self {
            name,
            clients,
            rate_limit_interval,
        }
    }

    /// Creates the job for a provider, pausing only for rate-limited ones.
    pub fn for_provider(name: JobName, clients: Arc<HttpClients>, config: &DeliveryConfig) -> Self {
        let interval = if name.is_rate_limited() {
            Duration::from_millis(config.rate_limit_interval_ms)
        } else {
            Duration::ZERO
        };
        Self::new(name, clients, interval)
    }

    pub fn name(&self) -> JobName {
        self.name
    }

    async fn execute(&self, params: &DeliveryParams) -> Result<(), JobError> {
        let client = self.clients.get(params.skip_cert_verify);
        let mut request = client
            .post(params.address.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(params.payload.clone());
        if let Some(auth) = &params.auth_header {
            request = request.header(AUTHORIZATION, auth);
        }

        let response = request.send().await.map_err(|source| JobError::Transport {
            address: params.address.to_string(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(JobError::RemoteRejected {
                address: params.address.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Job for DeliveryJob {
    fn max_fails(&self) -> u32 {
        max_fails_from(std::env::var(MAX_FAILS_ENV).ok().as_deref())
    }

    fn max_concurrency(&self) -> u32 {
        // The post-attempt pause only throttles a provider when attempts are
        // serialized, so rate-limited providers get exactly one slot.
        if self.name.is_rate_limited() {
            1
        } else {
            0
        }
    }

    fn should_retry(&self) -> bool {
        true
    }

    fn validate(&self, params: &JobParameters) -> Result<(), JobError> {
        DeliveryParams::from_parameters(params).map(|_| ())
    }

    #[instrument(skip_all, fields(job = %self.name, job_id = ctx.job_id(), attempt = ctx.attempt()))]
    async fn run(&self, ctx: &JobContext, params: &JobParameters) -> Result<(), JobError> {
        let params = DeliveryParams::from_parameters(params)?;
        debug!(address = %params.address, skip_cert_verify = params.skip_cert_verify, "Sending notification");
        metrics::counter!("delivery_attempts_total", "job" => self.name.as_str()).increment(1);

        let outcome = tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(JobError::Cancelled),
            outcome = self.execute(&params) => outcome,
        };

        match &outcome {
            Ok(()) => info!(address = %params.address, "Notification delivered"),
            Err(e) => {
                metrics::counter!("delivery_failures_total", "job" => self.name.as_str()).increment(1);
                error!(error = %e, "Notification delivery failed");
            }
        }

        if !self.rate_limit_interval.is_zero() {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => {}
                _ = tokio::time::sleep(self.rate_limit_interval) => {}
            }
        }
        outcome
    }
}
