//! Delivery jobs and the contract between them and the job engine.
//!
//! Handlers build a typed [`JobDescription`] and hand it to a
//! [`JobSubmitter`]. The engine only sees the untyped [`JobParameters`]
//! envelope and drives a [`Job`] through validation, execution and retries.

pub mod delivery;
pub mod engine;
pub mod http;
pub mod retry;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use tokio::sync::watch;

pub use delivery::DeliveryJob;
pub use engine::{EngineStats, JobEngine};
pub use http::HttpClients;

/// Untyped parameter envelope exchanged with the job engine.
pub type JobParameters = serde_json::Map<String, Value>;

/// How the engine schedules a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    Generic,
    Periodic,
}

/// Identifies which job implementation the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobName {
    Webhook,
    Slack,
    MsTeams,
    Email,
}

impl JobName {
    pub const ALL: [JobName; 4] = [
        JobName::Webhook,
        JobName::Slack,
        JobName::MsTeams,
        JobName::Email,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobName::Webhook => "WEBHOOK",
            JobName::Slack => "SLACK",
            JobName::MsTeams => "MSTEAMS",
            JobName::Email => "EMAIL",
        }
    }

    /// Providers that throttle a single incoming-webhook URL.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, JobName::Slack | JobName::MsTeams)
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed parameters of one HTTP delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryParams {
    pub payload: String,
    pub address: Url,
    pub skip_cert_verify: bool,
    pub auth_header: Option<String>,
}

impl DeliveryParams {
    /// Builds the parameters, rejecting anything that is not an HTTP(S) URL.
    pub fn new(
        payload: String,
        address: &str,
        skip_cert_verify: bool,
        auth_header: Option<String>,
    ) -> Result<Self, JobError> {
        Ok(Self {
            payload,
            address: parse_address(address)?,
            skip_cert_verify,
            auth_header,
        })
    }

    /// Serializes into the engine envelope.
    pub fn to_parameters(&self) -> JobParameters {
        let mut params = JobParameters::new();
        params.insert("payload".into(), Value::String(self.payload.clone()));
        params.insert("address".into(), Value::String(self.address.to_string()));
        params.insert("skip_cert_verify".into(), Value::Bool(self.skip_cert_verify));
        if let Some(auth) = &self.auth_header {
            params.insert("auth_header".into(), Value::String(auth.clone()));
        }
        params
    }

    /// Reads the parameters back out of an engine envelope.
    pub fn from_parameters(params: &JobParameters) -> Result<Self, JobError> {
        let payload = required_str(params, "payload")?;
        let address = required_str(params, "address")?;

        let skip_cert_verify = match params.get("skip_cert_verify") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(skip)) => *skip,
            Some(other) => return Err(JobError::malformed("skip_cert_verify", "bool", other)),
        };
        let auth_header = match params.get("auth_header") {
            None | Some(Value::Null) => None,
            Some(Value::String(auth)) => Some(auth.clone()),
            Some(other) => return Err(JobError::malformed("auth_header", "string", other)),
        };

        Self::new(payload.to_string(), address, skip_cert_verify, auth_header)
    }
}

fn required_str<'a>(params: &'a JobParameters, name: &'static str) -> Result<&'a str, JobError> {
    match params.get(name) {
        None => Err(JobError::MissingParameter(name)),
        Some(Value::String(value)) => Ok(value),
        Some(other) => Err(JobError::malformed(name, "string", other)),
    }
}

fn parse_address(address: &str) -> Result<Url, JobError> {
    let url = Url::parse(address).map_err(|_| JobError::MalformedParameter {
        name: "address",
        expected: "HTTP(S) URL",
        found: address.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(JobError::MalformedParameter {
            name: "address",
            expected: "HTTP(S) URL",
            found: address.to_string(),
        }),
    }
}

/// A job handed to the engine. Owned by the engine once submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDescription {
    pub kind: JobKind,
    pub name: JobName,
    pub params: DeliveryParams,
}

impl JobDescription {
    pub fn generic(name: JobName, params: DeliveryParams) -> Self {
        Self {
            kind: JobKind::Generic,
            name,
            params,
        }
    }

    pub fn parameters(&self) -> JobParameters {
        self.params.to_parameters()
    }
}

/// Per-attempt execution context supplied by the engine.
#[derive(Debug, Clone)]
pub struct JobContext {
    job_id: u64,
    attempt: u32,
    shutdown_rx: watch::Receiver<bool>,
}

impl JobContext {
    pub fn new(job_id: u64, attempt: u32, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            job_id,
            attempt,
            shutdown_rx,
        }
    }

    /// A context that is never cancelled, for running a job outside an engine.
    pub fn detached(job_id: u64) -> Self {
        let (_tx, rx) = watch::channel(false);
        Self::new(job_id, 1, rx)
    }

    pub fn job_id(&self) -> u64 {
        self.job_id
    }

    /// 1-based attempt number.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_cancelled(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Resolves once the engine asks running jobs to stop.
    pub async fn cancelled(&self) {
        let mut rx = self.shutdown_rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender gone without a shutdown: nothing will ever cancel us.
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Errors produced while validating or running a job.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("missing job parameter '{0}'")]
    MissingParameter(&'static str),

    #[error("malformed job parameter '{name}', expecting {expected} but got {found}")]
    MalformedParameter {
        name: &'static str,
        expected: &'static str,
        found: String,
    },

    #[error("request to {address} failed: {source}")]
    Transport {
        address: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("job(target: {address}) response code is {status}")]
    RemoteRejected { address: String, status: u16 },

    #[error("job attempt cancelled")]
    Cancelled,
}

impl JobError {
    fn malformed(name: &'static str, expected: &'static str, found: &Value) -> Self {
        let found = match found {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        };
        Self::MalformedParameter {
            name,
            expected,
            found: found.to_string(),
        }
    }

    /// Network failures and non-2xx answers are often transient; everything
    /// else points at a construction bug upstream.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::RemoteRejected { .. })
    }
}

/// Errors returned when the engine refuses a job.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("job queue is full")]
    QueueFull,

    #[error("job engine is shut down")]
    Closed,

    #[error("no job registered under {0}")]
    UnknownJob(JobName),
}

/// The job-submission boundary. Must not block the caller.
pub trait JobSubmitter: Send + Sync {
    /// Queues a job and returns its engine-assigned id.
    fn submit(&self, job: JobDescription) -> Result<u64, SubmitError>;
}

/// The contract the job engine drives.
#[async_trait]
pub trait Job: Send + Sync {
    /// Attempts allowed before the job is abandoned.
    fn max_fails(&self) -> u32;

    /// Instances of this job that may run at once across the engine; 0 means
    /// unbounded.
    fn max_concurrency(&self) -> u32;

    /// Whether failed attempts may be rescheduled.
    fn should_retry(&self) -> bool;

    /// Checks the parameter envelope. Runs before every attempt.
    fn validate(&self, params: &JobParameters) -> Result<(), JobError>;

    /// Executes one attempt.
    async fn run(&self, ctx: &JobContext, params: &JobParameters) -> Result<(), JobError>;
}
