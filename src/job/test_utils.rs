use crate::job::{
    DeliveryParams, Job, JobContext, JobDescription, JobError, JobParameters, JobSubmitter,
    SubmitError,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Job whose outcomes are scripted up front, for exercising the engine.
///
/// Each run pops the next scripted error; once the script is exhausted runs
/// succeed. Tracks how many attempts overlapped.
pub struct ScriptedJob {
    max_fails: u32,
    max_concurrency: u32,
    should_retry: bool,
    run_time: Duration,
    failures: Mutex<VecDeque<JobError>>,
    runs: AtomicU32,
    validations: AtomicU32,
    active: AtomicU32,
    peak: AtomicU32,
}

impl Default for ScriptedJob {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedJob {
    pub fn new() -> Self {
        Self {
            max_fails: 3,
            max_concurrency: 0,
            should_retry: true,
            run_time: Duration::ZERO,
            failures: Mutex::new(VecDeque::new()),
            runs: AtomicU32::new(0),
            validations: AtomicU32::new(0),
            active: AtomicU32::new(0),
            peak: AtomicU32::new(0),
        }
    }

    pub fn with_max_fails(mut self, max_fails: u32) -> Self {
        self.max_fails = max_fails;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: u32) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_should_retry(mut self, should_retry: bool) -> Self {
        self.should_retry = should_retry;
        self
    }

    /// How long each attempt takes.
    pub fn with_run_time(mut self, run_time: Duration) -> Self {
        self.run_time = run_time;
        self
    }

    /// Errors returned by the first attempts, in order.
    pub fn failing_with(self, errors: Vec<JobError>) -> Self {
        *self.failures.lock().unwrap() = errors.into();
        self
    }

    pub fn rejected(status: u16) -> JobError {
        JobError::RemoteRejected {
            address: "http://localhost/hook".to_string(),
            status,
        }
    }

    pub fn runs(&self) -> u32 {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn validations(&self) -> u32 {
        self.validations.load(Ordering::SeqCst)
    }

    /// Highest number of attempts observed running at the same time.
    pub fn peak_concurrency(&self) -> u32 {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Job for ScriptedJob {
    fn max_fails(&self) -> u32 {
        self.max_fails
    }

    fn max_concurrency(&self) -> u32 {
        self.max_concurrency
    }

    fn should_retry(&self) -> bool {
        self.should_retry
    }

    fn validate(&self, params: &JobParameters) -> Result<(), JobError> {
        self.validations.fetch_add(1, Ordering::SeqCst);
        DeliveryParams::from_parameters(params).map(|_| ())
    }

    async fn run(&self, ctx: &JobContext, _params: &JobParameters) -> Result<(), JobError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_active, Ordering::SeqCst);

        let cancelled = tokio::select! {
            biased;
            _ = ctx.cancelled() => true,
            _ = tokio::time::sleep(self.run_time) => false,
        };
        self.active.fetch_sub(1, Ordering::SeqCst);
        if cancelled {
            return Err(JobError::Cancelled);
        }

        match self.failures.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Submitter that records every job instead of running it.
#[derive(Default)]
pub struct RecordingSubmitter {
    submitted: Mutex<Vec<JobDescription>>,
    reject_with: Option<SubmitError>,
}

impl RecordingSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A submitter that refuses every job with `error`.
    pub fn rejecting(error: SubmitError) -> Self {
        Self {
            submitted: Mutex::new(Vec::new()),
            reject_with: Some(error),
        }
    }

    pub fn submitted(&self) -> Vec<JobDescription> {
        self.submitted.lock().unwrap().clone()
    }
}

impl JobSubmitter for RecordingSubmitter {
    fn submit(&self, job: JobDescription) -> Result<u64, SubmitError> {
        if let Some(err) = &self.reject_with {
            return Err(err.clone());
        }
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(job);
        Ok(submitted.len() as u64)
    }
}
