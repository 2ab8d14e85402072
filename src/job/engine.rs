//! In-process job engine.
//!
//! Jobs wait in a bounded queue and are executed by a pool of worker tasks.
//! The engine enforces each job's policy: `validate` before every attempt,
//! at most `max_concurrency` simultaneous attempts per job name, and
//! exponential backoff between attempts until `max_fails` is reached.
//!
//! A job whose name has no free concurrency slot is parked on that name's
//! ready queue instead of holding a worker; whoever holds a slot runs the
//! parked jobs in order. Nothing is persisted: once the last worker exits,
//! the queue is closed and every queued, parked or backing-off job is
//! counted as cancelled.

use super::retry::BackoffPolicy;
use super::{Job, JobContext, JobDescription, JobError, JobName, JobParameters, JobSubmitter, SubmitError};
use crate::config::EngineConfig;
use crate::task_manager::TaskManager;
use async_channel::{Receiver, Sender, TrySendError};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, error, info, warn};

/// Snapshot of the engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed_attempts: u64,
    pub abandoned: u64,
    pub cancelled: u64,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed_attempts: AtomicU64,
    abandoned: AtomicU64,
    cancelled: AtomicU64,
}

struct QueuedJob {
    id: u64,
    name: JobName,
    params: JobParameters,
    failures: u32,
}

/// Admission control for a job name with a concurrency limit.
struct Slots {
    permits: Arc<Semaphore>,
    parked: Mutex<VecDeque<QueuedJob>>,
}

impl Slots {
    fn new(limit: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            parked: Mutex::new(VecDeque::new()),
        }
    }

    fn parked(&self) -> std::sync::MutexGuard<'_, VecDeque<QueuedJob>> {
        self.parked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct RegisteredJob {
    job: Arc<dyn Job>,
    slots: Option<Slots>,
}

struct EngineInner {
    jobs: HashMap<JobName, RegisteredJob>,
    tx: Sender<QueuedJob>,
    rx: Receiver<QueuedJob>,
    backoff: BackoffPolicy,
    worker_count: usize,
    live_workers: AtomicUsize,
    next_id: AtomicU64,
    in_flight: AtomicUsize,
    idle: Notify,
    counters: Counters,
}

/// Builder registering the job implementations an engine can run.
pub struct JobEngineBuilder {
    config: EngineConfig,
    jobs: HashMap<JobName, Arc<dyn Job>>,
}

impl JobEngineBuilder {
    /// Registers the implementation run for jobs submitted under `name`.
    pub fn register(mut self, name: JobName, job: Arc<dyn Job>) -> Self {
        self.jobs.insert(name, job);
        self
    }

    pub fn build(self) -> JobEngine {
        let (tx, rx) = async_channel::bounded(self.config.queue_capacity.max(1));
        let jobs = self
            .jobs
            .into_iter()
            .map(|(name, job)| {
                let slots = match job.max_concurrency() {
                    0 => None,
                    n => Some(Slots::new(n as usize)),
                };
                (name, RegisteredJob { job, slots })
            })
            .collect();

        JobEngine {
            inner: Arc::new(EngineInner {
                jobs,
                tx,
                rx,
                backoff: BackoffPolicy::from(&self.config),
                worker_count: self.config.worker_count.max(1),
                live_workers: AtomicUsize::new(0),
                next_id: AtomicU64::new(0),
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
                counters: Counters::default(),
            }),
        }
    }
}

/// Handle to the engine. Cheap to clone; all clones share one queue.
#[derive(Clone)]
pub struct JobEngine {
    inner: Arc<EngineInner>,
}

impl JobEngine {
    pub fn builder(config: EngineConfig) -> JobEngineBuilder {
        JobEngineBuilder {
            config,
            jobs: HashMap::new(),
        }
    }

    /// Spawns the worker pool on the task manager.
    ///
    /// Retry timers are spawned on the same manager, so its shutdown waits
    /// for them too.
    pub fn start(&self, task_manager: &TaskManager) {
        info!(workers = self.inner.worker_count, "Starting job engine");
        self.inner
            .live_workers
            .fetch_add(self.inner.worker_count, Ordering::SeqCst);
        for worker_id in 0..self.inner.worker_count {
            let engine = self.clone();
            task_manager.spawn(
                format!("job-worker-{}", worker_id),
                engine.run_worker(worker_id, task_manager.clone()),
            );
        }
    }

    /// Waits until every submitted job has succeeded, been abandoned or been
    /// cancelled.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn stats(&self) -> EngineStats {
        let c = &self.inner.counters;
        EngineStats {
            submitted: c.submitted.load(Ordering::Relaxed),
            succeeded: c.succeeded.load(Ordering::Relaxed),
            failed_attempts: c.failed_attempts.load(Ordering::Relaxed),
            abandoned: c.abandoned.load(Ordering::Relaxed),
            cancelled: c.cancelled.load(Ordering::Relaxed),
        }
    }

    /// Jobs currently waiting for a worker.
    pub fn queue_len(&self) -> usize {
        self.inner.rx.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.tx.is_closed()
    }

    async fn run_worker(self, worker_id: usize, task_manager: TaskManager) {
        debug!(worker_id, "Job worker started");
        let mut shutdown_rx = task_manager.shutdown_rx();
        loop {
            let queued = tokio::select! {
                biased;
                _ = shutdown_rx.wait_for(|stop| *stop) => break,
                next = self.inner.rx.recv() => match next {
                    Ok(queued) => queued,
                    Err(_) => break,
                },
            };
            self.process(queued, &task_manager).await;
        }
        debug!(worker_id, "Job worker stopped");

        if self.inner.live_workers.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.close_and_drain();
        }
    }

    /// Refuses further submissions and cancels everything still waiting.
    fn close_and_drain(&self) {
        self.inner.tx.close();
        let mut dropped = 0;
        while let Ok(queued) = self.inner.rx.try_recv() {
            self.cancel(&queued);
            dropped += 1;
        }
        for registered in self.inner.jobs.values() {
            let Some(slots) = &registered.slots else {
                continue;
            };
            let parked: Vec<QueuedJob> = slots.parked().drain(..).collect();
            for queued in &parked {
                self.cancel(queued);
            }
            dropped += parked.len();
        }
        info!(dropped, "Job queue closed");
    }

    async fn process(&self, queued: QueuedJob, task_manager: &TaskManager) {
        let Some(registered) = self.inner.jobs.get(&queued.name) else {
            error!(job_id = queued.id, job = %queued.name, "No implementation registered, dropping job");
            self.abandon();
            return;
        };

        if let Err(e) = registered.job.validate(&queued.params) {
            error!(job_id = queued.id, job = %queued.name, error = %e, "Job parameters rejected, dropping job");
            self.abandon();
            return;
        }

        match &registered.slots {
            None => self.attempt(&registered.job, queued, task_manager).await,
            Some(slots) => self.run_limited(&registered.job, slots, queued, task_manager).await,
        }
    }

    /// Parks `queued`, then runs parked jobs for as long as a slot is free.
    ///
    /// A worker that finds every slot taken returns at once; the slot holder
    /// re-checks the ready queue after releasing its permit, so no parked job
    /// is left behind.
    async fn run_limited(
        &self,
        job: &Arc<dyn Job>,
        slots: &Slots,
        queued: QueuedJob,
        task_manager: &TaskManager,
    ) {
        slots.parked().push_back(queued);
        loop {
            if task_manager.is_shutting_down() {
                return;
            }
            let Ok(permit) = slots.permits.clone().try_acquire_owned() else {
                return;
            };
            let next = slots.parked().pop_front();
            match next {
                Some(next) => {
                    self.attempt(job, next, task_manager).await;
                    drop(permit);
                }
                None => {
                    drop(permit);
                    if slots.parked().is_empty() {
                        return;
                    }
                }
            }
        }
    }

    async fn attempt(&self, job: &Arc<dyn Job>, mut queued: QueuedJob, task_manager: &TaskManager) {
        let ctx = JobContext::new(queued.id, queued.failures + 1, task_manager.shutdown_rx());
        let result = job.run(&ctx, &queued.params).await;

        match result {
            Ok(()) => {
                self.inner.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                debug!(job_id = queued.id, job = %queued.name, attempt = ctx.attempt(), "Job succeeded");
                self.finish_one();
            }
            // A cancelled attempt is not a failure.
            Err(JobError::Cancelled) => self.cancel(&queued),
            Err(e) => {
                self.inner.counters.failed_attempts.fetch_add(1, Ordering::Relaxed);
                queued.failures += 1;
                let max_fails = job.max_fails();
                if job.should_retry() && e.is_retryable() && queued.failures < max_fails {
                    let delay = self.inner.backoff.delay_for(queued.failures);
                    warn!(
                        job_id = queued.id,
                        job = %queued.name,
                        failures = queued.failures,
                        max_fails,
                        error = %e,
                        "Job attempt failed, retrying in {:?}",
                        delay
                    );
                    self.schedule_retry(queued, delay, task_manager);
                } else {
                    error!(
                        job_id = queued.id,
                        job = %queued.name,
                        failures = queued.failures,
                        error = %e,
                        "Giving up on job"
                    );
                    metrics::counter!("jobs_abandoned_total", "job" => queued.name.as_str()).increment(1);
                    self.abandon();
                }
            }
        }
    }

    fn schedule_retry(&self, queued: QueuedJob, delay: Duration, task_manager: &TaskManager) {
        if task_manager.is_shutting_down() {
            self.cancel(&queued);
            return;
        }
        let engine = self.clone();
        let mut shutdown_rx = task_manager.shutdown_rx();
        task_manager.spawn(format!("job-retry-{}", queued.id), async move {
            tokio::select! {
                biased;
                _ = shutdown_rx.wait_for(|stop| *stop) => {
                    engine.cancel(&queued);
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
            let id = queued.id;
            tokio::select! {
                biased;
                _ = shutdown_rx.wait_for(|stop| *stop) => {
                    debug!(job_id = id, "Retry dropped at shutdown");
                    engine.inner.counters.cancelled.fetch_add(1, Ordering::Relaxed);
                    engine.finish_one();
                }
                sent = engine.inner.tx.send(queued) => {
                    // The queue only closes at shutdown.
                    if let Err(async_channel::SendError(queued)) = sent {
                        engine.cancel(&queued);
                    }
                }
            }
        });
    }

    fn cancel(&self, queued: &QueuedJob) {
        info!(job_id = queued.id, job = %queued.name, "Job cancelled");
        self.inner.counters.cancelled.fetch_add(1, Ordering::Relaxed);
        self.finish_one();
    }

    fn abandon(&self) {
        self.inner.counters.abandoned.fetch_add(1, Ordering::Relaxed);
        self.finish_one();
    }

    fn finish_one(&self) {
        if self.inner.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

impl JobSubmitter for JobEngine {
    fn submit(&self, job: JobDescription) -> Result<u64, SubmitError> {
        if !self.inner.jobs.contains_key(&job.name) {
            return Err(SubmitError::UnknownJob(job.name));
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let queued = QueuedJob {
            id,
            name: job.name,
            params: job.parameters(),
            failures: 0,
        };

        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        match self.inner.tx.try_send(queued) {
            Ok(()) => {
                self.inner.counters.submitted.fetch_add(1, Ordering::Relaxed);
                debug!(job_id = id, job = %job.name, "Job queued");
                Ok(id)
            }
            Err(e) => {
                self.finish_one();
                match e {
                    TrySendError::Full(_) => Err(SubmitError::QueueFull),
                    TrySendError::Closed(_) => Err(SubmitError::Closed),
                }
            }
        }
    }
}
