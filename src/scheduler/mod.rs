//! The scheduling and dispatch engine.
//!
//! A single cooperative dispatch loop pairs the head of the admission queue
//! with the worker holding the most free capacity; every accepted job then
//! runs its blocking remote round-trip on its own task. Control operations
//! are safe to call concurrently from any task.
//!
//! Lock discipline: the queue, the pending registry and the pause flag share
//! one mutex whose critical sections are container mutations only. That lock
//! is never held across a store, worker, broadcast or SCM call. Worker
//! capacity counters live behind each worker's own lock.

pub mod build;
pub mod job;
pub mod pending;
pub mod queue;
pub mod selector;

pub use build::{Build, Provider, Repository};
pub use job::{Job, JobStatus};
pub use queue::AdmissionQueue;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};
use crate::notify::{Broadcaster, JobEvent, JOB_TOPIC};
use crate::scm::{CommitState, StatusReporter};
use crate::store::{BuildStore, JobStore};
use crate::worker::{JobAction, SlotReservation, Worker, WorkerJob, WorkerRegistry};

use pending::PendingJobs;
use selector::select_worker;

#[derive(Default)]
struct State {
    queue: AdmissionQueue,
    pending: PendingJobs,
    paused: bool,
}

struct Inner {
    config: SchedulerConfig,
    state: Mutex<State>,
    ready_tx: mpsc::Sender<()>,
    workers: Arc<dyn WorkerRegistry>,
    job_store: Arc<dyn JobStore>,
    build_store: Arc<dyn BuildStore>,
    broadcaster: Arc<dyn Broadcaster>,
    reporter: Arc<dyn StatusReporter>,
}

/// Handle to the scheduler. Cheap to clone; all clones share one engine.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Builds the scheduler and the receiving half of its ready signal.
    /// Hand the receiver to [`Scheduler::run`] on a dedicated task.
    pub fn new(
        config: SchedulerConfig,
        workers: Arc<dyn WorkerRegistry>,
        job_store: Arc<dyn JobStore>,
        build_store: Arc<dyn BuildStore>,
        broadcaster: Arc<dyn Broadcaster>,
        reporter: Arc<dyn StatusReporter>,
    ) -> (Self, mpsc::Receiver<()>) {
        let (ready_tx, ready_rx) = mpsc::channel(1);
        let scheduler = Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State::default()),
                ready_tx,
                workers,
                job_store,
                build_store,
                broadcaster,
                reporter,
            }),
        };
        (scheduler, ready_rx)
    }

    /// Runs the dispatch loop until `shutdown` is cancelled.
    ///
    /// Each wake performs at most one dispatch attempt. The periodic tick
    /// re-raises the ready signal, recovering from dropped signals and from
    /// capacity freed outside the scheduler's view.
    pub async fn run(&self, mut ready: mpsc::Receiver<()>, shutdown: CancellationToken) {
        info!("scheduler loop started");
        let mut tick = tokio::time::interval(self.inner.config.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("scheduler loop stopped");
                    return;
                }
                Some(()) = ready.recv() => {
                    self.dispatch().await;
                }
                _ = tick.tick() => {
                    self.signal();
                }
            }
        }
    }

    /// Deposit a ready token unless one is already pending. Every event that
    /// could make a dispatch possible funnels through here; at most one wake
    /// is ever outstanding.
    pub fn signal(&self) {
        let _ = self.inner.ready_tx.try_send(());
    }

    /// Admit a job, displacing any earlier instance with the same id.
    ///
    /// Admission never fails: persistence problems are logged and the job
    /// still queues.
    pub async fn next(&self, mut job: Job) {
        info!(job_id = job.id, build_id = job.build_id, "scheduling job");
        if let Err(e) = self.stop(job.id).await {
            debug!(job_id = job.id, error = %e, "pre-admission stop failed");
        }

        job.status = JobStatus::Queued;
        job.start_time = None;
        job.end_time = None;
        if let Err(e) = self.persist_job(&job).await {
            error!(job_id = job.id, error = %e, "error saving job");
        }

        self.state().queue.push(job);
        self.signal();
    }

    /// Cancel a queued or running job. Returns whether a job was actually
    /// stopped; an unknown id is not an error.
    pub async fn stop(&self, id: u64) -> Result<bool> {
        let queued = self.state().queue.remove(id);
        if let Some(mut job) = queued {
            info!(job_id = id, "job removed from queue");
            job.status = JobStatus::Failing;
            job.end_time = Some(Utc::now());
            if let Err(e) = self.persist_job(&job).await {
                error!(job_id = id, error = %e, "error saving job");
            }
            return Ok(true);
        }

        let pending = self.state().pending.get(id).cloned();
        let Some(entry) = pending else {
            return Ok(false);
        };
        let mut job = entry.job;
        let mut remote = entry.remote;

        let worker = match self.worker_by_id(&remote.worker_id).await {
            Ok(worker) => worker,
            Err(e) => {
                job.status = JobStatus::Failing;
                job.end_time = Some(Utc::now());
                if let Err(save_err) = self.persist_job(&job).await {
                    error!(job_id = id, error = %save_err, "error saving job");
                }
                return Err(e);
            }
        };

        remote.action = JobAction::Stop;
        let stopped = match worker.stop_job(remote).await {
            Ok(acked) => acked,
            Err(e) => {
                // The blocked lifecycle will not unwind through the remote
                // side now; take the entry out so the id does not linger.
                self.state().pending.remove(id);
                warn!(job_id = id, error = %e, "remote stop failed");
                false
            }
        };

        info!(job_id = id, "job stopped");
        job.status = JobStatus::Failing;
        job.end_time = Some(Utc::now());
        if let Err(e) = self.persist_job(&job).await {
            error!(job_id = id, error = %e, "error saving job");
        }
        Ok(stopped)
    }

    /// Reset a build's window and re-admit every one of its jobs in order.
    pub async fn restart_build(&self, id: u64) -> Result<()> {
        let mut build = self.inner.build_store.find(id).await?;
        build.start_time = None;
        build.end_time = None;
        if let Err(e) = self.inner.build_store.update(&build).await {
            error!(build_id = id, error = %e, "error saving build");
            return Err(e);
        }

        for child in &build.jobs {
            match self.inner.job_store.find(child.id).await {
                Ok(job) => self.next(job).await,
                Err(e) => warn!(job_id = child.id, error = %e, "skipping restart of missing job"),
            }
        }
        Ok(())
    }

    /// Stop every job of a build concurrently, then settle the build row.
    pub async fn stop_build(&self, id: u64) -> Result<()> {
        let build = self.inner.build_store.find(id).await?;

        let stops = build.jobs.iter().map(|job| self.stop(job.id));
        for (job, result) in build.jobs.iter().zip(futures::future::join_all(stops).await) {
            if let Err(e) = result {
                warn!(job_id = job.id, error = %e, "error stopping job");
            }
        }

        self.update_build_time(id).await
    }

    /// Stop admitting new dispatches. In-flight jobs keep running.
    pub fn pause(&self) {
        self.state().paused = true;
        info!("scheduler paused");
    }

    /// Resume dispatching.
    pub fn resume(&self) {
        self.state().paused = false;
        info!("scheduler resumed");
        self.signal();
    }

    /// Output accumulated so far by a running job.
    pub fn job_log(&self, id: u64) -> Result<String> {
        let state = self.state();
        match state.pending.get(id) {
            Some(entry) => Ok(entry.remote.log()),
            None => Err(SchedulerError::JobNotRunning(id)),
        }
    }

    /// One dispatch attempt: pair the best worker with the queue head and
    /// spawn the job lifecycle. Missing capacity or an empty queue is a
    /// no-op; the next signal or tick retries.
    async fn dispatch(&self) {
        if self.state().paused {
            return;
        }

        let workers = match self.inner.workers.list().await {
            Ok(workers) => workers,
            Err(e) => {
                warn!(error = %e, "worker registry unavailable");
                return;
            }
        };
        let Some(worker) = select_worker(&workers) else {
            return;
        };
        let Some(job) = self.state().queue.pop() else {
            return;
        };

        // Reserve before spawning: a later dispatch attempt must already see
        // this slot taken, or `running` could overshoot `max`.
        let slot = worker.reserve();

        info!(job_id = job.id, worker_id = worker.id(), "dispatching job");
        let scheduler = self.clone();
        tokio::spawn(async move {
            scheduler.run_job(job, worker, slot).await;
        });
    }

    /// Drives one job through its remote round-trip. The worker slot is
    /// held for the whole round-trip and given back on every exit path.
    async fn run_job(&self, mut job: Job, worker: Arc<Worker>, slot: SlotReservation) {
        self.state().queue.remove(job.id);

        job.status = JobStatus::Running;
        job.log.clear();
        job.start_time = Some(Utc::now());
        job.end_time = None;
        if let Err(e) = self.persist_job(&job).await {
            error!(job_id = job.id, error = %e, "error saving job");
        }

        let build = match self.inner.build_store.find(job.build_id).await {
            Ok(build) => build,
            Err(e) => {
                error!(
                    job_id = job.id,
                    build_id = job.build_id,
                    error = %e,
                    "cannot load build for dispatch"
                );
                job.status = JobStatus::Failing;
                job.end_time = Some(Utc::now());
                if let Err(save_err) = self.persist_job(&job).await {
                    error!(job_id = job.id, error = %save_err, "error saving job");
                }
                drop(slot);
                self.signal();
                return;
            }
        };

        let remote = WorkerJob::from_job(&job, &build, worker.id());
        self.state().pending.insert(job.clone(), remote.clone());

        let status = match worker.start_job(remote.clone()).await {
            Ok(status) if status.is_terminal() => status,
            Ok(status) => {
                warn!(job_id = job.id, %status, "worker returned non-terminal status");
                JobStatus::Failing
            }
            Err(e) => {
                error!(job_id = job.id, error = %e, "job errored on worker");
                JobStatus::Failing
            }
        };

        job.status = status;
        job.log = remote.log();
        job.end_time = Some(Utc::now());
        if let Err(e) = self.persist_job(&job).await {
            error!(job_id = job.id, error = %e, "error saving job");
            if job.log.len() > self.inner.config.log_retry_bytes {
                job.log = tail_bytes(&job.log, self.inner.config.log_retry_bytes).to_string();
                if let Err(retry_err) = self.persist_job(&job).await {
                    error!(job_id = job.id, error = %retry_err, "error saving truncated job");
                }
            }
        }

        self.state().pending.remove(job.id);
        drop(slot);
        self.signal();
    }

    /// Persist a job row, then fan out the side effects every persist
    /// carries: one job event broadcast and one build-aggregation pass.
    /// Returns the store error, if any; side-effect failures are logged.
    async fn persist_job(&self, job: &Job) -> Result<()> {
        let saved = self.inner.job_store.update(job).await;

        let broadcaster = Arc::clone(&self.inner.broadcaster);
        let event = JobEvent::from_job(job);
        tokio::spawn(async move {
            if let Err(e) = broadcaster.broadcast(JOB_TOPIC, event).await {
                debug!(error = %e, "job event dropped");
            }
        });

        if let Err(e) = self.update_build_time(job.build_id).await {
            warn!(build_id = job.build_id, error = %e, "build update failed");
        }

        saved
    }

    /// One aggregation pass: recompute the build window from its jobs and,
    /// on the transition to all-done, report the overall outcome upstream.
    /// A build whose window is already closed is left untouched.
    async fn update_build_time(&self, id: u64) -> Result<()> {
        let mut build = self.inner.build_store.find(id).await?;
        if build.start_time.is_some() && build.end_time.is_some() {
            return Ok(());
        }

        let mut all_done = true;
        let mut min_start = None;
        let mut max_end = None;
        for job in &build.jobs {
            match job.end_time {
                Some(end) => {
                    if max_end.map_or(true, |m| end > m) {
                        max_end = Some(end);
                    }
                }
                None => all_done = false,
            }
            if let Some(start) = job.start_time {
                if min_start.map_or(true, |m| start < m) {
                    min_start = Some(start);
                }
            }
        }

        if let Some(start) = min_start {
            build.start_time = Some(start);
            if let Err(e) = self.inner.build_store.update(&build).await {
                error!(build_id = id, error = %e, "error saving build");
                return Err(e);
            }
        }

        let Some(end) = max_end.filter(|_| all_done) else {
            return Ok(());
        };
        build.end_time = Some(end);
        if let Err(e) = self.inner.build_store.update(&build).await {
            error!(build_id = id, error = %e, "error saving build");
            return Err(e);
        }

        let success = build.jobs.iter().all(|job| job.status == JobStatus::Passing);
        let state = if success {
            CommitState::Success
        } else {
            CommitState::Error
        };
        self.send_status(&build, state).await
    }

    async fn send_status(&self, build: &Build, state: CommitState) -> Result<()> {
        let target_url = format!("{}/builds/{}", build.repository.provider.host, build.id);
        if let Err(e) = self
            .inner
            .reporter
            .create_status(&build.repository, &build.commit_sha, &target_url, state)
            .await
        {
            error!(build_id = build.id, error = %e, "error sending build status to scm provider");
            return Err(e);
        }
        debug!(repo = %build.repository.full_name, %state, "build status sent to scm provider");
        Ok(())
    }

    async fn worker_by_id(&self, id: &str) -> Result<Arc<Worker>> {
        let workers = self.inner.workers.list().await?;
        workers
            .into_iter()
            .find(|w| w.id() == id)
            .ok_or_else(|| SchedulerError::WorkerNotFound(id.to_string()))
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Trailing `max` bytes of `log`, nudged forward to the next char boundary.
fn tail_bytes(log: &str, max: usize) -> &str {
    if log.len() <= max {
        return log;
    }
    let mut cut = log.len() - max;
    while !log.is_char_boundary(cut) {
        cut += 1;
    }
    &log[cut..]
}
