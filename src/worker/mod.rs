//! Worker handles and the transport seam towards worker nodes.
//!
//! The scheduler never talks to a worker process directly; it holds
//! [`Worker`] handles obtained from a [`WorkerRegistry`] and issues blocking
//! `start_job`/`stop_job` calls through the worker's [`WorkerTransport`].
//! Capacity accounting (`max`/`running`) lives on the handle, behind the
//! worker's own lock, because other subsystems share the same handles.

pub mod local;
pub mod registry;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::scheduler::build::Build;
use crate::scheduler::job::{Job, JobStatus};

/// What the remote side is asked to do with a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobAction {
    Start,
    Stop,
}

/// Wire descriptor handed to a worker for one job run.
///
/// The log buffer is shared between the scheduler and the transport: the
/// transport appends chunks as they arrive, so the current output can be
/// read while the remote call is still blocked.
#[derive(Debug, Clone)]
pub struct WorkerJob {
    pub job_id: u64,
    pub build_id: u64,
    pub commands: Vec<String>,
    pub image: String,
    pub env: HashMap<String, String>,
    pub repo_url: String,
    pub provider_name: String,
    pub provider_url: String,
    pub provider_token: String,
    pub git_ref: String,
    pub commit_sha: String,
    pub repo_name: String,
    pub action: JobAction,
    pub worker_id: String,
    log: Arc<Mutex<Vec<String>>>,
}

impl WorkerJob {
    pub fn from_job(job: &Job, build: &Build, worker_id: &str) -> Self {
        Self {
            job_id: job.id,
            build_id: job.build_id,
            commands: job.commands.clone(),
            image: job.image.clone(),
            env: job.env.clone(),
            repo_url: build.repository.url.clone(),
            provider_name: build.repository.provider.name.clone(),
            provider_url: build.repository.provider.url.clone(),
            provider_token: build.repository.provider.access_token.clone(),
            git_ref: build.git_ref.clone(),
            commit_sha: build.commit_sha.clone(),
            repo_name: build.repository.full_name.clone(),
            action: JobAction::Start,
            worker_id: worker_id.to_string(),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Append one chunk of remote output.
    pub fn append_log(&self, chunk: impl Into<String>) {
        self.log_guard().push(chunk.into());
    }

    /// The output accumulated so far, joined in arrival order.
    pub fn log(&self) -> String {
        self.log_guard().concat()
    }

    fn log_guard(&self) -> MutexGuard<'_, Vec<String>> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Remote calls a worker node answers. `start_job` blocks for the lifetime
/// of the job on the remote side.
#[async_trait]
pub trait WorkerTransport: Send + Sync {
    /// Returns the terminal status once the remote job ends. Output chunks
    /// are appended to the descriptor's log buffer as they arrive.
    async fn start_job(&self, job: WorkerJob) -> Result<JobStatus>;

    /// Asks the remote side to kill a running job; returns whether it
    /// acknowledged.
    async fn stop_job(&self, job: WorkerJob) -> Result<bool>;
}

/// Source of the currently registered workers.
#[async_trait]
pub trait WorkerRegistry: Send + Sync {
    async fn list(&self) -> Result<Vec<Arc<Worker>>>;
}

#[derive(Debug, Clone, Copy)]
struct Usage {
    max: i32,
    running: i32,
}

/// Remote executor handle with a bounded number of concurrent job slots.
pub struct Worker {
    id: String,
    usage: Mutex<Usage>,
    transport: Arc<dyn WorkerTransport>,
}

impl Worker {
    pub fn new(id: impl Into<String>, max: i32, transport: Arc<dyn WorkerTransport>) -> Self {
        Self {
            id: id.into(),
            usage: Mutex::new(Usage { max, running: 0 }),
            transport,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Free job slots: `max - running`. Negative when the counters are off.
    pub fn free_slots(&self) -> i32 {
        let usage = self.usage_guard();
        usage.max - usage.running
    }

    pub fn max(&self) -> i32 {
        self.usage_guard().max
    }

    pub fn running(&self) -> i32 {
        self.usage_guard().running
    }

    /// Claim one slot. The returned guard gives the slot back on drop, so a
    /// job lifecycle cannot leak capacity however it exits.
    pub fn reserve(self: &Arc<Self>) -> SlotReservation {
        self.usage_guard().running += 1;
        SlotReservation {
            worker: Arc::clone(self),
        }
    }

    /// Dispatch the job and block until the remote side terminates it.
    pub async fn start_job(&self, job: WorkerJob) -> Result<JobStatus> {
        self.transport.start_job(job).await
    }

    /// Ask the remote side to kill a running job.
    pub async fn stop_job(&self, job: WorkerJob) -> Result<bool> {
        self.transport.stop_job(job).await
    }

    fn usage_guard(&self) -> MutexGuard<'_, Usage> {
        self.usage.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let usage = self.usage_guard();
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("max", &usage.max)
            .field("running", &usage.running)
            .finish()
    }
}

/// RAII slot claim; dropping releases the worker slot exactly once.
pub struct SlotReservation {
    worker: Arc<Worker>,
}

impl Drop for SlotReservation {
    fn drop(&mut self) {
        self.worker.usage_guard().running -= 1;
    }
}
