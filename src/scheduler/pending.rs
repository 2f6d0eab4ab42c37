use std::collections::HashMap;

use crate::scheduler::job::Job;
use crate::worker::WorkerJob;

/// A job currently executing on a worker: the store row as last seen by the
/// scheduler, plus the descriptor shared with the worker transport.
#[derive(Debug, Clone)]
pub struct PendingJob {
    pub job: Job,
    pub remote: WorkerJob,
}

/// Registry of dispatched jobs, keyed by job id.
///
/// An entry exists exactly for the span of the remote round-trip; the job
/// lifecycle removes it on completion, and a failed remote stop removes it
/// early so the id does not linger.
#[derive(Debug, Default)]
pub struct PendingJobs {
    jobs: HashMap<u64, PendingJob>,
}

impl PendingJobs {
    pub fn new() -> Self {
        Self {
            jobs: HashMap::new(),
        }
    }

    /// Insert or overwrite the entry for a job id.
    pub fn insert(&mut self, job: Job, remote: WorkerJob) {
        self.jobs.insert(job.id, PendingJob { job, remote });
    }

    pub fn get(&self, id: u64) -> Option<&PendingJob> {
        self.jobs.get(&id)
    }

    pub fn remove(&mut self, id: u64) -> Option<PendingJob> {
        self.jobs.remove(&id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.jobs.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
