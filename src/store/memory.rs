//! In-memory store for tests and single-process deployments.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{Result, SchedulerError};
use crate::scheduler::build::Build;
use crate::scheduler::job::Job;

use super::{BuildStore, JobStore};

/// Backs both store traits with shared maps. Job rows are the source of
/// truth; build lookups re-resolve their child jobs so aggregation always
/// sees current status and times.
#[derive(Debug, Default)]
pub struct MemoryStore {
    jobs: RwLock<HashMap<u64, Job>>,
    builds: RwLock<HashMap<u64, Build>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Seed a build and its child jobs.
    pub fn insert_build(&self, build: Build) {
        let mut jobs = self.jobs.write().unwrap();
        for job in &build.jobs {
            jobs.insert(job.id, job.clone());
        }
        drop(jobs);
        self.builds.write().unwrap().insert(build.id, build);
    }

    pub fn get_job(&self, id: u64) -> Option<Job> {
        self.jobs.read().unwrap().get(&id).cloned()
    }

    pub fn get_build(&self, id: u64) -> Option<Build> {
        let mut build = self.builds.read().unwrap().get(&id).cloned()?;
        let jobs = self.jobs.read().unwrap();
        for job in &mut build.jobs {
            if let Some(current) = jobs.get(&job.id) {
                *job = current.clone();
            }
        }
        Some(build)
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn find(&self, id: u64) -> Result<Job> {
        self.get_job(id).ok_or(SchedulerError::JobNotFound(id))
    }

    async fn update(&self, job: &Job) -> Result<()> {
        self.jobs.write().unwrap().insert(job.id, job.clone());
        Ok(())
    }
}

#[async_trait]
impl BuildStore for MemoryStore {
    async fn find(&self, id: u64) -> Result<Build> {
        self.get_build(id).ok_or(SchedulerError::BuildNotFound(id))
    }

    async fn update(&self, build: &Build) -> Result<()> {
        self.builds.write().unwrap().insert(build.id, build.clone());
        Ok(())
    }
}
