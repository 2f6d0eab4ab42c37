//! Persistence seams for jobs and builds.
//!
//! Job and build rows are owned by the control plane's datastore. The
//! scheduler reads and updates them through these traits and never inserts
//! or deletes rows itself.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::scheduler::build::Build;
use crate::scheduler::job::Job;

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn find(&self, id: u64) -> Result<Job>;
    async fn update(&self, job: &Job) -> Result<()>;
}

/// Builds resolve with their child jobs and the nested repository/provider
/// data, so a single `find` carries everything aggregation and status
/// reporting need.
#[async_trait]
pub trait BuildStore: Send + Sync {
    async fn find(&self, id: u64) -> Result<Build>;
    async fn update(&self, build: &Build) -> Result<()>;
}
