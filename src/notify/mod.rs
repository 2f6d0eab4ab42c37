//! Job status fan-out towards connected clients.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::scheduler::job::{Job, JobStatus};

/// Subscription topic job events are published on.
pub const JOB_TOPIC: &str = "/subs/jobs";

/// Payload published for every job persist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobEvent {
    #[serde(rename = "buildID")]
    pub build_id: u64,
    #[serde(rename = "jobID")]
    pub job_id: u64,
    pub status: JobStatus,
    #[serde(rename = "startTime", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(rename = "endTime", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl JobEvent {
    pub fn from_job(job: &Job) -> Self {
        Self {
            build_id: job.build_id,
            job_id: job.id,
            status: job.status,
            start_time: job.start_time,
            end_time: job.end_time,
        }
    }
}

/// Fan-out seam. The websocket hub of the full control plane sits behind
/// this trait; delivery failures never affect scheduling.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn broadcast(&self, topic: &str, event: JobEvent) -> Result<()>;
}

/// Default broadcaster: emits events to the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingBroadcaster;

#[async_trait]
impl Broadcaster for TracingBroadcaster {
    async fn broadcast(&self, topic: &str, event: JobEvent) -> Result<()> {
        tracing::debug!(
            topic,
            build_id = event.build_id,
            job_id = event.job_id,
            status = %event.status,
            "job event"
        );
        Ok(())
    }
}
