use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Passing,
    Failing,
}

impl JobStatus {
    /// A terminal job never transitions again.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Passing | JobStatus::Failing)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Passing => write!(f, "passing"),
            JobStatus::Failing => write!(f, "failing"),
        }
    }
}

/// One executable unit of a build: a shell recipe run in a single image on a
/// single worker.
///
/// Rows are owned by the control plane's datastore; the scheduler mutates
/// status, times and log through the [`JobStore`](crate::store::JobStore)
/// seam and never creates or deletes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: u64,
    pub build_id: u64,
    pub commands: Vec<String>,
    pub image: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub status: JobStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub log: String,
}

impl Job {
    pub fn new(id: u64, build_id: u64, commands: Vec<String>, image: impl Into<String>) -> Self {
        Self {
            id,
            build_id,
            commands,
            image: image.into(),
            env: HashMap::new(),
            status: JobStatus::Queued,
            start_time: None,
            end_time: None,
            log: String::new(),
        }
    }
}
