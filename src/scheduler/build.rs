use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scheduler::job::Job;

/// Source-control provider settings carried by a repository.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Provider {
    pub name: String,
    /// API base URL, e.g. "https://api.github.com".
    pub url: String,
    /// Public host of this control plane, used in links sent back to the
    /// provider.
    pub host: String,
    pub access_token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Repository {
    pub url: String,
    pub full_name: String,
    pub provider: Provider,
}

/// A set of jobs triggered by one commit.
///
/// `start_time` is the earliest child start, `end_time` the latest child end
/// once every child has one; both are recomputed by the scheduler after each
/// job persist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Build {
    pub id: u64,
    pub commit_sha: String,
    pub git_ref: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub jobs: Vec<Job>,
    pub repository: Repository,
}
