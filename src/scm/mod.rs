//! Commit-status reporting back to the source-control provider.

use async_trait::async_trait;

use crate::error::{Result, SchedulerError};
use crate::scheduler::build::Repository;

/// Overall state reported against a commit once its build settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitState {
    Success,
    Error,
}

impl CommitState {
    pub fn as_str(self) -> &'static str {
        match self {
            CommitState::Success => "success",
            CommitState::Error => "error",
        }
    }
}

impl std::fmt::Display for CommitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Posts build outcomes to the provider a repository came from.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn create_status(
        &self,
        repo: &Repository,
        commit_sha: &str,
        target_url: &str,
        state: CommitState,
    ) -> Result<()>;
}

/// Statuses-API client (GitHub wire format). The provider's URL, token and
/// repository name all come from the build's repository row.
#[derive(Debug, Clone, Default)]
pub struct HttpStatusReporter {
    client: reqwest::Client,
}

impl HttpStatusReporter {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl StatusReporter for HttpStatusReporter {
    async fn create_status(
        &self,
        repo: &Repository,
        commit_sha: &str,
        target_url: &str,
        state: CommitState,
    ) -> Result<()> {
        let provider = &repo.provider;
        if provider.access_token.is_empty() {
            tracing::debug!(repo = %repo.full_name, "no provider token, skipping status update");
            return Ok(());
        }

        let url = format!(
            "{}/repos/{}/statuses/{}",
            provider.url.trim_end_matches('/'),
            repo.full_name,
            commit_sha
        );
        let body = serde_json::json!({
            "state": state.as_str(),
            "target_url": target_url,
            "context": "continuous-integration/buildsched",
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&provider.access_token)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "buildsched")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(SchedulerError::Scm(format!("{status}: {text}")));
        }
        Ok(())
    }
}
