use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Job not found: {0}")]
    JobNotFound(u64),

    #[error("Build not found: {0}")]
    BuildNotFound(u64),

    #[error("Job not running: {0}")]
    JobNotRunning(u64),

    #[error("Worker not found: {0}")]
    WorkerNotFound(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Worker transport error: {0}")]
    Transport(String),

    #[error("SCM provider error: {0}")]
    Scm(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
