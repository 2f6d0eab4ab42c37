//! Local process transport: runs job commands on this host.
//!
//! The default transport for single-machine deployments and the demo binary.
//! Each command runs under `sh -c`, inside `docker run` when the job names a
//! container image. Output is captured per command and appended to the
//! descriptor log.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::Result;
use crate::scheduler::job::JobStatus;

use super::{WorkerJob, WorkerTransport};

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTransport;

#[async_trait]
impl WorkerTransport for LocalTransport {
    async fn start_job(&self, job: WorkerJob) -> Result<JobStatus> {
        for command in &job.commands {
            job.append_log(format!("$ {command}\n"));

            let output = if job.image.is_empty() {
                run_direct(&job, command).await?
            } else {
                run_in_image(&job, command).await?
            };

            let stdout = String::from_utf8_lossy(&output.stdout);
            if !stdout.is_empty() {
                job.append_log(stdout.into_owned());
            }
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.is_empty() {
                job.append_log(stderr.into_owned());
            }

            if !output.status.success() {
                tracing::info!(
                    job_id = job.job_id,
                    exit_code = ?output.status.code(),
                    "command failed"
                );
                return Ok(JobStatus::Failing);
            }
        }

        Ok(JobStatus::Passing)
    }

    async fn stop_job(&self, _job: WorkerJob) -> Result<bool> {
        // Local runs are owned by the blocking start_job call; there is no
        // detached process to signal.
        Ok(false)
    }
}

async fn run_direct(job: &WorkerJob, command: &str) -> Result<std::process::Output> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .envs(&job.env)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;
    Ok(output)
}

async fn run_in_image(job: &WorkerJob, command: &str) -> Result<std::process::Output> {
    let mut args = vec!["run".to_string(), "--rm".to_string()];
    for (key, value) in &job.env {
        args.push("-e".to_string());
        args.push(format!("{key}={value}"));
    }
    args.push(job.image.clone());
    args.push("sh".to_string());
    args.push("-c".to_string());
    args.push(command.to_string());

    let output = Command::new("docker")
        .args(&args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;
    Ok(output)
}
