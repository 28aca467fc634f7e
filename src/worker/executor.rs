use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;

use crate::scheduler::{Completion, Job};

/// Job kind handled by [`JobExecutor`].
pub const SHELL_KIND: &str = "shell";

/// Runs one leased job and produces the report sent back to the dispatcher.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Completion;
}

/// Executes `shell` jobs: `payload.command` runs through `sh -c`.
///
/// Success reports `{stdout, exitCode}` as the result. A non-zero exit,
/// a timeout or a spawn failure reports an `error` status with a detail.
#[derive(Debug, Clone)]
pub struct JobExecutor {
    timeout: Duration,
}

impl Default for JobExecutor {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

impl JobExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn execute(&self, job: &Job) -> Completion {
        if job.kind != SHELL_KIND {
            return Completion::error(json!({
                "message": format!("Unsupported job kind: {}", job.kind),
            }));
        }
        let Some(command) = job.payload.get("command").and_then(Value::as_str) else {
            return Completion::error(json!({ "message": "payload.command is required" }));
        };

        tracing::info!(job_id = %job.id, command, "Executing job");

        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, child).await {
            Ok(result) => Self::process_output(job, result),
            Err(_) => {
                tracing::warn!(job_id = %job.id, timeout = ?self.timeout, "Job timed out");
                Completion::error(json!({
                    "message": "Command timed out",
                    "timeoutMs": self.timeout.as_millis() as u64,
                }))
            }
        }
    }

    fn process_output(job: &Job, result: std::io::Result<std::process::Output>) -> Completion {
        match result {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                let exit_code = output.status.code();

                tracing::info!(
                    job_id = %job.id,
                    exit_code = ?exit_code,
                    "Command finished"
                );

                if output.status.success() {
                    Completion::completed(json!({
                        "stdout": stdout,
                        "exitCode": exit_code,
                    }))
                } else {
                    Completion::error(json!({
                        "message": if stderr.is_empty() {
                            format!("Exit code: {:?}", exit_code)
                        } else {
                            stderr
                        },
                        "stdout": stdout,
                        "exitCode": exit_code,
                    }))
                }
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Job execution failed");
                Completion::error(json!({ "message": e.to_string() }))
            }
        }
    }
}

#[async_trait]
impl JobHandler for JobExecutor {
    async fn handle(&self, job: &Job) -> Completion {
        self.execute(job).await
    }
}
