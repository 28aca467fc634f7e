use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::types::{CompleteJobRequest, RegisterWorkerRequest};
use crate::error::{DispatchError, Result};
use crate::scheduler::{Job, RegisterAck, TagSet};
use crate::worker::client::{DispatchClient, QueueKind};
use crate::worker::executor::JobHandler;
use crate::worker::heartbeat::HeartbeatLoop;

/// What one poll of the edge queue produced.
#[derive(Debug)]
pub enum PollOutcome {
    /// Nothing eligible was waiting.
    Idle,
    /// The job ran and the dispatcher accepted the report.
    Reported(Job),
    /// The lease was reaped and handed elsewhere before the report arrived.
    Superseded(Uuid),
}

/// Pull loop for the edge queue: register, heartbeat, lease, run, report.
pub struct EdgeWorker<H> {
    client: DispatchClient,
    worker_id: String,
    tags: TagSet,
    poll_interval: Duration,
    handler: H,
    active_job: watch::Sender<Option<Uuid>>,
}

impl<H: JobHandler + 'static> EdgeWorker<H> {
    pub fn new(
        client: DispatchClient,
        worker_id: impl Into<String>,
        tags: TagSet,
        handler: H,
    ) -> Self {
        let (active_job, _) = watch::channel(None);
        Self {
            client,
            worker_id: worker_id.into(),
            tags,
            poll_interval: Duration::from_millis(1_000),
            handler,
            active_job,
        }
    }

    /// Sleep between polls when the queue is empty.
    pub fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval = Duration::from_millis(poll_interval_ms);
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub async fn register(&self) -> Result<RegisterAck> {
        let request = RegisterWorkerRequest {
            worker_id: Some(self.worker_id.clone()),
            tags: Some(self.tags.clone()),
            ..Default::default()
        };
        let ack = self.client.register(&request).await?;
        tracing::info!(
            worker_id = %ack.worker_id,
            tags = %ack.tags,
            lease_ms = ack.lease_ms,
            heartbeat_interval_ms = ack.heartbeat_interval_ms,
            "Registered with dispatcher"
        );
        Ok(ack)
    }

    /// Lease one job, run it and report the outcome.
    pub async fn poll_once(&self) -> Result<PollOutcome> {
        let Some(job) = self
            .client
            .lease_next(QueueKind::Edge, &self.worker_id, Some(&self.tags))
            .await?
        else {
            return Ok(PollOutcome::Idle);
        };

        tracing::info!(job_id = %job.id, kind = %job.kind, attempts = job.attempts, "Leased job");
        self.active_job.send_replace(Some(job.id));
        let completion = self.handler.handle(&job).await;
        self.active_job.send_replace(None);

        let request = CompleteJobRequest {
            worker_id: Some(self.worker_id.clone()),
            status: Some(completion.status),
            result: completion.result,
            detail: completion.detail,
        };
        match self.client.complete(QueueKind::Edge, &job.id, &request).await {
            Ok(job) => Ok(PollOutcome::Reported(job)),
            Err(e) if e.code() == "job_not_in_progress" => {
                tracing::info!(job_id = %job.id, "Lease was superseded, dropping result");
                Ok(PollOutcome::Superseded(job.id))
            }
            Err(e) => Err(e),
        }
    }

    /// Register, then poll until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let ack = self.register().await?;
        let heartbeat = tokio::spawn(
            HeartbeatLoop::new(
                self.client.clone(),
                self.worker_id.clone(),
                ack.heartbeat_interval_ms,
                self.active_job.subscribe(),
            )
            .run(shutdown.clone()),
        );

        while !shutdown.is_cancelled() {
            let idle = match self.poll_once().await {
                Ok(PollOutcome::Idle) => true,
                Ok(_) => false,
                Err(DispatchError::Remote { code, .. }) if code == "worker_not_registered" => {
                    tracing::warn!(
                        worker_id = %self.worker_id,
                        "Dispatcher forgot this worker, re-registering"
                    );
                    if let Err(e) = self.register().await {
                        tracing::warn!(error = %e, "Re-registration failed");
                    }
                    true
                }
                Err(e) => {
                    tracing::warn!(worker_id = %self.worker_id, error = %e, "Poll failed");
                    true
                }
            };
            if idle {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }

        let _ = heartbeat.await;
        tracing::info!(worker_id = %self.worker_id, "Worker stopped");
        Ok(())
    }
}
