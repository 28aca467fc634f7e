use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::types::HeartbeatRequest;
use crate::worker::client::DispatchClient;

/// Periodically tells the dispatcher this worker is alive, along with the
/// job it is currently running.
pub struct HeartbeatLoop {
    client: DispatchClient,
    worker_id: String,
    interval: Duration,
    active_job: watch::Receiver<Option<Uuid>>,
}

impl HeartbeatLoop {
    pub fn new(
        client: DispatchClient,
        worker_id: impl Into<String>,
        interval_ms: u64,
        active_job: watch::Receiver<Option<Uuid>>,
    ) -> Self {
        Self {
            client,
            worker_id: worker_id.into(),
            interval: Duration::from_millis(interval_ms.max(1)),
            active_job,
        }
    }

    /// Send heartbeats until `shutdown` is cancelled. Failures are logged and
    /// retried on the next tick.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Registration just refreshed the record.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => self.beat().await,
            }
        }
        tracing::debug!(worker_id = %self.worker_id, "Heartbeat loop stopped");
    }

    async fn beat(&self) {
        let active_job_id = self.active_job.borrow().map(|id| id.to_string());
        let request = HeartbeatRequest {
            worker_id: Some(self.worker_id.clone()),
            active_job_id,
            ..Default::default()
        };
        match self.client.heartbeat(&request).await {
            Ok(resp) => {
                tracing::debug!(worker_id = %self.worker_id, tags = %resp.tags, "Heartbeat sent");
            }
            Err(e) => {
                tracing::warn!(worker_id = %self.worker_id, error = %e, "Heartbeat failed");
            }
        }
    }
}
