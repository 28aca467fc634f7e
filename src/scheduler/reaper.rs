use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::scheduler::dispatcher::Dispatcher;
use crate::scheduler::policy::DispatchPolicy;

/// Periodic lease sweep for one queue.
///
/// Lease-next already reaps on demand; this loop bounds how long an expired
/// job stays invisible to read-only callers (inspect, stats) when no worker
/// is polling.
pub struct LeaseReaper<P> {
    dispatcher: Arc<Dispatcher<P>>,
    interval: Duration,
}

impl<P: DispatchPolicy> LeaseReaper<P> {
    pub fn new(dispatcher: Arc<Dispatcher<P>>, interval_ms: u64) -> Self {
        Self {
            dispatcher,
            interval: Duration::from_millis(interval_ms.max(1)),
        }
    }

    /// Run until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::debug!(
            queue = self.dispatcher.name(),
            interval_ms = self.interval.as_millis() as u64,
            "Lease reaper started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!(queue = self.dispatcher.name(), "Lease reaper stopped");
                    break;
                }
                _ = interval.tick() => {
                    let reaped = self.dispatcher.reap().await;
                    if reaped > 0 {
                        tracing::info!(
                            queue = self.dispatcher.name(),
                            reaped,
                            "Reaped expired leases"
                        );
                    }
                }
            }
        }
    }
}
