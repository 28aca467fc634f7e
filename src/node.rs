use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::api::{self, ApiState};
use crate::config::NodeConfig;
use crate::scheduler::{
    EdgeDispatcher, LeaseReaper, TagPolicy, TokenPolicy, TrustedDispatcher,
};

/// The coordinator: both lease queues, their reapers, and the HTTP server.
pub struct Node {
    pub config: NodeConfig,
    pub trusted: Arc<TrustedDispatcher>,
    pub edge: Arc<EdgeDispatcher>,
}

impl Node {
    pub fn new(config: NodeConfig) -> Self {
        let trusted = Arc::new(TrustedDispatcher::new(
            TokenPolicy::new(config.trusted.worker_token.clone()),
            config.trusted.queue.clone(),
        ));
        let edge = Arc::new(EdgeDispatcher::new(
            TagPolicy::new(config.edge.enabled),
            config.edge.queue.clone(),
        ));
        Self {
            config,
            trusted,
            edge,
        }
    }

    pub fn router(&self) -> Router {
        api::router(ApiState {
            trusted: self.trusted.clone(),
            edge: self.edge.clone(),
        })
    }

    /// Bind the configured address and run until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        self.run_with_listener(listener, shutdown).await
    }

    /// Run on an already bound listener:
    /// 1. Spawns one lease reaper per queue
    /// 2. Serves HTTP until shutdown, draining in-flight requests
    pub async fn run_with_listener(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> std::io::Result<()> {
        if self.config.trusted.worker_token.is_none() {
            tracing::warn!("No worker token configured, trusted worker endpoints are unavailable");
        }
        if !self.config.edge.enabled {
            tracing::info!("Edge queue disabled");
        }

        let reap_interval_ms = self.config.reap_interval_ms;
        let trusted_reaper = tokio::spawn(
            LeaseReaper::new(self.trusted.clone(), reap_interval_ms).run(shutdown.clone()),
        );
        let edge_reaper = tokio::spawn(
            LeaseReaper::new(self.edge.clone(), reap_interval_ms).run(shutdown.clone()),
        );

        let result = api::serve(listener, self.router(), shutdown.clone()).await;

        // Server errors also stop the reapers.
        shutdown.cancel();
        let _ = tokio::join!(trusted_reaper, edge_reaper);
        tracing::info!("Node stopped");
        result
    }
}
