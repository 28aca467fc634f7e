use std::net::SocketAddr;

use chrono::TimeDelta;

use crate::error::{DispatchError, Result};

/// Limits and timings for one lease queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of jobs waiting in the pending queue.
    /// Submissions beyond this are rejected with `queue_full`.
    pub max_pending: usize,
    /// How long a worker holds a job before it becomes reapable.
    pub lease_ms: u64,
    /// Interval workers are told to heartbeat at.
    pub heartbeat_interval_ms: u64,
}

impl QueueConfig {
    /// Trusted accelerator workers run long jobs (image generation, inference).
    pub fn trusted() -> Self {
        Self {
            max_pending: 100,
            lease_ms: 600_000,
            heartbeat_interval_ms: 30_000,
        }
    }

    /// Edge workers are short-lived and flaky, so leases are short.
    pub fn edge() -> Self {
        Self {
            max_pending: 500,
            lease_ms: 30_000,
            heartbeat_interval_ms: 10_000,
        }
    }

    /// Lease length as a positive delta. Values that do not fit are an error.
    pub fn lease(&self) -> Result<TimeDelta> {
        i64::try_from(self.lease_ms)
            .ok()
            .and_then(TimeDelta::try_milliseconds)
            .filter(|lease| *lease > TimeDelta::zero())
            .ok_or_else(|| {
                DispatchError::Internal(format!("lease of {} ms is out of range", self.lease_ms))
            })
    }

    /// Window after which a silent worker is reported offline.
    pub fn presence_window(&self) -> TimeDelta {
        i64::try_from(self.heartbeat_interval_ms.saturating_mul(3))
            .ok()
            .and_then(TimeDelta::try_milliseconds)
            .unwrap_or(TimeDelta::MAX)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::trusted()
    }
}

/// Bearer-token protected queue for trusted workers.
#[derive(Debug, Clone)]
pub struct TrustedConfig {
    /// Shared secret workers present as `Authorization: Bearer <token>`.
    /// When unset, worker endpoints answer `provider_unavailable`.
    pub worker_token: Option<String>,
    pub queue: QueueConfig,
}

impl Default for TrustedConfig {
    fn default() -> Self {
        Self {
            worker_token: None,
            queue: QueueConfig::trusted(),
        }
    }
}

/// Open-registration queue for edge and browser workers.
#[derive(Debug, Clone)]
pub struct EdgeConfig {
    /// Feature flag. When false every edge endpoint answers `edge_jobs_disabled`.
    pub enabled: bool,
    pub queue: QueueConfig,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            queue: QueueConfig::edge(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub listen_addr: SocketAddr,
    /// Period of the background lease reaper. Lease-next also reaps on demand.
    pub reap_interval_ms: u64,
    pub trusted: TrustedConfig,
    pub edge: EdgeConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            reap_interval_ms: 1_000,
            trusted: TrustedConfig::default(),
            edge: EdgeConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_worker_token(mut self, token: impl Into<String>) -> Self {
        self.trusted.worker_token = Some(token.into());
        self
    }

    pub fn with_edge_enabled(mut self, enabled: bool) -> Self {
        self.edge.enabled = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_config_presets() {
        let trusted = QueueConfig::trusted();
        assert_eq!(trusted.max_pending, 100);
        assert_eq!(trusted.lease_ms, 600_000);

        let edge = QueueConfig::edge();
        assert_eq!(edge.max_pending, 500);
        assert_eq!(edge.lease_ms, 30_000);
        assert_eq!(edge.heartbeat_interval_ms, 10_000);
    }

    #[test]
    fn lease_and_presence_window() {
        let cfg = QueueConfig::edge();
        assert_eq!(cfg.lease().unwrap(), TimeDelta::seconds(30));
        assert_eq!(cfg.presence_window(), TimeDelta::seconds(30));
    }

    #[test]
    fn lease_out_of_range_is_an_error() {
        for lease_ms in [0, i64::MAX as u64, u64::MAX] {
            let cfg = QueueConfig {
                lease_ms,
                ..QueueConfig::edge()
            };
            assert!(
                matches!(cfg.lease(), Err(DispatchError::Internal(_))),
                "lease_ms {} accepted",
                lease_ms
            );
        }
    }

    #[test]
    fn huge_heartbeat_saturates_presence_window() {
        let cfg = QueueConfig {
            heartbeat_interval_ms: u64::MAX,
            ..QueueConfig::edge()
        };
        assert_eq!(cfg.presence_window(), TimeDelta::MAX);
    }

    #[test]
    fn node_config_default() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.listen_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(cfg.reap_interval_ms, 1_000);
        assert!(cfg.trusted.worker_token.is_none());
        assert!(!cfg.edge.enabled);
    }

    #[test]
    fn node_config_builders() {
        let addr: SocketAddr = "10.0.0.1:9000".parse().unwrap();
        let cfg = NodeConfig::new(addr)
            .with_worker_token("secret")
            .with_edge_enabled(true);
        assert_eq!(cfg.listen_addr, addr);
        assert_eq!(cfg.trusted.worker_token.as_deref(), Some("secret"));
        assert!(cfg.edge.enabled);
    }
}
