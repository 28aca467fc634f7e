use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::{DispatchError, Result};
use crate::scheduler::tags::TagSet;

/// Opaque worker-supplied metadata, kept for observability only.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkerMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Value>,
}

/// Worker state tracking
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerState {
    pub worker_id: String,
    pub tags: TagSet,
    pub registered_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    /// Advisory only; never consulted when leasing.
    pub active_job_id: Option<String>,
    #[serde(flatten)]
    pub metadata: WorkerMetadata,
}

impl WorkerState {
    pub fn new(
        worker_id: String,
        tags: TagSet,
        metadata: WorkerMetadata,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            worker_id,
            tags,
            registered_at: now,
            last_seen_at: now,
            active_job_id: None,
            metadata,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_seen_at = now;
    }

    pub fn is_alive(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        now - self.last_seen_at < window
    }
}

/// Fields a heartbeat may refresh. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct HeartbeatUpdate {
    pub tags: Option<TagSet>,
    pub battery: Option<Value>,
    pub capabilities: Option<Value>,
    pub active_job_id: Option<String>,
}

/// Known workers keyed by their client-supplied id. Records are never evicted.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: HashMap<String, WorkerState>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite a worker record.
    pub fn register(
        &mut self,
        worker_id: &str,
        tags: TagSet,
        metadata: WorkerMetadata,
        now: DateTime<Utc>,
    ) -> &WorkerState {
        let state = WorkerState::new(worker_id.to_string(), tags, metadata, now);
        tracing::info!(worker_id, tags = %state.tags, "Worker registered");
        self.workers.insert(worker_id.to_string(), state);
        &self.workers[worker_id]
    }

    /// Refresh an existing worker. Unknown workers must register first.
    pub fn heartbeat(
        &mut self,
        worker_id: &str,
        update: HeartbeatUpdate,
        now: DateTime<Utc>,
    ) -> Result<&WorkerState> {
        let worker = self
            .workers
            .get_mut(worker_id)
            .ok_or_else(|| DispatchError::WorkerNotRegistered(worker_id.to_string()))?;

        worker.touch(now);
        if let Some(tags) = update.tags {
            worker.tags = tags;
        }
        if update.battery.is_some() {
            worker.metadata.battery = update.battery;
        }
        if update.capabilities.is_some() {
            worker.metadata.capabilities = update.capabilities;
        }
        if update.active_job_id.is_some() {
            worker.active_job_id = update.active_job_id;
        }
        tracing::debug!(worker_id, "Worker heartbeat");
        Ok(&*worker)
    }

    pub fn get(&self, worker_id: &str) -> Option<&WorkerState> {
        self.workers.get(worker_id)
    }

    pub fn get_mut(&mut self, worker_id: &str) -> Option<&mut WorkerState> {
        self.workers.get_mut(worker_id)
    }

    /// Clear the advisory pointer if it still names `job_id`.
    pub fn clear_active_job(&mut self, worker_id: &str, job_id: &str) {
        if let Some(worker) = self.workers.get_mut(worker_id) {
            if worker.active_job_id.as_deref() == Some(job_id) {
                worker.active_job_id = None;
            }
        }
    }

    /// Get all workers, most recently seen first
    pub fn all_workers(&self) -> Vec<&WorkerState> {
        let mut workers: Vec<&WorkerState> = self.workers.values().collect();
        workers.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at));
        workers
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
