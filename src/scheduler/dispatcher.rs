use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::error::{DispatchError, Result};
use crate::scheduler::job::{Completion, Job, JobStatus, NewJob};
use crate::scheduler::policy::{Caller, DispatchPolicy};
use crate::scheduler::queue::JobQueue;
use crate::scheduler::registry::{HeartbeatUpdate, WorkerMetadata, WorkerRegistry, WorkerState};
use crate::scheduler::tags::TagSet;

/// Everything one lease queue mutates, guarded by a single lock.
#[derive(Debug)]
struct DispatchState {
    jobs: JobQueue,
    workers: WorkerRegistry,
}

impl DispatchState {
    fn reap(&mut self, queue: &str, now: DateTime<Utc>) -> usize {
        let released = self.jobs.release_expired(now);
        for job in &released {
            let worker_id = job.worker_id.as_deref().unwrap_or_default();
            self.workers.clear_active_job(worker_id, &job.id.to_string());
            tracing::warn!(
                queue,
                job_id = %job.id,
                worker_id,
                attempts = job.attempts,
                "Lease expired, job re-queued"
            );
        }
        released.len()
    }
}

/// Operational constants handed to a worker on registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAck {
    pub worker_id: String,
    pub lease_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub tags: TagSet,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerView {
    #[serde(flatten)]
    pub worker: WorkerState,
    /// Seen within three heartbeat intervals. Informational only.
    pub online: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queued: usize,
    pub leased: usize,
    pub completed: usize,
    pub failed: usize,
    pub pending: usize,
    pub workers: usize,
}

/// A lease queue parameterized by its authorization and matching policy.
///
/// All mutations (submit, lease-next, complete, register, heartbeat, reap)
/// run under one mutex, so two workers never lease the same job and a
/// completion racing a reap resolves in lock order.
#[derive(Debug)]
pub struct Dispatcher<P> {
    policy: P,
    config: QueueConfig,
    state: Mutex<DispatchState>,
}

impl<P: DispatchPolicy> Dispatcher<P> {
    pub fn new(policy: P, config: QueueConfig) -> Self {
        Self {
            state: Mutex::new(DispatchState {
                jobs: JobQueue::with_capacity(config.max_pending),
                workers: WorkerRegistry::new(),
            }),
            policy,
            config,
        }
    }

    pub fn name(&self) -> &'static str {
        self.policy.name()
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Admission check run ahead of request validation, so a disabled queue
    /// reports itself before complaining about the body.
    pub fn authorize_submit(&self) -> Result<()> {
        self.policy.authorize_submit()
    }

    pub fn authorize_worker(&self, caller: &Caller) -> Result<()> {
        self.policy.authorize_worker(caller)
    }

    /// Admit a job and place it in the pending queue.
    pub async fn submit(&self, request: NewJob) -> Result<Job> {
        self.policy.authorize_submit()?;
        if request.kind.trim().is_empty() {
            return Err(DispatchError::TaskKindRequired);
        }

        let mut state = self.state.lock().await;
        if state.jobs.is_full() {
            tracing::warn!(
                queue = self.name(),
                pending = state.jobs.pending_len(),
                "Rejecting job, pending queue is full"
            );
            return Err(DispatchError::QueueFull);
        }

        let job = Job::new(request, Utc::now());
        if !state.jobs.enqueue(job.clone()) {
            return Err(DispatchError::QueueFull);
        }
        tracing::info!(
            queue = self.name(),
            job_id = %job.id,
            kind = %job.kind,
            priority = %job.priority,
            requirements = %job.requirements,
            "Job queued"
        );
        Ok(job)
    }

    /// Hand the first eligible pending job to `caller`, or `None` when
    /// nothing it can run is waiting. Never blocks for work.
    pub async fn lease_next(&self, caller: &Caller) -> Result<Option<Job>> {
        self.policy.authorize_worker(caller)?;
        let worker_id = caller.worker_id().ok_or(DispatchError::WorkerIdRequired)?;

        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(self.config.lease()?)
            .ok_or_else(|| DispatchError::Internal("lease deadline overflows".to_string()))?;
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        state.reap(self.name(), now);

        let tags = if self.policy.requires_registration() {
            let worker = state
                .workers
                .get_mut(worker_id)
                .ok_or_else(|| DispatchError::WorkerNotRegistered(worker_id.to_string()))?;
            worker.touch(now);
            caller.tags.clone().unwrap_or_else(|| worker.tags.clone())
        } else {
            caller.tags.clone().unwrap_or_default()
        };

        let policy = &self.policy;
        let Some(job) = state.jobs.lease_first(
            |job| policy.matches(job, &tags),
            worker_id,
            now,
            expires_at,
        ) else {
            return Ok(None);
        };

        if let Some(worker) = state.workers.get_mut(worker_id) {
            worker.active_job_id = Some(job.id.to_string());
        }
        tracing::info!(
            queue = self.name(),
            job_id = %job.id,
            worker_id,
            attempts = job.attempts,
            "Job leased"
        );
        Ok(Some(job))
    }

    /// Record a worker's terminal report for a leased job.
    pub async fn complete(
        &self,
        caller: &Caller,
        job_id: &Uuid,
        completion: Completion,
    ) -> Result<Job> {
        self.policy.authorize_worker(caller)?;

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let job = state
            .jobs
            .complete(job_id, caller.worker_id(), completion, Utc::now())?;

        if let Some(worker_id) = job.worker_id.as_deref() {
            state.workers.clear_active_job(worker_id, &job.id.to_string());
        }
        if job.status == JobStatus::Completed {
            tracing::info!(
                queue = self.name(),
                job_id = %job.id,
                worker_id = ?job.worker_id,
                "Job completed"
            );
        } else {
            tracing::warn!(
                queue = self.name(),
                job_id = %job.id,
                worker_id = ?job.worker_id,
                detail = ?job.detail,
                "Job failed"
            );
        }
        Ok(job)
    }

    /// Return expired leases to the back of the pending queue.
    pub async fn reap(&self) -> usize {
        self.state.lock().await.reap(self.name(), Utc::now())
    }

    /// Create or overwrite a worker record.
    pub async fn register(
        &self,
        worker_id: &str,
        tags: TagSet,
        metadata: WorkerMetadata,
    ) -> Result<RegisterAck> {
        self.policy.authorize_worker(&Caller::worker(worker_id))?;
        let worker_id = worker_id.trim();
        if worker_id.is_empty() {
            return Err(DispatchError::WorkerIdRequired);
        }

        let mut state = self.state.lock().await;
        let worker = state.workers.register(worker_id, tags, metadata, Utc::now());
        Ok(RegisterAck {
            worker_id: worker.worker_id.clone(),
            lease_ms: self.config.lease_ms,
            heartbeat_interval_ms: self.config.heartbeat_interval_ms,
            tags: worker.tags.clone(),
        })
    }

    /// Refresh a registered worker; returns its effective tags.
    pub async fn heartbeat(&self, worker_id: &str, update: HeartbeatUpdate) -> Result<TagSet> {
        self.policy.authorize_worker(&Caller::worker(worker_id))?;
        let worker_id = worker_id.trim();
        if worker_id.is_empty() {
            return Err(DispatchError::WorkerIdRequired);
        }

        let mut state = self.state.lock().await;
        let worker = state.workers.heartbeat(worker_id, update, Utc::now())?;
        Ok(worker.tags.clone())
    }

    pub async fn get_job(&self, job_id: &Uuid) -> Result<Job> {
        self.state
            .lock()
            .await
            .jobs
            .get_job(job_id)
            .cloned()
            .ok_or_else(|| DispatchError::JobNotFound(job_id.to_string()))
    }

    /// All job records, oldest first.
    pub async fn list_jobs(&self) -> Vec<Job> {
        let state = self.state.lock().await;
        state.jobs.all_jobs().into_iter().cloned().collect()
    }

    pub async fn list_workers(&self) -> Vec<WorkerView> {
        let now = Utc::now();
        let window = self.config.presence_window();
        let state = self.state.lock().await;
        state
            .workers
            .all_workers()
            .into_iter()
            .map(|worker| WorkerView {
                online: worker.is_alive(now, window),
                worker: worker.clone(),
            })
            .collect()
    }

    pub async fn stats(&self) -> QueueStats {
        let state = self.state.lock().await;
        QueueStats {
            queued: state.jobs.count_by_status(JobStatus::Queued),
            leased: state.jobs.count_by_status(JobStatus::Leased),
            completed: state.jobs.count_by_status(JobStatus::Completed),
            failed: state.jobs.count_by_status(JobStatus::Failed),
            pending: state.jobs.pending_len(),
            workers: state.workers.len(),
        }
    }
}
