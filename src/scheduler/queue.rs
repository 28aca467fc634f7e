use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{DispatchError, Result};
use crate::scheduler::job::{Completion, Job, JobStatus, Priority};

/// Job record store plus the ordered pending list.
///
/// `pending` holds exactly the ids of jobs whose status is `Queued`.
#[derive(Debug)]
pub struct JobQueue {
    jobs: HashMap<Uuid, Job>,
    pending: VecDeque<Uuid>,
    max_pending: usize,
}

impl JobQueue {
    pub fn with_capacity(max_pending: usize) -> Self {
        Self {
            jobs: HashMap::new(),
            pending: VecDeque::new(),
            max_pending,
        }
    }

    /// Insert a freshly created job. `High` goes to the front, everything else
    /// to the back. Returns false if the pending list is at capacity.
    pub fn enqueue(&mut self, job: Job) -> bool {
        if self.is_full() {
            return false;
        }
        let id = job.id;
        let priority = job.priority;
        self.jobs.insert(id, job);
        if priority == Priority::High {
            self.pending.push_front(id);
        } else {
            self.pending.push_back(id);
        }
        true
    }

    /// Remove the first pending job accepted by `eligible` and lease it.
    /// Jobs the predicate rejects keep their position.
    pub fn lease_first<F>(
        &mut self,
        mut eligible: F,
        worker_id: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Option<Job>
    where
        F: FnMut(&Job) -> bool,
    {
        let position = self
            .pending
            .iter()
            .position(|id| self.jobs.get(id).is_some_and(&mut eligible))?;
        let id = self.pending.remove(position)?;
        let job = self.jobs.get_mut(&id)?;
        job.lease_to(worker_id, now, expires_at);
        Some(job.clone())
    }

    /// Return every leased job whose deadline passed to the back of the
    /// pending list. Terminal jobs are never touched.
    pub fn release_expired(&mut self, now: DateTime<Utc>) -> Vec<Job> {
        let mut expired: Vec<&mut Job> = self
            .jobs
            .values_mut()
            .filter(|job| job.lease_expired(now))
            .collect();
        // Oldest lease first so re-queue order follows lease order.
        expired.sort_by_key(|job| job.started_at);

        let mut released = Vec::with_capacity(expired.len());
        for job in expired {
            released.push(job.clone());
            job.release();
            self.pending.push_back(job.id);
        }
        released
    }

    /// Apply a worker's terminal report.
    ///
    /// `holder` is the worker claiming the job, when known. A report from a
    /// worker that no longer holds the lease is a state conflict.
    pub fn complete(
        &mut self,
        id: &Uuid,
        holder: Option<&str>,
        completion: Completion,
        now: DateTime<Utc>,
    ) -> Result<Job> {
        let job = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| DispatchError::JobNotFound(id.to_string()))?;

        if job.status != JobStatus::Leased {
            return Err(DispatchError::JobNotInProgress(id.to_string()));
        }
        if let Some(holder) = holder {
            if job.worker_id.as_deref() != Some(holder) {
                return Err(DispatchError::JobNotInProgress(id.to_string()));
            }
        }

        job.status = completion.terminal_status();
        job.completed_at = Some(now);
        job.lease_expires_at = None;
        job.result = completion.result;
        job.detail = completion.detail;
        Ok(job.clone())
    }

    /// Get a job by ID
    pub fn get_job(&self, id: &Uuid) -> Option<&Job> {
        self.jobs.get(id)
    }

    /// Get all jobs sorted chronologically by enqueue time
    pub fn all_jobs(&self) -> Vec<&Job> {
        let mut jobs: Vec<&Job> = self.jobs.values().collect();
        jobs.sort_by_key(|j| j.enqueued_at);
        jobs
    }

    /// Pending job ids in dispatch order.
    pub fn pending_ids(&self) -> impl Iterator<Item = &Uuid> {
        self.pending.iter()
    }

    pub fn count_by_status(&self, status: JobStatus) -> usize {
        self.jobs.values().filter(|j| j.status == status).count()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Total number of job records, terminal ones included.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.pending.len() >= self.max_pending
    }
}
