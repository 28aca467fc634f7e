use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::scheduler::tags::TagSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Leased,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Leased => write!(f, "leased"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    /// Lenient parse: anything that is not a known priority is `normal`.
    pub fn parse_lossy(raw: Option<&str>) -> Self {
        match raw.map(|p| p.trim().to_ascii_lowercase()).as_deref() {
            Some("high") => Priority::High,
            Some("low") => Priority::Low,
            _ => Priority::Normal,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
        }
    }
}

/// What a producer hands to `submit`.
#[derive(Debug, Clone, Default)]
pub struct NewJob {
    pub kind: String,
    pub payload: Value,
    pub priority: Priority,
    pub requirements: TagSet,
    pub metadata: Option<Value>,
}

impl NewJob {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_requirements(mut self, requirements: TagSet) -> Self {
        self.requirements = requirements;
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Terminal report from a worker.
#[derive(Debug, Clone)]
pub struct Completion {
    /// `"completed"` marks success; any other value marks failure.
    pub status: String,
    pub result: Option<Value>,
    pub detail: Option<Value>,
}

impl Completion {
    pub fn completed(result: Value) -> Self {
        Self {
            status: "completed".to_string(),
            result: Some(result),
            detail: None,
        }
    }

    pub fn error(detail: Value) -> Self {
        Self {
            status: "error".to_string(),
            result: None,
            detail: Some(detail),
        }
    }

    pub fn terminal_status(&self) -> JobStatus {
        if self.status == "completed" {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub kind: String,
    pub payload: Value,
    #[serde(default)]
    pub requirements: TagSet,
    pub priority: Priority,
    pub status: JobStatus,
    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
    pub attempts: u32,
    pub result: Option<Value>,
    pub detail: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Job {
    pub fn new(request: NewJob, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: request.kind,
            payload: request.payload,
            requirements: request.requirements,
            priority: request.priority,
            status: JobStatus::Queued,
            enqueued_at,
            started_at: None,
            completed_at: None,
            lease_expires_at: None,
            worker_id: None,
            attempts: 0,
            result: None,
            detail: None,
            metadata: request.metadata,
        }
    }

    /// `queued -> leased`. The caller computes the deadline up front so this
    /// cannot fail halfway through.
    pub(crate) fn lease_to(
        &mut self,
        worker_id: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) {
        self.status = JobStatus::Leased;
        self.worker_id = Some(worker_id.to_string());
        self.started_at = Some(now);
        self.lease_expires_at = Some(expires_at);
        self.attempts += 1;
    }

    /// `leased -> queued` after the lease ran out.
    pub(crate) fn release(&mut self) {
        self.status = JobStatus::Queued;
        self.worker_id = None;
        self.started_at = None;
        self.lease_expires_at = None;
    }

    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Leased
            && self.lease_expires_at.is_some_and(|deadline| deadline <= now)
    }
}
