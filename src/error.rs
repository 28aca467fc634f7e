use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Pending queue is full")]
    QueueFull,

    #[error("Edge jobs are disabled")]
    EdgeJobsDisabled,

    #[error("Worker id is required")]
    WorkerIdRequired,

    #[error("Task is required")]
    TaskRequired,

    #[error("Task kind is required")]
    TaskKindRequired,

    #[error("Completion status is required")]
    StatusRequired,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Missing worker token")]
    MissingWorkerToken,

    #[error("Invalid worker token")]
    InvalidWorkerToken,

    #[error("No worker token configured for this queue")]
    ProviderUnavailable,

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Worker not registered: {0}")]
    WorkerNotRegistered(String),

    #[error("Job {0} is not in progress")]
    JobNotInProgress(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote error {status}: {code}")]
    Remote { status: u16, code: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// Stable wire code rendered as `{"error": code}`.
    pub fn code(&self) -> &str {
        match self {
            DispatchError::QueueFull => "queue_full",
            DispatchError::EdgeJobsDisabled => "edge_jobs_disabled",
            DispatchError::WorkerIdRequired => "worker_id_required",
            DispatchError::TaskRequired => "task_required",
            DispatchError::TaskKindRequired => "task_kind_required",
            DispatchError::StatusRequired => "status_required",
            DispatchError::InvalidRequest(_) => "invalid_request",
            DispatchError::MissingWorkerToken => "missing_worker_token",
            DispatchError::InvalidWorkerToken => "invalid_worker_token",
            DispatchError::ProviderUnavailable => "provider_unavailable",
            DispatchError::JobNotFound(_) => "job_not_found",
            DispatchError::WorkerNotRegistered(_) => "worker_not_registered",
            DispatchError::JobNotInProgress(_) => "job_not_in_progress",
            DispatchError::Remote { code, .. } => code,
            DispatchError::Http(_) | DispatchError::Internal(_) => "internal_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
