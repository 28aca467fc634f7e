use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::api::types::{
    CompleteJobRequest, ErrorBody, HeartbeatRequest, HeartbeatResponse, JobEnvelope, JobList,
    LeaseQuery, RegisterWorkerRequest, StatsResponse, SubmitEdgeJobRequest, SubmitJobRequest,
};
use crate::error::{DispatchError, Result};
use crate::scheduler::{Job, RegisterAck, TagSet};

/// Which lease queue a client call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    Trusted,
    Edge,
}

impl QueueKind {
    fn jobs_path(self) -> &'static str {
        match self {
            QueueKind::Trusted => "/api/jobs",
            QueueKind::Edge => "/api/edge/jobs",
        }
    }

    fn next_path(self) -> &'static str {
        match self {
            QueueKind::Trusted => "/api/worker/jobs/next",
            QueueKind::Edge => "/api/edge/jobs/next",
        }
    }

    fn complete_path(self, job_id: &Uuid) -> String {
        match self {
            QueueKind::Trusted => format!("/api/worker/jobs/{}/complete", job_id),
            QueueKind::Edge => format!("/api/edge/jobs/{}/complete", job_id),
        }
    }
}

/// HTTP client for a running dispatcher.
///
/// Error responses come back as [`DispatchError::Remote`] carrying the
/// server's wire code, so callers can match on `code()` the same way the
/// server produced it.
#[derive(Debug, Clone)]
pub struct DispatchClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl DispatchClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Bearer token sent on every request. Required by trusted worker endpoints.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn submit(&self, request: &SubmitJobRequest) -> Result<Job> {
        let resp = self
            .request(Method::POST, QueueKind::Trusted.jobs_path())
            .json(request)
            .send()
            .await?;
        Ok(decode::<JobEnvelope>(resp).await?.job)
    }

    pub async fn submit_edge(&self, request: &SubmitEdgeJobRequest) -> Result<Job> {
        let resp = self
            .request(Method::POST, QueueKind::Edge.jobs_path())
            .json(request)
            .send()
            .await?;
        Ok(decode::<JobEnvelope>(resp).await?.job)
    }

    /// Ask for the next job. `Ok(None)` means the queue had nothing eligible.
    pub async fn lease_next(
        &self,
        queue: QueueKind,
        worker_id: &str,
        tags: Option<&TagSet>,
    ) -> Result<Option<Job>> {
        let query = LeaseQuery {
            worker_id: Some(worker_id.to_string()),
            tags: tags.filter(|t| !t.is_empty()).map(|t| t.to_string()),
        };
        let resp = self
            .request(Method::GET, queue.next_path())
            .query(&query)
            .send()
            .await?;
        if resp.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        Ok(Some(decode::<JobEnvelope>(resp).await?.job))
    }

    pub async fn complete(
        &self,
        queue: QueueKind,
        job_id: &Uuid,
        request: &CompleteJobRequest,
    ) -> Result<Job> {
        let resp = self
            .request(Method::POST, &queue.complete_path(job_id))
            .json(request)
            .send()
            .await?;
        Ok(decode::<JobEnvelope>(resp).await?.job)
    }

    pub async fn register(&self, request: &RegisterWorkerRequest) -> Result<RegisterAck> {
        let resp = self
            .request(Method::POST, "/api/edge/workers/register")
            .json(request)
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn heartbeat(&self, request: &HeartbeatRequest) -> Result<HeartbeatResponse> {
        let resp = self
            .request(Method::POST, "/api/edge/workers/heartbeat")
            .json(request)
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn get_job(&self, queue: QueueKind, job_id: &Uuid) -> Result<Job> {
        let path = format!("{}/{}", queue.jobs_path(), job_id);
        let resp = self.request(Method::GET, &path).send().await?;
        Ok(decode::<JobEnvelope>(resp).await?.job)
    }

    pub async fn list_jobs(&self, queue: QueueKind) -> Result<Vec<Job>> {
        let resp = self.request(Method::GET, queue.jobs_path()).send().await?;
        Ok(decode::<JobList>(resp).await?.jobs)
    }

    pub async fn stats(&self) -> Result<StatsResponse> {
        let resp = self.request(Method::GET, "/api/stats").send().await?;
        decode(resp).await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json().await?);
    }
    let code = match resp.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("unknown")
            .to_lowercase()
            .replace(' ', "_"),
    };
    Err(DispatchError::Remote {
        status: status.as_u16(),
        code,
    })
}
