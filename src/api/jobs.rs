//! Handlers shared by both queues: inspect, list, lease-next and complete.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use uuid::Uuid;

use crate::api::auth::BearerToken;
use crate::api::types::{CompleteJobRequest, JobEnvelope, JobList, LeaseQuery};
use crate::error::{DispatchError, Result};
use crate::scheduler::{Caller, Completion, DispatchPolicy, Dispatcher, TagSet};

/// Unparseable ids are reported as unknown jobs.
pub(crate) fn parse_job_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| DispatchError::JobNotFound(raw.to_string()))
}

pub async fn inspect_job<P: DispatchPolicy>(
    State(dispatcher): State<Arc<Dispatcher<P>>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobEnvelope>> {
    let job = dispatcher.get_job(&parse_job_id(&job_id)?).await?;
    Ok(Json(JobEnvelope { job }))
}

pub async fn list_jobs<P: DispatchPolicy>(
    State(dispatcher): State<Arc<Dispatcher<P>>>,
) -> Json<JobList> {
    Json(JobList {
        jobs: dispatcher.list_jobs().await,
    })
}

/// `200 {job}` on a lease, `204` when nothing eligible is queued.
pub async fn lease_next<P: DispatchPolicy>(
    State(dispatcher): State<Arc<Dispatcher<P>>>,
    BearerToken(token): BearerToken,
    query: std::result::Result<Query<LeaseQuery>, QueryRejection>,
) -> Result<Response> {
    let Query(query) = query?;
    let caller = Caller {
        worker_id: query.worker_id,
        tags: query
            .tags
            .as_deref()
            .map(TagSet::parse_csv)
            .filter(|tags| !tags.is_empty()),
        token,
    };

    match dispatcher.lease_next(&caller).await? {
        Some(job) => Ok(Json(JobEnvelope { job }).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

pub async fn complete_job<P: DispatchPolicy>(
    State(dispatcher): State<Arc<Dispatcher<P>>>,
    BearerToken(token): BearerToken,
    Path(job_id): Path<String>,
    body: std::result::Result<Json<CompleteJobRequest>, JsonRejection>,
) -> Result<Json<JobEnvelope>> {
    let mut caller = Caller {
        token,
        ..Caller::default()
    };
    dispatcher.authorize_worker(&caller)?;
    let Json(body) = body?;
    caller.worker_id = body.worker_id;

    let job_id = parse_job_id(&job_id)?;
    let status = body
        .status
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(DispatchError::StatusRequired)?;

    let completion = Completion {
        status,
        result: body.result,
        detail: body.detail,
    };
    let job = dispatcher.complete(&caller, &job_id, completion).await?;
    Ok(Json(JobEnvelope { job }))
}
