//! Edge-only endpoints: tagged submission and the worker registry.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde_json::Value;

use crate::api::types::{
    HeartbeatRequest, HeartbeatResponse, JobEnvelope, RegisterWorkerRequest, SubmitEdgeJobRequest,
    WorkerList,
};
use crate::error::{DispatchError, Result};
use crate::scheduler::{
    Caller, EdgeDispatcher, HeartbeatUpdate, NewJob, Priority, RegisterAck, WorkerMetadata,
};

/// `POST /api/edge/jobs`: `{task: {kind, ...}, requirements?, priority?, metadata?}`.
pub async fn submit_job(
    State(dispatcher): State<Arc<EdgeDispatcher>>,
    body: std::result::Result<Json<SubmitEdgeJobRequest>, JsonRejection>,
) -> Result<Json<JobEnvelope>> {
    dispatcher.authorize_submit()?;
    let Json(body) = body?;

    let task = match body.task {
        Some(task @ Value::Object(_)) => task,
        _ => return Err(DispatchError::TaskRequired),
    };
    let kind = task
        .get("kind")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or(DispatchError::TaskKindRequired)?
        .to_string();

    let mut request = NewJob::new(kind, task)
        .with_priority(Priority::parse_lossy(body.priority.as_deref()))
        .with_requirements(body.requirements.unwrap_or_default());
    if let Some(metadata) = body.metadata {
        request = request.with_metadata(metadata);
    }

    let job = dispatcher.submit(request).await?;
    Ok(Json(JobEnvelope { job }))
}

pub async fn register_worker(
    State(dispatcher): State<Arc<EdgeDispatcher>>,
    body: std::result::Result<Json<RegisterWorkerRequest>, JsonRejection>,
) -> Result<Json<RegisterAck>> {
    dispatcher.authorize_worker(&Caller::default())?;
    let Json(body) = body?;

    let worker_id = body.worker_id.unwrap_or_default();
    let metadata = WorkerMetadata {
        battery: body.battery,
        capabilities: body.capabilities,
    };
    let ack = dispatcher
        .register(&worker_id, body.tags.unwrap_or_default(), metadata)
        .await?;
    Ok(Json(ack))
}

pub async fn heartbeat(
    State(dispatcher): State<Arc<EdgeDispatcher>>,
    body: std::result::Result<Json<HeartbeatRequest>, JsonRejection>,
) -> Result<Json<HeartbeatResponse>> {
    dispatcher.authorize_worker(&Caller::default())?;
    let Json(body) = body?;

    let worker_id = body.worker_id.unwrap_or_default();
    let update = HeartbeatUpdate {
        tags: body.tags,
        battery: body.battery,
        capabilities: body.capabilities,
        active_job_id: body.active_job_id,
    };
    let tags = dispatcher.heartbeat(&worker_id, update).await?;
    Ok(Json(HeartbeatResponse { ok: true, tags }))
}

pub async fn list_workers(
    State(dispatcher): State<Arc<EdgeDispatcher>>,
) -> Result<Json<WorkerList>> {
    dispatcher.authorize_worker(&Caller::default())?;
    Ok(Json(WorkerList {
        workers: dispatcher.list_workers().await,
    }))
}
