use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;

use crate::api::types::{JobEnvelope, SubmitJobRequest};
use crate::error::Result;
use crate::scheduler::{NewJob, Priority, TrustedDispatcher};

/// `POST /api/jobs`: `{kind|tool, payload?, priority?}`.
pub async fn submit_job(
    State(dispatcher): State<Arc<TrustedDispatcher>>,
    body: std::result::Result<Json<SubmitJobRequest>, JsonRejection>,
) -> Result<Json<JobEnvelope>> {
    dispatcher.authorize_submit()?;
    let Json(body) = body?;

    let kind = body.kind.or(body.tool).unwrap_or_default();
    let request = NewJob::new(kind.trim(), body.payload)
        .with_priority(Priority::parse_lossy(body.priority.as_deref()));

    let job = dispatcher.submit(request).await?;
    Ok(Json(JobEnvelope { job }))
}
