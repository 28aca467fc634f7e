use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::DispatchError;

impl DispatchError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::QueueFull => StatusCode::TOO_MANY_REQUESTS,
            DispatchError::EdgeJobsDisabled => StatusCode::FORBIDDEN,
            DispatchError::WorkerIdRequired
            | DispatchError::TaskRequired
            | DispatchError::TaskKindRequired
            | DispatchError::StatusRequired
            | DispatchError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            DispatchError::MissingWorkerToken => StatusCode::UNAUTHORIZED,
            DispatchError::InvalidWorkerToken => StatusCode::FORBIDDEN,
            DispatchError::ProviderUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            DispatchError::JobNotFound(_) | DispatchError::WorkerNotRegistered(_) => {
                StatusCode::NOT_FOUND
            }
            DispatchError::JobNotInProgress(_) => StatusCode::BAD_REQUEST,
            DispatchError::Http(_) | DispatchError::Remote { .. } => StatusCode::BAD_GATEWAY,
            DispatchError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }
        (status, Json(json!({ "error": self.code() }))).into_response()
    }
}

impl From<JsonRejection> for DispatchError {
    fn from(rejection: JsonRejection) -> Self {
        DispatchError::InvalidRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for DispatchError {
    fn from(rejection: QueryRejection) -> Self {
        DispatchError::InvalidRequest(rejection.body_text())
    }
}
