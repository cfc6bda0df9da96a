// src/server/error.rs

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{debug, error};

use crate::errors::ProofrunError;

/// Stable error body returned by every endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error_code: u16,
    pub detail: String,
}

/// `ProofrunError` as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub ProofrunError);

impl From<ProofrunError> for ApiError {
    fn from(err: ProofrunError) -> Self {
        ApiError(err)
    }
}

pub fn status_for(err: &ProofrunError) -> StatusCode {
    match err {
        ProofrunError::AlreadyRunning | ProofrunError::NotRunning | ProofrunError::Conflict(_) => {
            StatusCode::CONFLICT
        }
        ProofrunError::NotFound(_) => StatusCode::NOT_FOUND,
        ProofrunError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        ProofrunError::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
        ProofrunError::StartupTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        ProofrunError::ConfigError(_)
        | ProofrunError::IoError(_)
        | ProofrunError::TomlError(_)
        | ProofrunError::JsonError(_)
        | ProofrunError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let detail = format!("{:#}", anyhow::Error::new(self.0));

        if status.is_server_error() {
            error!(status = status.as_u16(), %detail, "request failed");
        } else {
            debug!(status = status.as_u16(), %detail, "request rejected");
        }

        let body = ErrorBody {
            error_code: status.as_u16(),
            detail,
        };
        (status, Json(body)).into_response()
    }
}
