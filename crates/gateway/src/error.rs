use crate::pipeline::PipelineError;
use crate::store::LookupError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced to HTTP clients. Messages are fixed per category so no
/// filesystem path or internal detail reaches a response body.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("No image uploaded")]
    NoImage,

    #[error("{message}")]
    InvalidUpload { status: StatusCode, message: String },

    #[error("Forbidden")]
    Forbidden,

    #[error("Not found")]
    NotFound,

    #[error("Failed to store image")]
    Storage,

    #[error("Inference failed")]
    Inference,

    #[error("Inference timed out")]
    Timeout,

    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NoImage => StatusCode::BAD_REQUEST,
            ApiError::InvalidUpload { status, .. } => *status,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Storage | ApiError::Inference | ApiError::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::NoImage => ApiError::NoImage,
            PipelineError::Storage(_) => ApiError::Storage,
            PipelineError::Inference(_) => ApiError::Inference,
            PipelineError::Timeout(_) => ApiError::Timeout,
            PipelineError::Internal(_) => ApiError::Internal,
        }
    }
}

impl From<LookupError> for ApiError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::Forbidden => ApiError::Forbidden,
            LookupError::NotFound => ApiError::NotFound,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
        };

        (self.status_code(), Json(body)).into_response()
    }
}
