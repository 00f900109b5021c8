use crate::coordinator::CoordinatorError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Coordinator error: {0}")]
    CoordinatorError(#[from] CoordinatorError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message, error_code) = match self {
            ApiError::CoordinatorError(e) => match e {
                CoordinatorError::InvalidArgument(_) => {
                    (StatusCode::BAD_REQUEST, e.to_string(), "INVALID_ARGUMENT")
                }
                CoordinatorError::TransferNotFound(_) => {
                    (StatusCode::NOT_FOUND, e.to_string(), "NOT_FOUND")
                }
                CoordinatorError::TransferActive(_) => {
                    (StatusCode::CONFLICT, e.to_string(), "TRANSFER_ACTIVE")
                }
                CoordinatorError::Persistence(_) => {
                    tracing::error!("Request failed on persistence: {}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        e.to_string(),
                        "PERSISTENCE_ERROR",
                    )
                }
            },
            ApiError::InvalidRequest(e) => (StatusCode::BAD_REQUEST, e, "INVALID_REQUEST"),
            ApiError::Conflict(e) => (StatusCode::CONFLICT, e, "CONFLICT"),
            ApiError::InternalError(e) => {
                (StatusCode::INTERNAL_SERVER_ERROR, e, "INTERNAL_ERROR")
            }
        };

        let body = Json(json!({
            "error": error_message,
            "code": error_code,
        }));

        (status, body).into_response()
    }
}

impl From<crate::store::StoreError> for ApiError {
    fn from(err: crate::store::StoreError) -> Self {
        ApiError::CoordinatorError(err.into())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
