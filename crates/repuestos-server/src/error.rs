use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use repuestos_core::{retry_after_secs, CoreError, SearchRejection, SourceErrorKind, ValidationError};
use repuestos_store::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

/// User-facing text for failures whose detail stays in the logs.
pub const GENERIC_ERROR: &str = "Internal error while searching. Please try again later.";

/// Startup failures of the server binary.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Request-level failures, rendered as `{success: false, error, ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Rejected(#[from] SearchRejection),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<ValidationError> for ApiError {
    fn from(error: ValidationError) -> Self {
        Self::BadRequest(error.to_string())
    }
}

/// JSON error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ErrorBody {
    fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            message: None,
            retry_after: None,
        }
    }

    fn waiting(error: &str, message: String, retry_after: u64) -> Self {
        Self {
            message: Some(message),
            retry_after: Some(retry_after),
            ..Self::new(error)
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorBody::new(message))).into_response()
            }
            Self::Rejected(SearchRejection::CooldownActive { retry_after }) => {
                let secs = retry_after_secs(retry_after);
                waiting_response(
                    StatusCode::TOO_MANY_REQUESTS,
                    ErrorBody::waiting(
                        "cooldown_active",
                        format!("Please wait {secs} seconds before searching again."),
                        secs,
                    ),
                )
            }
            Self::Rejected(SearchRejection::Saturated { kind, retry_after }) => {
                let secs = retry_after_secs(retry_after);
                let status = if kind == SourceErrorKind::RateLimited {
                    StatusCode::TOO_MANY_REQUESTS
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                };
                waiting_response(
                    status,
                    ErrorBody::waiting(
                        "upstream_saturated",
                        format!("Sources are busy right now. Please wait {secs} seconds and try again."),
                        secs,
                    ),
                )
            }
            Self::Rejected(SearchRejection::Upstream { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody::new(GENERIC_ERROR))).into_response()
            }
            Self::Core(error) => {
                error!("request failed: {error}");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody::new(GENERIC_ERROR))).into_response()
            }
        }
    }
}

fn waiting_response(status: StatusCode, body: ErrorBody) -> Response {
    let retry_after = body.retry_after.unwrap_or(1).to_string();
    (status, [(header::RETRY_AFTER, retry_after)], Json(body)).into_response()
}
