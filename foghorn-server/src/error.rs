//! Maps the core error taxonomy (§7) onto HTTP status codes and sanitized
//! response bodies via `IntoResponse`. Internal detail (DB text, downstream
//! stack traces) never crosses this boundary — only `FoghornError`'s own
//! `Display` does, and its variants are already written as externally-safe
//! messages.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use foghorn_core::error::FoghornError;
use serde_json::json;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "status": self.status.as_u16(),
            }
        }));
        (self.status, body).into_response()
    }
}

/// §7 propagation policy: typed errors become standard status codes with
/// sanitized messages.
impl From<FoghornError> for ApiError {
    fn from(err: FoghornError) -> Self {
        match err {
            FoghornError::IngestRejected(code) => Self::new(StatusCode::FORBIDDEN, code.to_string()),
            FoghornError::NoCapacity => Self::new(StatusCode::SERVICE_UNAVAILABLE, "FULL"),
            FoghornError::DownstreamUnavailable(_) => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "downstream unavailable")
            }
            FoghornError::PayloadTypeMismatch { .. } => {
                Self::new(StatusCode::BAD_REQUEST, "malformed trigger payload")
            }
            FoghornError::TenantMissing => Self::new(StatusCode::BAD_REQUEST, "tenant_id required"),
            FoghornError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, "not found"),
            FoghornError::InvalidArgument(msg) => Self::new(StatusCode::BAD_REQUEST, msg),
            FoghornError::Io(_) | FoghornError::Serialization(_) | FoghornError::Internal(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
            #[cfg(feature = "database")]
            FoghornError::Database(_) => Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error"),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}
