use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error taxonomy shared by all three services. Every HTTP surface in
/// this workspace maps its failures onto one of these kinds rather than
/// inventing a per-service error shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApiErrorKind {
    InvalidInput,
    Unauthenticated,
    PolicyDenied,
    NotFound,
    Conflict,
    UpstreamUnavailable,
    RuntimeUnavailable,
    Cancelled,
    Internal,
}

impl ApiErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ApiErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ApiErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiErrorKind::PolicyDenied => StatusCode::FORBIDDEN,
            ApiErrorKind::NotFound => StatusCode::NOT_FOUND,
            ApiErrorKind::Conflict => StatusCode::CONFLICT,
            ApiErrorKind::UpstreamUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
            ApiErrorKind::RuntimeUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
            ApiErrorKind::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
            ApiErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True for the two kinds the retry policy in the data plane is allowed
    /// to retry on; invalid-input, policy-denied, and not-found never are.
    pub fn retryable(self) -> bool {
        matches!(
            self,
            ApiErrorKind::UpstreamUnavailable | ApiErrorKind::RuntimeUnavailable
        )
    }
}

#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::InvalidInput, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Unauthenticated, message)
    }

    pub fn policy_denied(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::PolicyDenied, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Conflict, message)
    }

    pub fn upstream_unavailable(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::UpstreamUnavailable, message)
    }

    pub fn runtime_unavailable(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::RuntimeUnavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Internal, message)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub code: ApiErrorKind,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.kind.status();
        let body = ApiErrorBody {
            code: self.kind,
            message: self.message,
        };
        (status, Json(body)).into_response()
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::upstream_unavailable(err.to_string())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::internal(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::invalid_input(err.to_string())
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::internal(err.to_string())
    }
}
