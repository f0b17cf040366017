use axum::{
    Json,
    extract::multipart::{MultipartError, MultipartRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

const REDACTED_MESSAGE: &str = "Detection failed";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No image uploaded")]
    NoImage,

    /// Malformed stream or body over the limit, reported with the parser's status
    #[error("{message}")]
    Multipart { status: StatusCode, message: String },

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NoImage => StatusCode::BAD_REQUEST,
            ApiError::Multipart { status, .. } => *status,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::Multipart {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

/// Anything that is not a multipart request at all counts as a missing upload
impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        tracing::debug!(reason = %rejection.body_text(), "Request is not multipart");
        ApiError::NoImage
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Decides how much of a server fault reaches the client.
#[derive(Debug, Clone, Copy)]
pub struct ErrorPolicy {
    pub expose_details: bool,
}

impl ErrorPolicy {
    pub fn new(expose_details: bool) -> Self {
        Self { expose_details }
    }

    /// Log the full chain and turn it into a 500.
    pub fn internal(&self, err: anyhow::Error) -> ApiError {
        tracing::error!(error = ?err, "Detection failed");

        if self.expose_details {
            ApiError::Internal(format!("{:#}", err))
        } else {
            ApiError::Internal(REDACTED_MESSAGE.to_string())
        }
    }
}
