//! HTTP error responses

use crate::error::BgRemovalError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

/// Errors returned to HTTP clients as `{"error": <message>}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No image file provided")]
    NoImageProvided,

    #[error("No file selected")]
    NoFileSelected,

    #[error("{0}")]
    UploadTooLarge(String),

    #[error("{0}")]
    Processing(String),
}

impl ApiError {
    pub fn processing(msg: impl Into<String>) -> Self {
        Self::Processing(msg.into())
    }

    /// Map a multipart stream failure, keeping the body limit rejection distinct
    pub fn from_multipart(err: axum::extract::multipart::MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::UploadTooLarge(err.body_text())
        } else {
            Self::Processing(err.body_text())
        }
    }

    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NoImageProvided | Self::NoFileSelected => StatusCode::BAD_REQUEST,
            Self::UploadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<BgRemovalError> for ApiError {
    fn from(err: BgRemovalError) -> Self {
        Self::Processing(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::NoImageProvided.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::NoFileSelected.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::processing("boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_library_errors_become_processing() {
        let err: ApiError = BgRemovalError::inference("session exploded").into();
        assert!(matches!(err, ApiError::Processing(_)));
        assert_eq!(err.to_string(), "Inference error: session exploded");
    }

    #[test]
    fn test_messages() {
        assert_eq!(ApiError::NoImageProvided.to_string(), "No image file provided");
        assert_eq!(ApiError::NoFileSelected.to_string(), "No file selected");
    }
}
