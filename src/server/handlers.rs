//! HTTP request handlers

use super::error::{ApiError, ApiResult};
use super::state::AppState;
use super::upload::ImageUpload;
use crate::error::BgRemovalError;
use crate::processor::BackgroundRemovalProcessor;
use crate::tracing_config::spans;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::backtrace::Backtrace;
use tracing::{debug, error, Instrument, Span};
use uuid::Uuid;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Liveness probe
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Remove the background from the uploaded `image` file and answer with a PNG
pub async fn remove_background(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Response> {
    let request_id = Uuid::new_v4().to_string();
    let span = spans::request(&request_id, "/api/remove-background");

    async move {
        debug!("Received request to remove background");

        let multipart = multipart.map_err(|rejection| {
            debug!(reason = %rejection, "Request is not a multipart upload");
            ApiError::NoImageProvided
        })?;
        let upload = ImageUpload::from_multipart(multipart).await.map_err(|e| {
            if let ApiError::Processing(_) = e {
                log_failure("Multipart", &e.to_string());
            } else {
                debug!(error = %e, "Rejected upload");
            }
            e
        })?;
        debug!(
            filename = %upload.filename,
            content_type = ?upload.content_type,
            bytes = upload.data.len(),
            "Received file"
        );

        let processor = state.processor.clone();
        let blocking_span = Span::current();
        let png = tokio::task::spawn_blocking(move || {
            blocking_span.in_scope(|| remove_background_png(&processor, &upload))
        })
        .await
        .map_err(|e| {
            let message = format!("Background removal task failed: {e}");
            log_failure("Join", &message);
            ApiError::processing(message)
        })?
        .map_err(|e| {
            log_failure(e.kind(), &e.to_string());
            ApiError::from(e)
        })?;

        Ok::<_, ApiError>(([(header::CONTENT_TYPE, "image/png")], png).into_response())
    }
    .instrument(span)
    .await
}

/// Decode, remove the background and encode as PNG
fn remove_background_png(
    processor: &BackgroundRemovalProcessor,
    upload: &ImageUpload,
) -> Result<Vec<u8>, BgRemovalError> {
    let image = upload.decode()?;
    debug!(
        width = image.width(),
        height = image.height(),
        color = ?image.color(),
        "Opened image"
    );

    debug!("Removing background");
    let result = processor.process_image(&image)?;

    debug!("Converting to PNG");
    let png = result.to_png_bytes()?;
    debug!(bytes = png.len(), "Wrote PNG buffer");
    Ok(png)
}

fn log_failure(kind: &str, message: &str) {
    error!(
        kind,
        error = %message,
        backtrace = %failure_backtrace(),
        "Background removal request failed"
    );
}

/// Stack trace for failure logs, captured regardless of `RUST_BACKTRACE`
fn failure_backtrace() -> Backtrace {
    Backtrace::force_capture()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::backtrace::BacktraceStatus;

    #[test]
    fn test_failure_backtrace_ignores_backtrace_env() {
        std::env::remove_var("RUST_BACKTRACE");
        std::env::remove_var("RUST_LIB_BACKTRACE");

        let backtrace = failure_backtrace();
        assert_eq!(backtrace.status(), BacktraceStatus::Captured);
        assert_ne!(backtrace.to_string(), "disabled backtrace");
    }

    #[tokio::test]
    async fn test_health_body() {
        let Json(body) = health().await;
        assert_eq!(body.status, "ok");
    }
}
