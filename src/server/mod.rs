//! HTTP surface: routing, handlers and error mapping
//!
//! All routes live under `/api` and accept cross-origin requests from any
//! origin.

pub mod error;
pub mod handlers;
pub mod state;
pub mod upload;

pub use error::{ApiError, ApiResult};
pub use state::AppState;
pub use upload::ImageUpload;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Permissive CORS for every `/api` route
#[must_use]
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the application router
pub fn create_router(state: AppState, max_upload_bytes: usize) -> Router {
    let api = Router::new()
        .route("/remove-background", post(handlers::remove_background))
        .route("/health", get(handlers::health))
        .layer(cors_layer());

    Router::new()
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
