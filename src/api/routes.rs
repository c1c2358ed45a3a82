//! HTTP route definitions

use crate::api::handlers;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Create the main application router
pub fn create_router(state: Arc<crate::AppState>) -> Router {
    let max_upload = state.settings.server.max_upload_bytes;
    let request_timeout = state.settings.request_timeout();

    Router::new()
        // Image generation endpoint (multipart form)
        .route("/generate", post(handlers::generate_image))
        // Capability discovery
        .route("/models", get(handlers::list_models))
        // Health check endpoint
        .route("/health", get(handlers::health_check))
        .layer(DefaultBodyLimit::max(max_upload))
        // Add shared state
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(request_timeout)),
        )
}
