use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use super::{handlers, AppState};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/document-text-extraction/extract", post(handlers::extract))
        .route(
            "/api/document-text-extraction/progress/:batch_id",
            get(handlers::progress),
        )
        .route("/api/document-text-extraction/health", get(handlers::health))
        .route("/api/document-text-extraction/", get(handlers::info))
        .with_state(state)
}
