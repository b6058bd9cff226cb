//! Crate-wide error aggregation for the HTTP boundary (C9). Component errors
//! (`QueueError`, `StorageError`, `ExtractionError`) are handled and logged
//! close to their source; this type exists only for setup-time failures that
//! should surface as a 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("queue store error: {0}")]
    Queue(#[from] crate::queue::QueueError),
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "request failed");
        let body = serde_json::json!({ "success": false, "message": self.to_string() });
        (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(body)).into_response()
    }
}
