use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::orchestrator;
use crate::types::ProgressSnapshot;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    pub queue_ids: Vec<i64>,
    pub batch_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub success: bool,
    pub message: String,
    pub processed_count: u32,
    pub failed_count: u32,
    pub batch_id: String,
    pub results: Vec<()>,
}

/// Starts a batch asynchronously and returns immediately with the batch id
/// (spec.md §4.9, §6.2). Mirrors the Python router's `try`/`except` around
/// starting the batch: anything that goes wrong before the background task
/// is launched surfaces as a 500 instead of a fabricated success response.
pub async fn extract(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExtractRequest>,
) -> Result<Json<ExtractResponse>, ServiceError> {
    if request.queue_ids.is_empty() {
        return Err(ServiceError::Internal(anyhow::anyhow!("queue_ids must not be empty")));
    }

    let now = chrono::Utc::now().timestamp();
    let batch_id = match request.batch_id {
        Some(id) => state.ctx.tracker.start_with_id(id, now, &request.queue_ids),
        None => state.ctx.tracker.start(now, &request.queue_ids),
    };

    let ctx = Arc::clone(&state.ctx);
    let queue_ids = request.queue_ids.clone();
    let spawned_batch_id = batch_id.clone();
    tokio::spawn(async move {
        orchestrator::run(ctx, queue_ids, spawned_batch_id).await;
    });

    Ok(Json(ExtractResponse {
        success: true,
        message: "Batch started".to_string(),
        processed_count: 0,
        failed_count: 0,
        batch_id,
        results: Vec::new(),
    }))
}

pub async fn progress(State(state): State<Arc<AppState>>, Path(batch_id): Path<String>) -> Json<ProgressSnapshot> {
    Json(state.ctx.tracker.get(&batch_id))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub service: &'static str,
    pub status: &'static str,
    pub capabilities: [&'static str; 3],
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        service: "document_text_extraction",
        status: "healthy",
        capabilities: ["pdf_download", "ocr_and_text_extraction", "text_file_storage"],
    })
}

#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub service: &'static str,
    pub description: &'static str,
    pub endpoints: [&'static str; 3],
}

pub async fn info() -> Json<InfoResponse> {
    Json(InfoResponse {
        service: "document_text_extraction",
        description: "Document text-extraction worker service",
        endpoints: [
            "POST /api/document-text-extraction/extract",
            "GET /api/document-text-extraction/progress/:batch_id",
            "GET /api/document-text-extraction/health",
        ],
    })
}
