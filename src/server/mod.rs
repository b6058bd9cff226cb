//! HTTP Surface (C9): the control plane for starting batches, polling
//! progress, and health (spec.md §4.9, §6.2).

mod handlers;
mod routes;

use std::sync::Arc;

use tower_http::cors::CorsLayer;

use crate::orchestrator::OrchestratorContext;

pub struct AppState {
    pub ctx: Arc<OrchestratorContext>,
}

pub async fn serve(ctx: Arc<OrchestratorContext>, host: &str, port: u16) -> anyhow::Result<()> {
    let state = Arc::new(AppState { ctx });
    let app = routes::router(state).layer(CorsLayer::permissive());

    let addr = format!("{host}:{port}");
    tracing::info!(addr, "starting service1 HTTP server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
