//! service1 - document text-extraction worker.
//!
//! Dequeues PDF jobs, extracts per-page text with a primary renderer and
//! quality-gated OCR fallback, persists artifacts to a pluggable object
//! store, and hands successful extractions off to a downstream service.

mod config;
mod error;
mod extraction;
mod notify;
mod orchestrator;
mod password;
mod progress;
mod queue;
mod server;
mod storage;
mod types;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::{Config, Settings};
use extraction::engine::{ExternalToolPrimaryEngine, TesseractEngine};
use orchestrator::OrchestratorContext;
use password::PasswordResolver;
use progress::ProgressTracker;
use queue::QueueStore;

#[derive(Parser, Debug)]
#[command(name = "service1-worker", about = "Document text-extraction worker service")]
struct Args {
    /// HTTP bind host.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// HTTP bind port. Overrides `SERVICE1_PORT` when set.
    #[arg(long)]
    port: Option<u16>,

    /// Number of documents processed concurrently per batch.
    #[arg(long)]
    workers: Option<usize>,

    /// Increase log verbosity (service1=info instead of service1=warn).
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let default_filter = if args.verbose { "service1=info" } else { "service1=warn" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::discover();
    let mut settings = Settings::from_config(&config);
    if let Some(workers) = args.workers {
        settings.workers = workers;
    }
    let port = args.port.unwrap_or(settings.http_port);
    let settings = Arc::new(settings);

    tracing::info!(
        datalake_root = %settings.datalake_root.display(),
        output_root = %settings.output_root,
        workers = settings.workers,
        "service1 starting"
    );

    let queue = QueueStore::connect(&settings.database_url).await?;
    let storage = storage::build_from_root(&settings.output_root);
    let passwords = PasswordResolver::new(Some(settings.default_pdf_password.clone()));

    let ctx = Arc::new(OrchestratorContext {
        queue: Arc::new(queue),
        storage: Arc::from(storage),
        tracker: Arc::new(ProgressTracker::new()),
        passwords: Arc::new(passwords),
        primary: Arc::new(ExternalToolPrimaryEngine::default()),
        ocr: Some(Arc::new(TesseractEngine::default())),
        http: reqwest::Client::new(),
        settings: Arc::clone(&settings),
    });

    server::serve(ctx, &args.host, port).await
}
