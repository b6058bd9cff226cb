//! Batch Orchestrator (C7): runs every document of a batch concurrently under
//! a bounded worker pool, following the per-document pipeline in spec.md
//! §4.7. Ordering guarantees and the release-on-every-path contract live
//! here, not in the individual components.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;

use crate::config::Settings;
use crate::extraction::{self, OcrEngine, PrimaryEngine};
use crate::notify;
use crate::password::PasswordResolver;
use crate::progress::{ProgressTracker, SnapshotUpdate};
use crate::queue::{QueueBackend, UriField};
use crate::storage::{self, ObjectStore};
use crate::types::{DocumentOutcome, ExtractionResult, QueueRow, STATUS_FAILED, STATUS_SUCCESS};

/// Default minimum primary-path text length before OCR fallback triggers
/// (spec.md §4.4.2). Not presently exposed through any configuration key.
pub const DEFAULT_MIN_TEXT_LENGTH: usize = 250;

/// Shared handles every per-document unit of work needs. Constructed once at
/// startup and cloned cheaply (everything behind an `Arc`) per batch.
pub struct OrchestratorContext {
    pub queue: Arc<dyn QueueBackend>,
    pub storage: Arc<dyn ObjectStore>,
    pub tracker: Arc<ProgressTracker>,
    pub passwords: Arc<PasswordResolver>,
    pub primary: Arc<dyn PrimaryEngine>,
    pub ocr: Option<Arc<dyn OcrEngine>>,
    pub http: reqwest::Client,
    pub settings: Arc<Settings>,
}

/// Releases the queue-row lock exactly once, on every exit path including a
/// panic unwind through this worker's stack.
struct ReleaseGuard {
    queue: Arc<dyn QueueBackend>,
    doc_id: String,
    released: bool,
}

impl ReleaseGuard {
    fn new(queue: Arc<dyn QueueBackend>, doc_id: String) -> Self {
        Self {
            queue,
            doc_id,
            released: false,
        }
    }

    async fn release(mut self) {
        self.released = true;
        if let Err(e) = self.queue.release_lock(&self.doc_id).await {
            tracing::warn!(doc_id = %self.doc_id, error = %e, "failed to release processing lock");
        }
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if !self.released {
            let queue = Arc::clone(&self.queue);
            let doc_id = self.doc_id.clone();
            tokio::spawn(async move {
                let _ = queue.release_lock(&doc_id).await;
            });
        }
    }
}

async fn finish(guard: ReleaseGuard, outcome: DocumentOutcome) -> DocumentOutcome {
    guard.release().await;
    outcome
}

/// Entry point: resolves `queue_ids`, fans out one unit of work per document
/// bounded by `settings.workers`, and settles the batch snapshot.
pub async fn run(ctx: Arc<OrchestratorContext>, queue_ids: Vec<i64>, batch_id: String) {
    let rows = match ctx.queue.fetch_pending(&queue_ids).await {
        Ok(rows) => rows,
        Err(e) => {
            ctx.tracker
                .fail(&batch_id, Utc::now().timestamp(), format!("failed to load queue rows: {e}"));
            return;
        }
    };

    if rows.is_empty() {
        ctx.tracker
            .fail(&batch_id, Utc::now().timestamp(), "No documents found in queue");
        return;
    }

    let total_pages: u32 = rows.iter().map(|r| r.number_of_pages.max(0) as u32).sum();
    ctx.tracker.set_total_pages(&batch_id, total_pages);
    ctx.tracker.update(
        &batch_id,
        SnapshotUpdate {
            current_operation: Some(Some("Starting parallel document processing...".to_string())),
            ..Default::default()
        },
    );

    let semaphore = Arc::new(Semaphore::new(ctx.settings.workers.max(1)));
    let mut handles = Vec::with_capacity(rows.len());
    for row in rows {
        let ctx = Arc::clone(&ctx);
        let batch_id = batch_id.clone();
        let semaphore = Arc::clone(&semaphore);
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
            process_document(ctx, batch_id, row).await
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(outcome) => results.push(outcome),
            Err(e) => results.push(DocumentOutcome {
                doc_id: "unknown".to_string(),
                success: false,
                error: Some(format!("worker task panicked: {e}")),
            }),
        }
    }

    let now = Utc::now().timestamp();
    if results.iter().any(|r| r.success) {
        ctx.tracker.complete(&batch_id, now, results);
    } else {
        ctx.tracker.fail(&batch_id, now, "All documents failed to process");
    }
}

async fn process_document(ctx: Arc<OrchestratorContext>, batch_id: String, row: QueueRow) -> DocumentOutcome {
    let doc_id = row.doc_id.clone();
    let started = std::time::Instant::now();

    let acquired = ctx.queue.try_acquire_lock(&doc_id).await.unwrap_or(false);
    if !acquired {
        return DocumentOutcome {
            doc_id,
            success: false,
            error: Some("Document is currently being processed".to_string()),
        };
    }
    let guard = ReleaseGuard::new(Arc::clone(&ctx.queue), doc_id.clone());

    ctx.tracker.update(
        &batch_id,
        SnapshotUpdate {
            current_document: Some(Some(doc_id.clone())),
            current_stage: Some(Some("downloading_pdf".to_string())),
            ..Default::default()
        },
    );

    let local_path = match materialize_source_pdf(&ctx.settings.datalake_root, &doc_id, &row, &ctx.http).await {
        Ok(path) => path,
        Err(message) => {
            let _ = ctx.queue.set_status(&doc_id, STATUS_FAILED).await;
            let _ = ctx.queue.set_error(&doc_id, &message).await;
            return finish(
                guard,
                DocumentOutcome {
                    doc_id,
                    success: false,
                    error: Some(message),
                },
            )
            .await;
        }
    };

    if let Err(e) = ctx
        .queue
        .set_uri(&doc_id, UriField::Raw, &local_path.to_string_lossy())
        .await
    {
        tracing::warn!(doc_id = %doc_id, error = %e, "failed to write datalake_raw_uri");
    }

    ctx.tracker.update(
        &batch_id,
        SnapshotUpdate {
            current_stage: Some(Some("extracting_text".to_string())),
            ..Default::default()
        },
    );

    let candidates = ctx.passwords.candidates(&local_path, row.password.as_deref());
    let result = run_extraction(&ctx, local_path.clone(), candidates).await;

    if !result.success {
        let message = result
            .error_message
            .clone()
            .unwrap_or_else(|| "extraction failed".to_string());
        let _ = ctx.queue.set_status(&doc_id, STATUS_FAILED).await;
        let _ = ctx.queue.set_error(&doc_id, &message).await;
        return finish(
            guard,
            DocumentOutcome {
                doc_id,
                success: false,
                error: Some(message),
            },
        )
        .await;
    }

    if let Some(password) = &result.password_used {
        ctx.passwords.save_successful(&local_path, password);
    }

    let mut page_numbers: Vec<u32> = result.pages.keys().copied().collect();
    page_numbers.sort_unstable();
    for page_number in page_numbers {
        let page = &result.pages[&page_number];
        let (key, body) = extraction::page_artifact(&doc_id, page_number, page.method, &page.text);
        if let Err(e) = ctx.storage.put(&key, &body, "text/markdown; charset=utf-8").await {
            let message = format!("failed to persist page {page_number}: {e}");
            let _ = ctx.queue.set_status(&doc_id, STATUS_FAILED).await;
            let _ = ctx.queue.set_error(&doc_id, &message).await;
            return finish(
                guard,
                DocumentOutcome {
                    doc_id,
                    success: false,
                    error: Some(message),
                },
            )
            .await;
        }
    }

    let text_uri = storage::text_uri(&ctx.settings.output_root, &doc_id);
    if let Err(e) = ctx.queue.set_uri(&doc_id, UriField::Text, &text_uri).await {
        tracing::warn!(doc_id = %doc_id, error = %e, "failed to write datalake_text_uri");
    }
    if let Err(e) = ctx.queue.set_status(&doc_id, STATUS_SUCCESS).await {
        tracing::warn!(doc_id = %doc_id, error = %e, "failed to write text_extraction_status");
    }

    let duration_seconds = started.elapsed().as_secs() as i32;
    if let Err(e) = ctx.queue.set_duration(&doc_id, duration_seconds).await {
        tracing::warn!(doc_id = %doc_id, error = %e, "failed to write duration");
    }
    if let Err(e) = ctx.queue.touch_last_processed(&doc_id).await {
        tracing::warn!(doc_id = %doc_id, error = %e, "failed to touch last_processed_at");
    }

    ctx.tracker.increment_processed(&batch_id, result.total_pages);

    notify::notify(&ctx.http, &ctx.settings, row.extraction_id, &doc_id).await;

    finish(
        guard,
        DocumentOutcome {
            doc_id,
            success: true,
            error: None,
        },
    )
    .await
}

/// Runs the blocking primary/OCR pipeline on a dedicated thread so it never
/// stalls the async executor.
async fn run_extraction(
    ctx: &Arc<OrchestratorContext>,
    path: PathBuf,
    candidates: Vec<Option<String>>,
) -> ExtractionResult {
    let primary = Arc::clone(&ctx.primary);
    let ocr = ctx.ocr.clone();
    let min_text_length = DEFAULT_MIN_TEXT_LENGTH;

    tokio::task::spawn_blocking(move || {
        extraction::run(primary.as_ref(), ocr.as_deref(), &path, &candidates, None, min_text_length)
    })
    .await
    .unwrap_or_else(|e| ExtractionResult::failure(format!("extraction task panicked: {e}")))
}

/// Materializes `<datalake_root>/<doc_id>/source.pdf`, trying in order: an
/// existing cached copy, the row's `datalake_raw_uri` if it is a filesystem
/// path, the row's `source_uri` if it is a filesystem path, and finally an
/// HTTP(S) download of `source_uri` (spec.md §4.7d, §6.4).
async fn materialize_source_pdf(
    datalake_root: &Path,
    doc_id: &str,
    row: &QueueRow,
    http: &reqwest::Client,
) -> Result<PathBuf, String> {
    let doc_dir = datalake_root.join(doc_id);
    let dest = doc_dir.join("source.pdf");
    if dest.exists() {
        return Ok(dest);
    }

    tokio::fs::create_dir_all(&doc_dir)
        .await
        .map_err(|e| format!("failed to create {}: {e}", doc_dir.display()))?;

    if let Some(raw) = &row.datalake_raw_uri {
        if let Some(path) = local_fs_path(raw) {
            if tokio::fs::metadata(&path).await.is_ok() {
                tokio::fs::copy(&path, &dest)
                    .await
                    .map_err(|e| format!("failed to copy {}: {e}", path.display()))?;
                return Ok(dest);
            }
        }
    }

    if let Some(path) = local_fs_path(&row.source_uri) {
        if tokio::fs::metadata(&path).await.is_ok() {
            tokio::fs::copy(&path, &dest)
                .await
                .map_err(|e| format!("failed to copy {}: {e}", path.display()))?;
            return Ok(dest);
        }
    }

    if let Some(url) = http_url(&row.source_uri) {
        let url = rewrite_github_url(&url);
        let response = http
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("download failed: {e}"))?;
        if !response.status().is_success() {
            return Err(format!("download failed with status {}", response.status()));
        }
        let bytes = response.bytes().await.map_err(|e| format!("download failed: {e}"))?;
        tokio::fs::write(&dest, &bytes)
            .await
            .map_err(|e| format!("failed to write {}: {e}", dest.display()))?;
        return Ok(dest);
    }

    Err("Could not access PDF file".to_string())
}

/// Treats `uri` as a filesystem path if it uses the `file://` scheme or no
/// scheme at all.
fn local_fs_path(uri: &str) -> Option<PathBuf> {
    if let Some(rest) = uri.strip_prefix("file://") {
        Some(PathBuf::from(rest))
    } else if !uri.starts_with("http://") && !uri.starts_with("https://") && !uri.starts_with("s3://") {
        Some(PathBuf::from(uri))
    } else {
        None
    }
}

fn http_url(uri: &str) -> Option<String> {
    if uri.starts_with("http://") || uri.starts_with("https://") {
        Some(uri.to_string())
    } else {
        None
    }
}

/// URLs containing `github.com` and `/blob/` have `/blob/` replaced by
/// `/raw/` before download (spec.md §6.4).
fn rewrite_github_url(url: &str) -> String {
    if url.contains("github.com") && url.contains("/blob/") {
        url.replacen("/blob/", "/raw/", 1)
    } else {
        url.to_string()
    }
}
