//! Progress Tracker (C6): a process-wide, mutex-guarded batch snapshot map
//! (spec.md §4.6).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::types::{BatchStatus, DocumentOutcome, ProgressSnapshot};

/// Snapshots are retained this long after completion/failure before being
/// dropped, so late-joining observers can still poll a finished batch.
const RETENTION: Duration = Duration::from_secs(300);

#[derive(Default)]
pub struct ProgressTracker {
    snapshots: Arc<Mutex<HashMap<String, ProgressSnapshot>>>,
}

/// Partial update applied to a snapshot; unset fields are left unchanged.
#[derive(Default)]
pub struct SnapshotUpdate {
    pub current_document: Option<Option<String>>,
    pub current_stage: Option<Option<String>>,
    pub current_operation: Option<Option<String>>,
    pub processed_documents: Option<u32>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// `batch_id = "batch_<unix_seconds>_<count>"`.
    pub fn start(&self, now_unix: i64, queue_ids: &[i64]) -> String {
        self.start_with_id(format!("batch_{now_unix}_{}", queue_ids.len()), now_unix, queue_ids)
    }

    /// Uses `batch_id` as given (the HTTP layer's caller-supplied id takes
    /// precedence over the generated scheme; spec.md §4.9).
    pub fn start_with_id(&self, batch_id: String, now_unix: i64, queue_ids: &[i64]) -> String {
        let snapshot = ProgressSnapshot {
            batch_id: batch_id.clone(),
            status: BatchStatus::Starting,
            total_documents: queue_ids.len() as u32,
            processed_documents: 0,
            total_pages: 0,
            processed_pages: 0,
            current_document: None,
            current_stage: None,
            current_operation: None,
            progress_percentage: 0,
            started_at: now_unix,
            completed_at: None,
            results: Vec::new(),
            errors: Vec::new(),
        };
        self.snapshots.lock().unwrap().insert(batch_id.clone(), snapshot);
        batch_id
    }

    pub fn set_total_pages(&self, batch_id: &str, total_pages: u32) {
        if let Some(s) = self.snapshots.lock().unwrap().get_mut(batch_id) {
            s.total_pages = total_pages;
        }
    }

    pub fn update(&self, batch_id: &str, update: SnapshotUpdate) {
        let mut guard = self.snapshots.lock().unwrap();
        let Some(s) = guard.get_mut(batch_id) else {
            return;
        };
        s.status = BatchStatus::Processing;
        if let Some(v) = update.current_document {
            s.current_document = v;
        }
        if let Some(v) = update.current_stage {
            s.current_stage = v;
        }
        if let Some(v) = update.current_operation {
            s.current_operation = v;
        }
        if let Some(processed) = update.processed_documents {
            s.processed_documents = processed;
            if s.total_documents > 0 {
                s.progress_percentage = (100 * s.processed_documents / s.total_documents).min(100);
            }
        }
    }

    /// Increments processed-document and processed-page counters and
    /// recomputes the percentage, page-weighted when a page total is known.
    pub fn increment_processed(&self, batch_id: &str, processed_pages: u32) {
        let mut guard = self.snapshots.lock().unwrap();
        let Some(s) = guard.get_mut(batch_id) else {
            return;
        };
        s.processed_documents += 1;
        s.processed_pages += processed_pages;
        s.progress_percentage = if s.total_pages > 0 {
            ((100 * s.processed_pages) / s.total_pages).min(100)
        } else if s.total_documents > 0 {
            ((100 * s.processed_documents) / s.total_documents).min(100)
        } else {
            s.progress_percentage
        };
    }

    pub fn complete(&self, batch_id: &str, now_unix: i64, results: Vec<DocumentOutcome>) {
        {
            let mut guard = self.snapshots.lock().unwrap();
            if let Some(s) = guard.get_mut(batch_id) {
                s.status = BatchStatus::Completed;
                s.progress_percentage = 100;
                s.completed_at = Some(now_unix);
                s.results = results;
            }
        }
        self.schedule_expiry(batch_id);
    }

    pub fn fail(&self, batch_id: &str, now_unix: i64, error: impl Into<String>) {
        {
            let mut guard = self.snapshots.lock().unwrap();
            if let Some(s) = guard.get_mut(batch_id) {
                s.status = BatchStatus::Failed;
                s.completed_at = Some(now_unix);
                s.errors.push(error.into());
            }
        }
        self.schedule_expiry(batch_id);
    }

    fn schedule_expiry(&self, batch_id: &str) {
        let snapshots = Arc::clone(&self.snapshots);
        let batch_id = batch_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(RETENTION).await;
            snapshots.lock().unwrap().remove(&batch_id);
        });
    }

    /// Returns the live snapshot, or a synthetic "completed, 100%, empty
    /// results" snapshot for unknown batch ids so HTTP clients can poll past
    /// process restarts without special-casing (spec.md §4.6).
    pub fn get(&self, batch_id: &str) -> ProgressSnapshot {
        self.snapshots
            .lock()
            .unwrap()
            .get(batch_id)
            .cloned()
            .unwrap_or_else(|| synthetic_unknown(batch_id))
    }
}

fn synthetic_unknown(batch_id: &str) -> ProgressSnapshot {
    ProgressSnapshot {
        batch_id: batch_id.to_string(),
        status: BatchStatus::Completed,
        total_documents: 0,
        processed_documents: 0,
        total_pages: 0,
        processed_pages: 0,
        current_document: None,
        current_stage: None,
        current_operation: None,
        progress_percentage: 100,
        started_at: 0,
        completed_at: None,
        results: Vec::new(),
        errors: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_batch_returns_synthetic_completed_snapshot() {
        let tracker = ProgressTracker::new();
        let snapshot = tracker.get("batch_does_not_exist");
        assert_eq!(snapshot.status, BatchStatus::Completed);
        assert_eq!(snapshot.progress_percentage, 100);
        assert!(snapshot.results.is_empty());
    }

    #[tokio::test]
    async fn progress_percentage_is_page_weighted_when_total_pages_known() {
        let tracker = ProgressTracker::new();
        let batch_id = tracker.start(1_000, &[1, 2]);
        tracker.set_total_pages(&batch_id, 10);

        tracker.increment_processed(&batch_id, 4);
        assert_eq!(tracker.get(&batch_id).progress_percentage, 40);

        tracker.increment_processed(&batch_id, 6);
        assert_eq!(tracker.get(&batch_id).progress_percentage, 100);
    }

    #[tokio::test]
    async fn falls_back_to_document_weighted_percentage_without_page_total() {
        let tracker = ProgressTracker::new();
        let batch_id = tracker.start(1_000, &[1, 2, 3, 4]);

        tracker.increment_processed(&batch_id, 0);
        assert_eq!(tracker.get(&batch_id).progress_percentage, 25);
    }

    #[tokio::test]
    async fn complete_marks_status_and_records_results() {
        let tracker = ProgressTracker::new();
        let batch_id = tracker.start(1_000, &[1]);
        tracker.complete(
            &batch_id,
            1_100,
            vec![DocumentOutcome {
                doc_id: "D1".to_string(),
                success: true,
                error: None,
            }],
        );
        let snapshot = tracker.get(&batch_id);
        assert_eq!(snapshot.status, BatchStatus::Completed);
        assert_eq!(snapshot.results.len(), 1);
    }
}
