//! Shared data-model types for the document text-extraction pipeline.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `text_extraction_status` sentinel: row created, not yet attempted.
pub const STATUS_PENDING: i32 = 0;
/// `text_extraction_status` sentinel: all pages extracted and persisted.
pub const STATUS_SUCCESS: i32 = 100;
/// `text_extraction_status` sentinel: terminal failure for this attempt.
pub const STATUS_FAILED: i32 = -1;

/// One row of the `doc_text_extraction_queue` table, as consumed by the core.
#[derive(Debug, Clone)]
pub struct QueueRow {
    pub extraction_id: i64,
    pub doc_id: String,
    pub doc_name: String,
    pub file_ext: String,
    pub source_uri: String,
    pub datalake_raw_uri: Option<String>,
    pub password: Option<String>,
    pub text_extraction_status: i32,
    pub number_of_pages: i32,
    pub is_processing: bool,
}

/// Extraction outcome for a single document, held only in memory.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub success: bool,
    pub total_pages: u32,
    pub password_used: Option<String>,
    pub password_required: bool,
    pub attempts_made: u32,
    pub suggested_passwords: Vec<String>,
    pub error_message: Option<String>,
    #[serde(skip)]
    pub pages: HashMap<u32, PageResult>,
}

impl ExtractionResult {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            total_pages: 0,
            password_used: None,
            password_required: false,
            attempts_made: 0,
            suggested_passwords: Vec::new(),
            error_message: Some(message.into()),
            pages: HashMap::new(),
        }
    }

    pub fn auth_failed(attempts_made: u32, suggested_passwords: Vec<String>) -> Self {
        Self {
            success: false,
            total_pages: 0,
            password_used: None,
            password_required: true,
            attempts_made,
            suggested_passwords,
            error_message: Some(format!(
                "Password required: attempts_made={attempts_made}"
            )),
            pages: HashMap::new(),
        }
    }
}

/// Extraction method recorded per page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    Fitz,
    Tesseract,
    Failed,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Fitz => "fitz",
            ExtractionMethod::Tesseract => "tesseract",
            ExtractionMethod::Failed => "failed",
        }
    }
}

/// Per-page extraction output.
#[derive(Debug, Clone)]
pub struct PageResult {
    pub text: String,
    pub method: ExtractionMethod,
    pub layout: PageLayout,
    pub error: Option<String>,
}

/// Page layout descriptor (§4.4.1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageLayout {
    pub width: f64,
    pub height: f64,
    pub rotation: i32,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub bbox: [f64; 4],
    pub lines: Vec<Line>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Line {
    pub bbox: [f64; 4],
    pub spans: Vec<Span>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub text: String,
    pub bbox: [f64; 4],
    pub font: String,
    pub size: f64,
    pub flags: i32,
}

/// Progress snapshot (§3.5), keyed by batch id in the tracker.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub batch_id: String,
    pub status: BatchStatus,
    pub total_documents: u32,
    pub processed_documents: u32,
    pub total_pages: u32,
    pub processed_pages: u32,
    pub current_document: Option<String>,
    pub current_stage: Option<String>,
    pub current_operation: Option<String>,
    pub progress_percentage: u32,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub results: Vec<DocumentOutcome>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Starting,
    Processing,
    Completed,
    Failed,
}

/// Per-document outcome recorded into a batch's progress snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentOutcome {
    pub doc_id: String,
    pub success: bool,
    pub error: Option<String>,
}
