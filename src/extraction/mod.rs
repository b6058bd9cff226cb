//! Extraction Engine (C4) — the hard core: authenticate, bound pages, run the
//! primary-then-OCR pipeline per page, apply the quality gate (spec.md §4.4).

pub mod engine;
pub mod layout;
pub mod quality;

use std::collections::HashMap;
use std::path::Path;

pub use engine::{ExtractionError, OcrEngine, PrimaryEngine};

use crate::types::{ExtractionMethod, ExtractionResult, PageLayout, PageResult};

/// Alternate page-segmentation mode tried on a weak first OCR pass.
const ALT_PSM: u32 = 6;
/// First OCR pass below this character count forces a retry (spec.md §4.4 step 3).
const OCR_RETRY_MIN_CHARS: usize = 10;

/// Runs the full per-document extraction pipeline.
///
/// `candidates` is the ordered password list from the resolver (C5); only
/// the first three are tried. `max_pages` caps the page count when set.
pub fn run(
    primary: &dyn PrimaryEngine,
    ocr: Option<&dyn OcrEngine>,
    path: &Path,
    candidates: &[Option<String>],
    max_pages: Option<u32>,
    min_text_length: usize,
) -> ExtractionResult {
    let capped: Vec<&Option<String>> = candidates.iter().take(3).collect();

    let mut password_used: Option<String> = None;
    let mut authenticated = false;
    let mut attempts_made = 0u32;
    let mut tried_passwords: Vec<String> = Vec::new();

    match primary.requires_password(path) {
        Ok(false) => authenticated = true,
        Ok(true) => {
            for candidate in &capped {
                attempts_made += 1;
                if let Some(p) = candidate.as_deref() {
                    if !p.is_empty() {
                        tried_passwords.push(p.to_string());
                    }
                }
                match primary.authenticate(path, candidate.as_deref()) {
                    Ok(true) => {
                        password_used = (*candidate).clone();
                        authenticated = true;
                        break;
                    }
                    _ => continue,
                }
            }
        }
        Err(e) => return ExtractionResult::failure(format!("failed to open document: {e}")),
    }

    if !authenticated {
        return ExtractionResult::auth_failed(attempts_made, tried_passwords);
    }

    let page_count = match primary.page_count(path, password_used.as_deref()) {
        Ok(n) => n,
        Err(e) => return ExtractionResult::failure(format!("failed to read page count: {e}")),
    };
    let total_pages = match max_pages {
        Some(limit) => page_count.min(limit),
        None => page_count,
    };

    let mut pages = HashMap::new();
    for page_index in 0..total_pages {
        let page_number = page_index + 1;
        let result = extract_one_page(primary, ocr, path, password_used.as_deref(), page_index, min_text_length);
        pages.insert(page_number, result);
    }

    ExtractionResult {
        success: true,
        total_pages,
        password_used,
        password_required: false,
        attempts_made,
        suggested_passwords: tried_passwords,
        error_message: None,
        pages,
    }
}

fn extract_one_page(
    primary: &dyn PrimaryEngine,
    ocr: Option<&dyn OcrEngine>,
    path: &Path,
    password: Option<&str>,
    page_index: u32,
    min_text_length: usize,
) -> PageResult {
    match primary.extract_page(path, password, page_index) {
        Ok((text, layout)) => {
            let stripped = text.trim().to_string();
            if quality::primary_path_passes(&stripped, min_text_length) {
                PageResult {
                    text: stripped,
                    method: ExtractionMethod::Fitz,
                    layout,
                    error: None,
                }
            } else {
                run_ocr_fallback(
                    ocr,
                    path,
                    password,
                    page_index,
                    "primary extraction produced low-quality text".to_string(),
                )
            }
        }
        Err(e) => run_ocr_fallback(ocr, path, password, page_index, e.to_string()),
    }
}

fn run_ocr_fallback(
    ocr: Option<&dyn OcrEngine>,
    path: &Path,
    password: Option<&str>,
    page_index: u32,
    primary_failure_reason: String,
) -> PageResult {
    let Some(ocr) = ocr else {
        return failed_page(primary_failure_reason);
    };

    match ocr.extract_page(path, password, page_index, None) {
        Ok((text, layout)) => {
            let stripped = text.trim().to_string();
            if stripped.chars().count() < OCR_RETRY_MIN_CHARS || quality::is_garbage(&stripped) {
                match ocr.extract_page(path, password, page_index, Some(ALT_PSM)) {
                    Ok((text2, layout2)) => PageResult {
                        text: text2.trim().to_string(),
                        method: ExtractionMethod::Tesseract,
                        layout: layout2,
                        error: None,
                    },
                    Err(e) => failed_page(e.to_string()),
                }
            } else {
                PageResult {
                    text: stripped,
                    method: ExtractionMethod::Tesseract,
                    layout,
                    error: None,
                }
            }
        }
        Err(e) => failed_page(e.to_string()),
    }
}

fn failed_page(message: String) -> PageResult {
    PageResult {
        text: String::new(),
        method: ExtractionMethod::Failed,
        layout: PageLayout::default(),
        error: Some(message),
    }
}

/// Formats a page's persisted artifact key and body (spec.md §4.4.3).
pub fn page_artifact(doc_id: &str, page_number: u32, method: ExtractionMethod, text: &str) -> (String, Vec<u8>) {
    let key = format!("{doc_id}/extracted_text/page_{page_number:04}_{}.md", method.as_str());
    let body = format!("# Page {page_number} - {}\n\n{text}", method.as_str().to_uppercase());
    (key, body.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubPrimary {
        requires_password: bool,
        valid_password: Option<&'static str>,
        page_count: u32,
        page_text: fn(u32) -> String,
        raise_on_page: Option<u32>,
    }

    impl PrimaryEngine for StubPrimary {
        fn page_count(&self, _path: &Path, _password: Option<&str>) -> Result<u32, ExtractionError> {
            Ok(self.page_count)
        }
        fn requires_password(&self, _path: &Path) -> Result<bool, ExtractionError> {
            Ok(self.requires_password)
        }
        fn authenticate(&self, _path: &Path, password: Option<&str>) -> Result<bool, ExtractionError> {
            Ok(password == self.valid_password)
        }
        fn extract_page(&self, _path: &Path, _password: Option<&str>, page_index: u32) -> Result<(String, PageLayout), ExtractionError> {
            if self.raise_on_page == Some(page_index) {
                return Err(ExtractionError::ToolFailed("boom".to_string()));
            }
            Ok(((self.page_text)(page_index), PageLayout::default()))
        }
    }

    struct StubOcr {
        calls: AtomicUsize,
        text: &'static str,
    }

    impl OcrEngine for StubOcr {
        fn extract_page(&self, _path: &Path, _password: Option<&str>, _page_index: u32, _psm: Option<u32>) -> Result<(String, PageLayout), ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((self.text.to_string(), PageLayout::default()))
        }
    }

    fn good_text(_: u32) -> String {
        "word ".repeat(260)
    }

    #[test]
    fn successful_extraction_without_password() {
        let primary = StubPrimary {
            requires_password: false,
            valid_password: None,
            page_count: 2,
            page_text: good_text,
            raise_on_page: None,
        };
        let result = run(&primary, None, Path::new("doc.pdf"), &[], None, 250);
        assert!(result.success);
        assert_eq!(result.total_pages, 2);
        assert_eq!(result.pages.len(), 2);
        assert_eq!(result.pages[&1].method, ExtractionMethod::Fitz);
    }

    #[test]
    fn wrong_then_right_password_records_attempts() {
        let primary = StubPrimary {
            requires_password: true,
            valid_password: Some("correct"),
            page_count: 1,
            page_text: good_text,
            raise_on_page: None,
        };
        let candidates = vec![Some("wrong".to_string()), Some("correct".to_string())];
        let result = run(&primary, None, Path::new("doc.pdf"), &candidates, None, 250);
        assert!(result.success);
        assert_eq!(result.password_used.as_deref(), Some("correct"));
        assert_eq!(result.attempts_made, 2);
    }

    #[test]
    fn all_passwords_fail_returns_auth_failed() {
        let primary = StubPrimary {
            requires_password: true,
            valid_password: Some("only-this-one"),
            page_count: 1,
            page_text: good_text,
            raise_on_page: None,
        };
        let candidates = vec![Some("a".to_string()), Some("b".to_string()), Some("c".to_string())];
        let result = run(&primary, None, Path::new("doc.pdf"), &candidates, None, 250);
        assert!(!result.success);
        assert!(result.password_required);
        assert_eq!(result.attempts_made, 3);
        assert_eq!(result.suggested_passwords, vec!["a", "b", "c"]);
    }

    #[test]
    fn short_primary_text_falls_back_to_ocr() {
        let primary = StubPrimary {
            requires_password: false,
            valid_password: None,
            page_count: 1,
            page_text: |_| "too short".to_string(),
            raise_on_page: None,
        };
        let ocr = StubOcr {
            calls: AtomicUsize::new(0),
            text: &"recognized page text ".repeat(20),
        };
        let result = run(&primary, Some(&ocr), Path::new("doc.pdf"), &[], None, 250);
        assert!(result.success);
        assert_eq!(result.pages[&1].method, ExtractionMethod::Tesseract);
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn primary_raise_with_no_ocr_is_a_hard_failure_but_document_still_succeeds() {
        let primary = StubPrimary {
            requires_password: false,
            valid_password: None,
            page_count: 1,
            page_text: good_text,
            raise_on_page: Some(0),
        };
        let result = run(&primary, None, Path::new("doc.pdf"), &[], None, 250);
        assert!(result.success);
        let page = &result.pages[&1];
        assert_eq!(page.method, ExtractionMethod::Failed);
        assert!(page.error.is_some());
    }

    #[test]
    fn page_artifact_formats_key_and_body() {
        let (key, body) = page_artifact("D1", 3, ExtractionMethod::Fitz, "hello");
        assert_eq!(key, "D1/extracted_text/page_0003_fitz.md");
        assert_eq!(String::from_utf8(body).unwrap(), "# Page 3 - FITZ\n\nhello");
    }
}
