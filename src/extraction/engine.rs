//! Pluggable renderer/OCR engines (spec.md §4.4): thin wrappers over external
//! `pdftotext`/`pdfinfo`/`pdftoppm`/`tesseract` binaries, invoked
//! synchronously. Engine calls happen inside the orchestrator's
//! `spawn_blocking` unit of work, never on the async executor directly.

use std::path::Path;
use std::process::Command;

use thiserror::Error;

use super::layout::{build_ocr_layout, OcrWord};
use crate::types::PageLayout;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to invoke external tool: {0}")]
    ToolInvocation(#[from] std::io::Error),
    #[error("document requires a password")]
    PasswordRequired,
    #[error("incorrect password")]
    IncorrectPassword,
    #[error("tool exited with an error: {0}")]
    ToolFailed(String),
}

/// Primary, non-OCR text renderer (the "fitz" path in persisted artifacts).
pub trait PrimaryEngine: Send + Sync {
    fn page_count(&self, path: &Path, password: Option<&str>) -> Result<u32, ExtractionError>;
    fn requires_password(&self, path: &Path) -> Result<bool, ExtractionError>;
    fn authenticate(&self, path: &Path, password: Option<&str>) -> Result<bool, ExtractionError>;
    fn extract_page(
        &self,
        path: &Path,
        password: Option<&str>,
        page_index: u32,
    ) -> Result<(String, PageLayout), ExtractionError>;
}

/// OCR fallback renderer (the "tesseract" path in persisted artifacts).
pub trait OcrEngine: Send + Sync {
    fn extract_page(
        &self,
        path: &Path,
        password: Option<&str>,
        page_index: u32,
        psm: Option<u32>,
    ) -> Result<(String, PageLayout), ExtractionError>;
}

fn run(cmd: &mut Command) -> Result<std::process::Output, ExtractionError> {
    cmd.output().map_err(ExtractionError::from)
}

fn pw_args(password: Option<&str>) -> Vec<String> {
    match password {
        Some(p) if !p.is_empty() => vec!["-upw".to_string(), p.to_string()],
        _ => Vec::new(),
    }
}

/// Shells out to poppler-utils (`pdfinfo`, `pdftotext`).
pub struct ExternalToolPrimaryEngine;

impl Default for ExternalToolPrimaryEngine {
    fn default() -> Self {
        Self
    }
}

impl PrimaryEngine for ExternalToolPrimaryEngine {
    fn page_count(&self, path: &Path, password: Option<&str>) -> Result<u32, ExtractionError> {
        let mut cmd = Command::new("pdfinfo");
        cmd.args(pw_args(password)).arg(path);
        let output = run(&mut cmd)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("Incorrect password") {
                return Err(ExtractionError::IncorrectPassword);
            }
            return Err(ExtractionError::ToolFailed(stderr.trim().to_string()));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines() {
            if let Some(rest) = line.strip_prefix("Pages:") {
                if let Ok(n) = rest.trim().parse::<u32>() {
                    return Ok(n);
                }
            }
        }
        Err(ExtractionError::ToolFailed("pdfinfo: no Pages: line".to_string()))
    }

    fn requires_password(&self, path: &Path) -> Result<bool, ExtractionError> {
        let mut cmd = Command::new("pdfinfo");
        cmd.arg(path);
        let output = run(&mut cmd)?;
        if output.status.success() {
            return Ok(false);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(stderr.contains("Incorrect password") || stderr.contains("password"))
    }

    fn authenticate(&self, path: &Path, password: Option<&str>) -> Result<bool, ExtractionError> {
        let mut cmd = Command::new("pdfinfo");
        cmd.args(pw_args(password)).arg(path);
        let output = run(&mut cmd)?;
        Ok(output.status.success())
    }

    fn extract_page(
        &self,
        path: &Path,
        password: Option<&str>,
        page_index: u32,
    ) -> Result<(String, PageLayout), ExtractionError> {
        let page_number = page_index + 1;
        let mut cmd = Command::new("pdftotext");
        cmd.args(pw_args(password))
            .arg("-f")
            .arg(page_number.to_string())
            .arg("-l")
            .arg(page_number.to_string())
            .arg(path)
            .arg("-");
        let output = run(&mut cmd)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::ToolFailed(stderr.trim().to_string()));
        }
        let text = String::from_utf8_lossy(&output.stdout).to_string();

        let (width, height) = page_dimensions(path, password, page_number).unwrap_or((612.0, 792.0));
        let layout = single_span_layout(width, height, &text, "fitz-text", 10.0, 0);
        Ok((text, layout))
    }
}

fn page_dimensions(
    path: &Path,
    password: Option<&str>,
    page_number: u32,
) -> Option<(f64, f64)> {
    let mut cmd = Command::new("pdfinfo");
    cmd.args(pw_args(password))
        .arg("-f")
        .arg(page_number.to_string())
        .arg("-l")
        .arg(page_number.to_string())
        .arg(path);
    let output = cmd.output().ok()?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    for line in stdout.lines() {
        if let Some(rest) = line.strip_prefix("Page") {
            if let Some(size_part) = rest.split("size:").nth(1) {
                let dims: Vec<f64> = size_part
                    .split("pts")
                    .next()
                    .unwrap_or_default()
                    .split('x')
                    .filter_map(|p| p.trim().parse::<f64>().ok())
                    .collect();
                if dims.len() == 2 {
                    return Some((dims[0], dims[1]));
                }
            }
        }
    }
    None
}

fn single_span_layout(width: f64, height: f64, text: &str, font: &str, size: f64, rotation: i32) -> PageLayout {
    use crate::types::{Block, Line, Span};
    if text.trim().is_empty() {
        return PageLayout {
            width,
            height,
            rotation,
            blocks: Vec::new(),
        };
    }
    PageLayout {
        width,
        height,
        rotation,
        blocks: vec![Block {
            bbox: [0.0, 0.0, width, height],
            lines: vec![Line {
                bbox: [0.0, 0.0, width, height],
                spans: vec![Span {
                    text: text.to_string(),
                    bbox: [0.0, 0.0, width, height],
                    font: font.to_string(),
                    size,
                    flags: 0,
                }],
            }],
        }],
    }
}

/// Shells out to `pdftoppm` (rasterize) and `tesseract` (recognize).
pub struct TesseractEngine {
    pub zoom: f64,
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self { zoom: 2.0 }
    }
}

impl TesseractEngine {
    fn rasterize(
        &self,
        path: &Path,
        password: Option<&str>,
        page_index: u32,
    ) -> Result<(tempfile::TempDir, std::path::PathBuf), ExtractionError> {
        let page_number = page_index + 1;
        let dir = tempfile::tempdir()?;
        let prefix = dir.path().join("page");
        let dpi = (72.0 * self.zoom).round() as u32;

        let mut cmd = Command::new("pdftoppm");
        cmd.args(pw_args(password))
            .arg("-f")
            .arg(page_number.to_string())
            .arg("-l")
            .arg(page_number.to_string())
            .arg("-r")
            .arg(dpi.to_string())
            .arg("-png")
            .arg("-singlefile")
            .arg(path)
            .arg(&prefix);
        let output = run(&mut cmd)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::ToolFailed(stderr.trim().to_string()));
        }

        let image_path = prefix.with_extension("png");
        Ok((dir, image_path))
    }

    fn recognize_tsv(&self, image_path: &Path, psm: Option<u32>) -> Result<(String, Vec<OcrWord>, f64, f64), ExtractionError> {
        let mut cmd = Command::new("tesseract");
        cmd.arg(image_path).arg("stdout").arg("-l").arg("eng");
        if let Some(psm) = psm {
            cmd.arg("--psm").arg(psm.to_string());
        }
        cmd.arg("tsv");
        let output = run(&mut cmd)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::ToolFailed(stderr.trim().to_string()));
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        let mut words = Vec::new();
        let mut max_x = 0.0_f64;
        let mut max_y = 0.0_f64;
        for line in tsv.lines().skip(1) {
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 12 {
                continue;
            }
            let left: f64 = cols[6].parse().unwrap_or(0.0);
            let top: f64 = cols[7].parse().unwrap_or(0.0);
            let w: f64 = cols[8].parse().unwrap_or(0.0);
            let h: f64 = cols[9].parse().unwrap_or(0.0);
            let conf: f64 = cols[10].parse().unwrap_or(-1.0);
            let text = cols[11..].join("\t");
            if text.trim().is_empty() {
                continue;
            }
            max_x = max_x.max(left + w);
            max_y = max_y.max(top + h);
            words.push(OcrWord {
                text,
                confidence: conf,
                bbox: [left, top, left + w, top + h],
            });
        }
        let full_text = words.iter().map(|w| w.text.as_str()).collect::<Vec<_>>().join(" ");
        Ok((full_text, words, max_x, max_y))
    }
}

impl OcrEngine for TesseractEngine {
    fn extract_page(
        &self,
        path: &Path,
        password: Option<&str>,
        page_index: u32,
        psm: Option<u32>,
    ) -> Result<(String, PageLayout), ExtractionError> {
        let (_dir, image_path) = self.rasterize(path, password, page_index)?;
        let (text, words, width, height) = self.recognize_tsv(&image_path, psm)?;
        let layout = build_ocr_layout(width, height, words);
        Ok((text, layout))
    }
}
