//! Layout descriptor helpers (spec.md §4.4.1).

use crate::types::{Block, Line, PageLayout, Span};

/// A single OCR word hit, as produced by the OCR engine's word-level output.
#[derive(Debug, Clone)]
pub struct OcrWord {
    pub text: String,
    pub confidence: f64,
    pub bbox: [f64; 4],
}

/// Groups OCR words into lines (Δy ≤ 5) and blocks (Δy > 20), filtering out
/// anything below confidence 30. Rotation and font flags are always zero for
/// OCR-derived spans.
pub fn build_ocr_layout(width: f64, height: f64, mut words: Vec<OcrWord>) -> PageLayout {
    words.retain(|w| w.confidence >= 30.0);
    words.sort_by(|a, b| a.bbox[1].partial_cmp(&b.bbox[1]).unwrap_or(std::cmp::Ordering::Equal));

    let mut blocks: Vec<Block> = Vec::new();
    let mut current_lines: Vec<Line> = Vec::new();
    let mut current_line_words: Vec<&OcrWord> = Vec::new();
    let mut last_y: Option<f64> = None;
    let mut block_start_y: Option<f64> = None;

    let flush_line = |words: &[&OcrWord], lines: &mut Vec<Line>| {
        if words.is_empty() {
            return;
        }
        let bbox = merged_bbox(words.iter().map(|w| w.bbox));
        let spans = words
            .iter()
            .map(|w| Span {
                text: w.text.clone(),
                bbox: w.bbox,
                font: "tesseract".to_string(),
                size: w.bbox[3] - w.bbox[1],
                flags: 0,
            })
            .collect();
        lines.push(Line { bbox, spans });
    };

    for word in &words {
        let y = word.bbox[1];
        match last_y {
            None => {
                current_line_words.push(word);
                block_start_y = Some(y);
            }
            Some(prev_y) if (y - prev_y).abs() <= 5.0 => {
                current_line_words.push(word);
            }
            Some(prev_y) => {
                flush_line(&current_line_words, &mut current_lines);
                current_line_words = vec![word];

                if (y - block_start_y.unwrap_or(prev_y)).abs() > 20.0 {
                    if !current_lines.is_empty() {
                        let bbox = merged_bbox(current_lines.iter().map(|l| l.bbox));
                        blocks.push(Block {
                            bbox,
                            lines: std::mem::take(&mut current_lines),
                        });
                    }
                    block_start_y = Some(y);
                }
            }
        }
        last_y = Some(y);
    }
    flush_line(&current_line_words, &mut current_lines);
    if !current_lines.is_empty() {
        let bbox = merged_bbox(current_lines.iter().map(|l| l.bbox));
        blocks.push(Block {
            bbox,
            lines: current_lines,
        });
    }

    PageLayout {
        width,
        height,
        rotation: 0,
        blocks,
    }
}

fn merged_bbox(boxes: impl Iterator<Item = [f64; 4]>) -> [f64; 4] {
    let mut acc = [f64::MAX, f64::MAX, f64::MIN, f64::MIN];
    let mut any = false;
    for b in boxes {
        any = true;
        acc[0] = acc[0].min(b[0]);
        acc[1] = acc[1].min(b[1]);
        acc[2] = acc[2].max(b[2]);
        acc[3] = acc[3].max(b[3]);
    }
    if any {
        acc
    } else {
        [0.0, 0.0, 0.0, 0.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, x0: f64, y0: f64, x1: f64, y1: f64, confidence: f64) -> OcrWord {
        OcrWord {
            text: text.to_string(),
            confidence,
            bbox: [x0, y0, x1, y1],
        }
    }

    #[test]
    fn low_confidence_words_are_dropped() {
        let layout = build_ocr_layout(
            100.0,
            100.0,
            vec![word("keep", 0.0, 0.0, 10.0, 10.0, 80.0), word("drop", 20.0, 0.0, 30.0, 10.0, 10.0)],
        );
        let total_spans: usize = layout.blocks.iter().flat_map(|b| &b.lines).map(|l| l.spans.len()).sum();
        assert_eq!(total_spans, 1);
    }

    #[test]
    fn words_on_same_row_group_into_one_line() {
        let layout = build_ocr_layout(
            100.0,
            100.0,
            vec![
                word("hello", 0.0, 10.0, 20.0, 20.0, 90.0),
                word("world", 25.0, 11.0, 45.0, 21.0, 90.0),
            ],
        );
        assert_eq!(layout.blocks.len(), 1);
        assert_eq!(layout.blocks[0].lines.len(), 1);
        assert_eq!(layout.blocks[0].lines[0].spans.len(), 2);
    }

    #[test]
    fn large_vertical_gap_starts_new_block() {
        let layout = build_ocr_layout(
            100.0,
            200.0,
            vec![
                word("top", 0.0, 0.0, 20.0, 10.0, 90.0),
                word("bottom", 0.0, 100.0, 20.0, 110.0, 90.0),
            ],
        );
        assert_eq!(layout.blocks.len(), 2);
    }
}
