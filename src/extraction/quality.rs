//! Garbage / quality gate (spec.md §4.4.2).
//!
//! A text is rejected — treated as an extraction failure that triggers OCR
//! fallback — if any of these hold. Thresholds are fixed constants and must
//! match exactly; they are not configurable.

use regex::Regex;
use std::sync::OnceLock;

const SPECIAL_PUNCTUATION: &str = ".,!?;:()[]{}\"'";

fn control_run_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F-\x9F]+").expect("valid regex")
    })
}

/// Returns `true` if `text` fails the quality gate and should be discarded.
pub fn is_garbage(text: &str) -> bool {
    if text.trim().is_empty() {
        return true;
    }

    let len = text.chars().count();
    if len == 0 {
        return true;
    }

    let control_char_count = text
        .chars()
        .filter(|&c| (c as u32) < 32 && c != '\t' && c != '\n' && c != '\r')
        .count();
    if control_char_count as f64 > len as f64 * 0.3 {
        return true;
    }

    if control_run_pattern().find_iter(text).count() > 3 {
        return true;
    }

    let special_char_count = text
        .chars()
        .filter(|&c| !c.is_alphanumeric() && !c.is_whitespace() && !SPECIAL_PUNCTUATION.contains(c))
        .count();
    if special_char_count as f64 / len as f64 > 0.5 {
        return true;
    }

    let distinct: std::collections::HashSet<char> = text.chars().collect();
    if distinct.len() < 5 {
        return true;
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    if !words.is_empty() {
        let short = words.iter().filter(|w| w.chars().count() < 2).count();
        if short as f64 / words.len() as f64 > 0.7 {
            return true;
        }
    }

    let non_printable_count = text
        .chars()
        .filter(|&c| {
            ((c as u32) < 32 && c != '\t' && c != '\n' && c != '\r') || (c as u32) > 126
        })
        .count();
    if non_printable_count as f64 > len as f64 * 0.2 {
        return true;
    }

    let printable_count = text
        .chars()
        .filter(|&c| c != '\t' && c != '\n' && c != '\r' && (0x20..=0x7e).contains(&(c as u32)))
        .count();
    if (printable_count as f64 / len as f64) < 0.3 {
        return true;
    }

    false
}

/// Applies the primary-path-only minimum length check in addition to the
/// shared gate above.
pub fn primary_path_passes(text: &str, min_text_length: usize) -> bool {
    text.trim().chars().count() >= min_text_length && !is_garbage(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_garbage() {
        assert!(is_garbage(""));
        assert!(is_garbage("   \n\t  "));
    }

    #[test]
    fn normal_prose_passes() {
        let text = "The quick brown fox jumps over the lazy dog. This is a normal sentence with punctuation, and more words.";
        assert!(!is_garbage(text));
    }

    #[test]
    fn control_character_heavy_text_is_garbage() {
        let text = "\x01\x02\x03\x04\x05abc\x06\x07\x08";
        assert!(is_garbage(text));
    }

    #[test]
    fn mostly_single_character_repeats_is_garbage() {
        let text = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
        assert!(is_garbage(text));
    }

    #[test]
    fn many_short_tokens_is_garbage() {
        let text = "a b c d e f g h i j k l m n o";
        assert!(is_garbage(text));
    }

    #[test]
    fn primary_path_rejects_short_text_even_if_clean() {
        assert!(!primary_path_passes("Too short.", 250));
        let long_text = "word ".repeat(100);
        assert!(primary_path_passes(&long_text, 250));
    }
}
