//! Password Resolver (C5): ordered candidate passwords with a CSV-backed
//! cache alongside an in-memory cache (spec.md §4.5).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const CSV_HEADER: [&str; 2] = ["pdf_filename", "password"];

/// Holds the in-memory password cache (`filename -> password`) across calls.
pub struct PasswordResolver {
    default_password: Option<String>,
    cache: Mutex<HashMap<String, String>>,
}

impl PasswordResolver {
    pub fn new(default_password: impl Into<Option<String>>) -> Self {
        let default_password = default_password.into().filter(|p| !p.is_empty());
        Self {
            default_password,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Builds the ordered candidate list (spec.md §4.5, steps 1-5).
    ///
    /// `pdf_path` is used both to derive the CSV path (its parent directory)
    /// and the cache key (its file name).
    pub fn candidates(&self, pdf_path: &Path, provided: Option<&str>) -> Vec<Option<String>> {
        let filename = file_name(pdf_path);
        let mut candidates: Vec<Option<String>> = Vec::new();
        let mut seen: Vec<String> = Vec::new();

        let push = |value: &str, candidates: &mut Vec<Option<String>>, seen: &mut Vec<String>| {
            if !seen.iter().any(|s| s == value) {
                seen.push(value.to_string());
                candidates.push(Some(value.to_string()));
            }
        };

        if let Some(p) = provided {
            if !p.is_empty() {
                push(p, &mut candidates, &mut seen);
            }
        }

        let saved = self.load_saved_passwords(pdf_path);
        if let Some(p) = saved.get(&filename) {
            push(p, &mut candidates, &mut seen);
        }

        if let Some(p) = self.cache.lock().unwrap().get(&filename) {
            push(p, &mut candidates, &mut seen);
        }

        if let Some(p) = &self.default_password {
            push(p, &mut candidates, &mut seen);
        }

        candidates.push(None);
        candidates
    }

    /// Persists a winning password into both the in-memory cache and the CSV.
    pub fn save_successful(&self, pdf_path: &Path, password: &str) {
        let filename = file_name(pdf_path);
        self.cache.lock().unwrap().insert(filename, password.to_string());
        if let Err(e) = self.save_password_to_csv(pdf_path, password) {
            tracing::warn!(path = %pdf_path.display(), error = %e, "failed to persist password csv");
        }
    }

    fn csv_path(&self, pdf_path: &Path) -> PathBuf {
        pdf_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("file_passwords.csv")
    }

    fn load_saved_passwords(&self, pdf_path: &Path) -> HashMap<String, String> {
        let path = self.csv_path(pdf_path);
        match std::fs::read_to_string(&path) {
            Ok(contents) => parse_csv(&contents),
            Err(_) => HashMap::new(),
        }
    }

    fn save_password_to_csv(&self, pdf_path: &Path, password: &str) -> std::io::Result<()> {
        let path = self.csv_path(pdf_path);
        let mut passwords = self.load_saved_passwords(pdf_path);
        let filename = file_name(pdf_path);
        passwords.insert(filename, password.to_string());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut sorted: Vec<(&String, &String)> = passwords.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));

        let mut out = String::new();
        out.push_str(&write_csv_row(&CSV_HEADER));
        for (name, pwd) in sorted {
            out.push_str(&write_csv_row(&[name.as_str(), pwd.as_str()]));
        }
        std::fs::write(path, out)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default()
}

/// Minimal RFC-4180 row parser, sufficient for the two-column password file
/// this resolver writes itself. Fields containing `,` or `"` are quoted.
fn parse_csv(contents: &str) -> HashMap<String, String> {
    let mut passwords = HashMap::new();
    let mut lines = contents.lines();

    let Some(first_line) = lines.next() else {
        return passwords;
    };
    let first_row = parse_csv_row(first_line);
    if first_row.len() >= 2 && (first_row[0] != CSV_HEADER[0] || first_row[1] != CSV_HEADER[1]) {
        passwords.insert(first_row[0].clone(), first_row[1].clone());
    }

    for line in lines {
        if line.is_empty() {
            continue;
        }
        let row = parse_csv_row(line);
        if row.len() >= 2 {
            passwords.insert(row[0].clone(), row[1].clone());
        }
    }
    passwords
}

fn parse_csv_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn write_csv_row(fields: &[&str]) -> String {
    let escaped: Vec<String> = fields
        .iter()
        .map(|f| {
            if f.contains(',') || f.contains('"') || f.contains('\n') {
                format!("\"{}\"", f.replace('"', "\"\""))
            } else {
                f.to_string()
            }
        })
        .collect();
    format!("{}\n", escaped.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn candidate_order_matches_provided_saved_cached_default_null() {
        let resolver = PasswordResolver::new(Some("default-pw".to_string()));
        let dir = tempdir().unwrap();
        let pdf_path = dir.path().join("doc.pdf");

        resolver.save_successful(&pdf_path, "saved-pw");
        {
            let mut cache = resolver.cache.lock().unwrap();
            cache.insert("doc.pdf".to_string(), "saved-pw".to_string());
        }

        let candidates = resolver.candidates(&pdf_path, Some("hint-pw"));
        assert_eq!(
            candidates,
            vec![
                Some("hint-pw".to_string()),
                Some("saved-pw".to_string()),
                Some("default-pw".to_string()),
                None,
            ]
        );
    }

    #[test]
    fn duplicate_candidates_are_suppressed_by_first_occurrence() {
        let resolver = PasswordResolver::new(Some("same-pw".to_string()));
        let dir = tempdir().unwrap();
        let pdf_path = dir.path().join("doc.pdf");

        let candidates = resolver.candidates(&pdf_path, Some("same-pw"));
        assert_eq!(candidates, vec![Some("same-pw".to_string()), None]);
    }

    #[test]
    fn round_trips_through_csv() {
        let resolver = PasswordResolver::new(None);
        let dir = tempdir().unwrap();
        let pdf_path = dir.path().join("secret.pdf");

        resolver.save_successful(&pdf_path, "hunter2");

        let reloaded = PasswordResolver::new(None);
        let candidates = reloaded.candidates(&pdf_path, None);
        assert_eq!(candidates[0], Some("hunter2".to_string()));

        let csv = std::fs::read_to_string(dir.path().join("file_passwords.csv")).unwrap();
        assert!(csv.starts_with("pdf_filename,password\n"));
        assert!(csv.contains("secret.pdf,hunter2"));
    }

    #[test]
    fn header_only_skipped_on_exact_match() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("file_passwords.csv");
        std::fs::write(&csv_path, "not_a_header,value\nother.pdf,pw1\n").unwrap();

        let resolver = PasswordResolver::new(None);
        let pdf_path = dir.path().join("not_a_header.pdf");
        // The first row isn't the canonical header, so it is treated as data.
        let passwords = resolver.load_saved_passwords(&dir.path().join("whatever.pdf"));
        assert_eq!(passwords.get("not_a_header"), Some(&"value".to_string()));
        assert_eq!(passwords.get("other.pdf"), Some(&"pw1".to_string()));
        let _ = pdf_path;
    }
}
