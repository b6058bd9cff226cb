//! Configuration provider (C1).
//!
//! Reads `.envvar-service1`, an ini-style file with `[SECTION]` headers, and
//! exposes `get(key, section, fallback)` with process-environment-variable
//! override precedence. Keys beginning with `G_` are convention-only.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Read-only, constructed once at service start.
#[derive(Debug, Clone)]
pub struct Config {
    sections: HashMap<String, HashMap<String, String>>,
}

impl Config {
    /// Load from the given `.envvar-service1` path, if it exists.
    ///
    /// A missing file is not an error: every lookup still falls through to
    /// environment variables and caller-supplied fallbacks.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let sections = match std::fs::read_to_string(path) {
            Ok(contents) => parse_ini(&contents),
            Err(e) => {
                tracing::warn!("config file not found at {}: {}", path.display(), e);
                HashMap::new()
            }
        };
        Self { sections }
    }

    /// Locate `.envvar-service1` by walking up from the current directory,
    /// falling back to the working directory if never found.
    pub fn discover() -> Self {
        let mut dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        loop {
            let candidate = dir.join(".envvar-service1");
            if candidate.exists() {
                return Self::load(candidate);
            }
            if !dir.pop() {
                break;
            }
        }
        Self::load(".envvar-service1")
    }

    /// Precedence: process env var (exact key) > section-scoped file value >
    /// any-section file value > fallback.
    pub fn get(&self, key: &str, section: Option<&str>, fallback: Option<&str>) -> Option<String> {
        if let Ok(value) = std::env::var(key) {
            return Some(value);
        }

        if let Some(section) = section {
            if let Some(value) = self.sections.get(section).and_then(|s| s.get(key)) {
                return Some(value.clone());
            }
        } else {
            for section in self.sections.values() {
                if let Some(value) = section.get(key) {
                    return Some(value.clone());
                }
            }
        }

        fallback.map(|s| s.to_string())
    }

    pub fn get_or(&self, key: &str, section: Option<&str>, fallback: &str) -> String {
        self.get(key, section, Some(fallback)).unwrap_or_default()
    }
}

fn parse_ini(contents: &str) -> HashMap<String, HashMap<String, String>> {
    let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
    let mut current = String::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            current = line[1..line.len() - 1].trim().to_string();
            sections.entry(current.clone()).or_default();
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            sections
                .entry(current.clone())
                .or_default()
                .insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    sections
}

/// Resolved settings for this service's entry points, derived from `Config`.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub datalake_root: PathBuf,
    pub output_root: String,
    pub default_pdf_password: String,
    pub service2_enabled: bool,
    pub service2_base_url: String,
    pub service2_endpoint: String,
    pub service2_timeout_secs: u64,
    pub http_port: u16,
    pub workers: usize,
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        let host = config.get_or("G_POSTGRES_SERVICE1_HOST", Some("POSTGRES_SERVICE1"), "localhost");
        let database = config.get_or(
            "G_POSTGRES_SERVICE1_DATABASE",
            Some("POSTGRES_SERVICE1"),
            "fcr001-text-extraction",
        );
        let user = config.get_or("G_POSTGRES_SERVICE1_USER", Some("POSTGRES_SERVICE1"), "postgres");
        let password = config.get_or(
            "G_POSTGRES_SERVICE1_PASSWORD",
            Some("POSTGRES_SERVICE1"),
            "postgres",
        );
        let port = config.get_or("G_POSTGRES_SERVICE1_PORT", Some("POSTGRES_SERVICE1"), "5432");

        let database_url =
            format!("postgres://{user}:{password}@{host}:{port}/{database}");

        let datalake_root = config.get_or(
            "G_AITHON_DATALAKE",
            Some("COMMON"),
            "~/projects/aithon/aithon_output/datalake-fcr001",
        );
        let output_root = config.get_or(
            "G_SERVICE1_OUTPUT_FOLDER",
            Some("COMMON"),
            "~/projects/aithon/aithon_output/service1-extracted-text",
        );

        Self {
            database_url,
            datalake_root: PathBuf::from(expand_home(&datalake_root)),
            output_root: expand_home(&output_root),
            default_pdf_password: config.get_or(
                "G_DEFAULT_PDF_PWD",
                Some("COMMON"),
                "operations@PRI",
            ),
            service2_enabled: config
                .get_or("G_SERVICE2_ENABLED", Some("COMMON"), "false")
                .eq_ignore_ascii_case("true"),
            service2_base_url: config.get_or(
                "G_SERVICE2_BASE_URL",
                Some("COMMON"),
                "http://localhost:8006",
            ),
            service2_endpoint: config.get_or(
                "G_SERVICE2_ENDPOINT",
                Some("COMMON"),
                "/api/document-classification/classify",
            ),
            service2_timeout_secs: config
                .get_or("G_SERVICE2_TIMEOUT", Some("COMMON"), "30")
                .parse()
                .unwrap_or(30),
            http_port: config
                .get_or("SERVICE1_PORT", None, "8015")
                .parse()
                .unwrap_or(8015),
            workers: 4,
        }
    }
}

/// `s3://` output roots are not filesystem paths; leave them untouched.
fn expand_home(value: &str) -> String {
    if value.starts_with("s3://") {
        return value.to_string();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest).display().to_string();
        }
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_var_overrides_file_value() {
        std::env::set_var("CONFIG_TEST_KEY_1", "from-env");
        let mut sections = HashMap::new();
        let mut section = HashMap::new();
        section.insert("CONFIG_TEST_KEY_1".to_string(), "from-file".to_string());
        sections.insert("COMMON".to_string(), section);
        let config = Config { sections };

        assert_eq!(
            config.get("CONFIG_TEST_KEY_1", Some("COMMON"), None),
            Some("from-env".to_string())
        );
        std::env::remove_var("CONFIG_TEST_KEY_1");
    }

    #[test]
    fn section_scoped_lookup_falls_back_to_fallback() {
        let config = Config {
            sections: HashMap::new(),
        };
        assert_eq!(
            config.get("MISSING", Some("COMMON"), Some("default")),
            Some("default".to_string())
        );
    }

    #[test]
    fn any_section_lookup_finds_key_outside_requested_section() {
        let mut sections = HashMap::new();
        let mut section = HashMap::new();
        section.insert("G_FOO".to_string(), "bar".to_string());
        sections.insert("OTHER".to_string(), section);
        let config = Config { sections };

        assert_eq!(config.get("G_FOO", None, None), Some("bar".to_string()));
    }

    #[test]
    fn parses_sections_and_skips_comments() {
        let contents = "# comment\n[COMMON]\nG_FOO=bar\n\n[POSTGRES_SERVICE1]\nG_POSTGRES_SERVICE1_HOST=db\n";
        let sections = parse_ini(contents);
        assert_eq!(
            sections.get("COMMON").and_then(|s| s.get("G_FOO")),
            Some(&"bar".to_string())
        );
        assert_eq!(
            sections
                .get("POSTGRES_SERVICE1")
                .and_then(|s| s.get("G_POSTGRES_SERVICE1_HOST")),
            Some(&"db".to_string())
        );
    }
}
