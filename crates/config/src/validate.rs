//! Config checks behind `chatdesk config check`.
//!
//! Flags misspelled keys, unusable backend URLs and timeouts, and API tokens
//! written into the file in plain text.

use std::path::{Path, PathBuf};

use crate::{env_subst::substitute_env, schema::ConsoleConfig};

/// Longest timeout that doesn't earn an info note.
const LONG_TIMEOUT_SECS: u64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One finding, anchored at a dotted key path (empty for file-level issues).
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// "syntax", "unknown-field", "type-error", "security", "backend",
    /// "timeouts", "env" or "file-ref".
    pub category: &'static str,
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        }
    }

    fn error(category: &'static str, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, category, path, message)
    }

    fn warning(
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(Severity::Warning, category, path, message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    /// File that was checked; `None` when only defaults were checked.
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.count(Severity::Error) > 0
    }

    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

/// Config text formats, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Toml,
    Yaml,
    Json,
}

impl Format {
    fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Self::Yaml,
            Some("json") => Self::Json,
            _ => Self::Toml,
        }
    }
}

/// Accepted keys per section. Both sections are flat.
const SECTIONS: &[(&str, &[&str])] = &[
    ("backend", &["base_url", "api_token"]),
    ("timeouts", &["test_secs", "save_secs", "fetch_secs", "update_secs"]),
];

/// Check the file at `path`, or the discovered config file when `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let Some(config_path) = path
        .map(Path::to_path_buf)
        .or_else(crate::loader::find_config_file)
    else {
        return ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Info,
                "file-ref",
                "",
                "no config file found; using defaults",
            )],
            config_path: None,
        };
    };

    let mut result = match std::fs::read_to_string(&config_path) {
        Ok(content) => validate_str(&content, Format::from_path(&config_path)),
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic::error(
                "syntax",
                "",
                format!("failed to read config file: {e}"),
            )],
            config_path: None,
        },
    };
    result.config_path = Some(config_path);
    result
}

/// Check raw config text without touching the file system.
#[must_use]
pub fn validate_str(raw: &str, format: Format) -> ValidationResult {
    let mut diagnostics = Vec::new();

    // Runs on the raw text: substitution would hide the placeholder.
    if let Ok(raw_value) = parse_value(raw, format) {
        check_plaintext_token(&raw_value, &mut diagnostics);
    }

    let substituted = substitute_env(raw);
    check_unresolved_placeholders(&substituted, &mut diagnostics);

    let value = match parse_value(&substituted, format) {
        Ok(value) => value,
        Err(message) => {
            diagnostics.push(Diagnostic::error("syntax", "", message));
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    check_unknown_fields(&value, &mut diagnostics);

    match serde_json::from_value::<ConsoleConfig>(value) {
        Ok(config) => {
            check_backend(&config, &mut diagnostics);
            check_timeouts(&config, &mut diagnostics);
        },
        Err(e) => diagnostics.push(Diagnostic::error("type-error", "", format!("type error: {e}"))),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn parse_value(raw: &str, format: Format) -> Result<serde_json::Value, String> {
    match format {
        Format::Toml => toml::from_str::<toml::Value>(raw)
            .map_err(|e| format!("TOML syntax error: {e}"))
            .and_then(|v| serde_json::to_value(v).map_err(|e| e.to_string())),
        Format::Yaml => serde_yaml::from_str::<serde_json::Value>(raw)
            .map_err(|e| format!("YAML syntax error: {e}"))
            .map(|v| if v.is_null() { serde_json::json!({}) } else { v }),
        Format::Json => {
            serde_json::from_str(raw).map_err(|e| format!("JSON syntax error: {e}"))
        },
    }
}

fn unknown_key(path: String, key: &str, candidates: &[&str]) -> Diagnostic {
    let message = match closest(key, candidates) {
        Some(s) => format!("unknown field (did you mean \"{s}\"?)"),
        None => "unknown field".to_string(),
    };
    Diagnostic::error("unknown-field", path, message)
}

fn check_unknown_fields(value: &serde_json::Value, diagnostics: &mut Vec<Diagnostic>) {
    let Some(root) = value.as_object() else {
        return;
    };
    let section_names: Vec<&str> = SECTIONS.iter().map(|(name, _)| *name).collect();

    for (section, body) in root {
        let Some((_, keys)) = SECTIONS.iter().find(|(name, _)| *name == section.as_str()) else {
            diagnostics.push(unknown_key(section.clone(), section, &section_names));
            continue;
        };
        let Some(body) = body.as_object() else {
            continue;
        };
        for key in body.keys().filter(|k| !keys.contains(&k.as_str())) {
            diagnostics.push(unknown_key(format!("{section}.{key}"), key, keys));
        }
    }
}

/// Closest candidate within three edits, if any.
fn closest<'a>(needle: &str, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .map(|&candidate| (candidate, edit_distance(needle, candidate)))
        .filter(|&(_, d)| (1..=3).contains(&d))
        .min_by_key(|&(_, d)| d)
        .map(|(candidate, _)| candidate)
}

/// Levenshtein distance over chars, two rolling rows.
fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut next = Vec::with_capacity(b.len() + 1);
        next.push(i + 1);
        for (j, cb) in b.iter().enumerate() {
            let substitute = row[j] + usize::from(ca != *cb);
            next.push(substitute.min(row[j + 1] + 1).min(next[j] + 1));
        }
        row = next;
    }
    row[b.len()]
}

fn check_plaintext_token(raw: &serde_json::Value, diagnostics: &mut Vec<Diagnostic>) {
    let token = raw
        .pointer("/backend/api_token")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    if !token.trim().is_empty() && !token.contains("${") {
        diagnostics.push(Diagnostic::warning(
            "security",
            "backend.api_token",
            "api token stored in plain text; use ${CHATDESK_API_TOKEN} instead",
        ));
    }
}

fn check_unresolved_placeholders(substituted: &str, diagnostics: &mut Vec<Diagnostic>) {
    let mut rest = substituted;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        diagnostics.push(Diagnostic::warning(
            "env",
            "",
            format!("environment variable {} is not set", &after[..end]),
        ));
        rest = &after[end + 1..];
    }
}

fn check_backend(config: &ConsoleConfig, diagnostics: &mut Vec<Diagnostic>) {
    const PATH: &str = "backend.base_url";

    let url = match url::Url::parse(&config.backend.base_url) {
        Ok(url) => url,
        Err(e) => {
            diagnostics.push(Diagnostic::error("backend", PATH, format!("invalid URL: {e}")));
            return;
        },
    };

    match url.scheme() {
        "https" => {},
        "http" => {
            let host = url.host_str().unwrap_or_default();
            let local = matches!(host, "127.0.0.1" | "localhost" | "[::1]" | "::1");
            if !local && config.backend.api_token.is_some() {
                diagnostics.push(Diagnostic::warning(
                    "security",
                    PATH,
                    format!("api token would be sent over plain http to {host}"),
                ));
            }
        },
        other => diagnostics.push(Diagnostic::error(
            "backend",
            PATH,
            format!("unsupported scheme \"{other}\""),
        )),
    }
}

fn check_timeouts(config: &ConsoleConfig, diagnostics: &mut Vec<Diagnostic>) {
    let t = &config.timeouts;
    for (key, secs) in [
        ("test_secs", t.test_secs),
        ("save_secs", t.save_secs),
        ("fetch_secs", t.fetch_secs),
        ("update_secs", t.update_secs),
    ] {
        let path = format!("timeouts.{key}");
        if secs == 0 {
            diagnostics.push(Diagnostic::error(
                "timeouts",
                path,
                "timeout must be at least 1 second",
            ));
        } else if secs > LONG_TIMEOUT_SECS {
            diagnostics.push(Diagnostic::new(
                Severity::Info,
                "timeouts",
                path,
                format!("{secs}s is unusually long for an interactive console"),
            ));
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn toml(raw: &str) -> ValidationResult {
        validate_str(raw, Format::Toml)
    }

    fn has(result: &ValidationResult, path: &str, severity: Severity) -> bool {
        result
            .diagnostics
            .iter()
            .any(|d| d.path == path && d.severity == severity)
    }

    #[test]
    fn empty_config_is_clean() {
        let result = toml("");
        assert!(!result.has_errors(), "{:?}", result.diagnostics);
        assert_eq!(result.count(Severity::Warning), 0);
    }

    #[test]
    fn misspelled_key_gets_suggestion() {
        let result = toml("[backend]\nbase_ulr = \"http://localhost\"\n");
        let d = result
            .diagnostics
            .iter()
            .find(|d| d.category == "unknown-field")
            .expect("unknown field diagnostic");
        assert_eq!(d.path, "backend.base_ulr");
        assert!(d.message.contains("base_url"));
    }

    #[test]
    fn unknown_section_is_flagged() {
        let result = toml("[timeout]\ntest_secs = 5\n");
        let d = result
            .diagnostics
            .iter()
            .find(|d| d.category == "unknown-field")
            .expect("unknown section diagnostic");
        assert_eq!(d.path, "timeout");
        assert!(d.message.contains("timeouts"));
    }

    #[test]
    fn syntax_error_is_reported() {
        let result = toml("[backend\n");
        assert!(result.has_errors());
        assert_eq!(result.diagnostics[0].category, "syntax");
    }

    #[test]
    fn zero_timeout_is_an_error() {
        let result = toml("[timeouts]\nfetch_secs = 0\n");
        assert!(has(&result, "timeouts.fetch_secs", Severity::Error));
    }

    #[test]
    fn long_timeout_is_only_info() {
        let result = toml("[timeouts]\nupdate_secs = 900\n");
        assert!(has(&result, "timeouts.update_secs", Severity::Info));
        assert!(!result.has_errors());
    }

    #[test]
    fn wrong_type_is_type_error() {
        let result = toml("[timeouts]\ntest_secs = \"soon\"\n");
        assert!(result.diagnostics.iter().any(|d| d.category == "type-error"));
    }

    #[test]
    fn invalid_url_is_an_error() {
        let result = toml("[backend]\nbase_url = \"not a url\"\n");
        assert!(has(&result, "backend.base_url", Severity::Error));
    }

    #[test]
    fn plaintext_token_over_http_warns_twice() {
        let result = toml(
            "[backend]\nbase_url = \"http://admin.example.com/api\"\napi_token = \"tok\"\n",
        );
        assert_eq!(result.count(Severity::Warning), 2);
        assert!(has(&result, "backend.api_token", Severity::Warning));
        assert!(has(&result, "backend.base_url", Severity::Warning));
    }

    #[test]
    fn placeholder_token_does_not_warn_about_plain_text() {
        let result = toml("[backend]\napi_token = \"${CHATDESK_TOKEN_FOR_VALIDATE_TEST}\"\n");
        assert!(!result.diagnostics.iter().any(|d| d.category == "security"));
        assert!(result.diagnostics.iter().any(|d| d.category == "env"));
    }

    #[test]
    fn yaml_is_validated_too() {
        let result = validate_str("backend:\n  base_url: ftp://files\n", Format::Yaml);
        assert!(result.has_errors());
    }

    #[test]
    fn validate_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chatdesk.json");
        std::fs::write(&path, r#"{"timeouts":{"tset_secs":3}}"#).unwrap();
        let result = validate(Some(&path));
        assert_eq!(result.config_path.as_deref(), Some(path.as_path()));
        assert!(has(&result, "timeouts.tset_secs", Severity::Error));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let result = validate(Some(&path));
        assert!(result.has_errors());
        assert_eq!(result.config_path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn edit_distance_basics() {
        assert_eq!(edit_distance("fetch_secs", "fetch_secs"), 0);
        assert_eq!(edit_distance("base_ulr", "base_url"), 2);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("abc", ""), 3);
    }
}
