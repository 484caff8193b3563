//! Pattern loaders (spec §4.8, §4.9, §11).
//!
//! Deny-pattern, greeting, API-limit, and prohibited-phrase lists are all
//! small YAML documents loaded on demand (fail-open on a missing file, the
//! same convention the config loader uses for its YAML sources). This
//! mirrors the source's `@lru_cache`-decorated loaders in
//! `validation_utils.py`, minus the caching (callers hold onto a `Config`
//! and load once at validator construction time instead).

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenyPattern {
    pub pattern: String,
    #[serde(default = "DenyPattern::default_message")]
    pub message: String,
}

impl DenyPattern {
    fn default_message() -> String {
        "Pattern violation detected".to_string()
    }
}

/// Load a list of deny patterns from a YAML file (`bash_commands.yaml`,
/// `python_fast.yaml`). Fail-open: a missing or malformed file yields an
/// empty list rather than propagating an error, matching the source.
pub fn load_deny_patterns(path: &Path) -> Vec<DenyPattern> {
    load_yaml_list(path)
}

/// Load a list of regex exemption strings.
pub fn load_exemptions(path: &Path) -> Vec<String> {
    load_yaml_list(path)
}

/// Load a list of greeting-only regexes used by the response scanner.
pub fn load_greeting_patterns(path: &Path) -> Vec<String> {
    load_yaml_list(path)
}

/// Load a list of API-limit regexes.
pub fn load_api_limit_patterns(path: &Path) -> Vec<String> {
    load_yaml_list(path)
}

/// Load a list of prohibited-phrase regexes (communication-rule violations).
pub fn load_prohibited_phrases(path: &Path) -> Vec<String> {
    load_yaml_list(path)
}

fn load_yaml_list<T: for<'de> Deserialize<'de>>(path: &Path) -> Vec<T> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    serde_yaml::from_str(&content).unwrap_or_default()
}

/// Shared default exclude-glob list used as the base for every executor
/// kind (spec §4.6, carried from `core/constants.py`).
pub const COMMON_EXCLUDE_PATTERNS: &[&str] = &[
    "**/node_modules/**",
    "**/.git/**",
    "**/.venv/**",
    "**/venv/**",
    "**/__pycache__/**",
    "**/*.egg-info/**",
    "**/.cache/**",
    "**/.pytest_cache/**",
    "**/.mypy_cache/**",
    "**/.ruff_cache/**",
    "**/dist/**",
    "**/build/**",
];

/// Extension -> language-name lookup used when formatting audit violation
/// context (carried from `core/utils.py`).
pub fn detect_language(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    Some(match ext.as_str() {
        "py" => "python",
        "js" => "javascript",
        "ts" => "typescript",
        "jsx" => "javascript",
        "tsx" => "typescript",
        "go" => "go",
        "rs" => "rust",
        "java" => "java",
        "cpp" => "cpp",
        "c" => "c",
        "cs" => "csharp",
        "php" => "php",
        "rb" => "ruby",
        "html" => "html",
        "css" => "css",
        "md" => "markdown",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_pattern_file_is_fail_open() {
        let patterns = load_deny_patterns(Path::new("/nonexistent/path/patterns.yaml"));
        assert!(patterns.is_empty());
    }

    #[test]
    fn loads_deny_patterns_from_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "- pattern: \"rm -rf /\"\n  message: \"destructive command\"\n"
        )
        .unwrap();
        let patterns = load_deny_patterns(file.path());
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].message, "destructive command");
    }

    #[test]
    fn detect_language_known_and_unknown_extensions() {
        assert_eq!(detect_language(Path::new("foo.rs")), Some("rust"));
        assert_eq!(detect_language(Path::new("foo.unknownext")), None);
        assert_eq!(detect_language(Path::new("no_extension")), None);
    }

    #[test]
    fn common_exclude_patterns_include_node_modules() {
        assert!(COMMON_EXCLUDE_PATTERNS.contains(&"**/node_modules/**"));
    }
}
