//! Process-wide configuration (C1).
//!
//! Loaded once at the CLI entry point from a single YAML document and
//! threaded explicitly through constructors — no global singleton (spec §9,
//! "Process-wide config and logger").

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{HarnessError, HarnessResult};

/// Per-provider CLI invocation settings (binary path, extra args).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub command: String,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

/// Paths to prompt template files consulted by validators and moderators.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PromptPaths {
    #[serde(default)]
    pub audit_diff_core: Option<PathBuf>,
    #[serde(default)]
    pub audit_diff_python: Option<PathBuf>,
    #[serde(default)]
    pub malicious_behavior_moderator: Option<PathBuf>,
    #[serde(default)]
    pub research_moderator: Option<PathBuf>,
    #[serde(default)]
    pub todo_moderator: Option<PathBuf>,
    #[serde(default)]
    pub completion_moderator: Option<PathBuf>,
}

/// Default timeouts (seconds), per spec §5.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeouts {
    #[serde(default = "Timeouts::default_task")]
    pub task_seconds: u64,
    #[serde(default = "Timeouts::default_doc")]
    pub doc_seconds: u64,
    #[serde(default = "Timeouts::default_audit")]
    pub audit_seconds: u64,
    #[serde(default = "Timeouts::default_framework")]
    pub framework_seconds: u64,
    #[serde(default = "Timeouts::default_first_output")]
    pub first_output_seconds: f64,
}

impl Timeouts {
    fn default_task() -> u64 {
        3600
    }
    fn default_doc() -> u64 {
        600
    }
    fn default_audit() -> u64 {
        600
    }
    fn default_framework() -> u64 {
        120
    }
    fn default_first_output() -> f64 {
        3.5
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            task_seconds: Self::default_task(),
            doc_seconds: Self::default_doc(),
            audit_seconds: Self::default_audit(),
            framework_seconds: Self::default_framework(),
            first_output_seconds: Self::default_first_output(),
        }
    }
}

/// Paths to YAML pattern files consulted by the PreToolUse/Stop validators.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PatternPaths {
    #[serde(default)]
    pub bash_deny: Option<PathBuf>,
    #[serde(default)]
    pub python_deny: Option<PathBuf>,
    #[serde(default)]
    pub exemptions: Option<PathBuf>,
    #[serde(default)]
    pub greetings: Option<PathBuf>,
    #[serde(default)]
    pub api_limits: Option<PathBuf>,
    #[serde(default)]
    pub prohibited_phrases: Option<PathBuf>,
}

/// Include/exclude globs for one executor kind.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DiscoveryGlobs {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub root: PathBuf,

    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    #[serde(default)]
    pub prompts: PromptPaths,

    #[serde(default)]
    pub patterns: PatternPaths,

    #[serde(default)]
    pub timeouts: Timeouts,

    #[serde(default)]
    pub audit_globs: DiscoveryGlobs,
    #[serde(default)]
    pub task_globs: DiscoveryGlobs,
    #[serde(default)]
    pub doc_globs: DiscoveryGlobs,

    #[serde(default = "Config::default_max_workers")]
    pub max_workers: usize,

    #[serde(default)]
    pub completion_moderator_enabled: bool,

    #[serde(default = "Config::default_research_threshold")]
    pub research_validator_line_threshold: usize,

    #[serde(default)]
    pub hook_settings_file: Option<PathBuf>,
}

impl Config {
    fn default_max_workers() -> usize {
        4
    }

    fn default_research_threshold() -> usize {
        5
    }

    /// Load configuration from a single YAML file.
    pub fn load(path: impl AsRef<Path>) -> HarnessResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| HarnessError::ConfigError {
            message: format!("failed to read config {}: {}", path.display(), e),
        })?;
        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| HarnessError::ConfigError {
                message: format!("failed to parse config {}: {}", path.display(), e),
            })?;
        Ok(config)
    }

    /// Load from YAML, then apply environment-variable overrides for the
    /// handful of values the original source layers over file config.
    pub fn load_with_overrides(path: impl AsRef<Path>) -> HarnessResult<Self> {
        let mut config = Self::load(path)?;
        if let Ok(root) = std::env::var("AGENT_HARNESS_ROOT") {
            config.root = PathBuf::from(root);
        }
        if let Ok(workers) = std::env::var("AGENT_HARNESS_MAX_WORKERS") {
            if let Ok(n) = workers.parse() {
                config.max_workers = n;
            }
        }
        Ok(config)
    }

    /// Hard cap on parallel in-flight work items, per spec §5 (`min(max_workers, 8)`).
    pub fn effective_max_workers(&self) -> usize {
        self.max_workers.min(8).max(1)
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }
}
