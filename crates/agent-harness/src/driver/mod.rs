//! Agent process driver (C2) and its supporting provider/stream-parser
//! modules (C3).

pub mod process;
pub mod provider;
pub mod stream_parser;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

pub use process::{AgentDriver, ExecutionMetadata, RunOutcome};
pub use provider::{CommandInstruction, Provider};

/// Agent configuration (spec §3.5) — passed to every spawn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub model: String,
    pub session_id: Option<String>,
    pub provider: Provider,
    pub allowed_tools: Option<Vec<String>>,
    #[serde(default = "default_true")]
    pub hooks_enabled: bool,
    #[serde(default)]
    pub enable_streaming: bool,
    pub timeout_seconds: Option<f64>,
    pub mcp_servers: Option<HashMap<String, String>>,
    pub settings_file: Option<PathBuf>,
    pub add_dir: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

impl AgentConfig {
    /// A fresh UUIDv7 session id for this config (spec §3.5, §3.8).
    pub fn with_new_session_id(mut self) -> Self {
        self.session_id = Some(uuid::Uuid::now_v7().to_string());
        self
    }

    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    pub fn with_streaming(mut self, enabled: bool) -> Self {
        self.enable_streaming = enabled;
        self
    }
}

/// Presets used by the moderator/validator call sites, mirroring the
/// source's `AgentConfigPresets`.
pub struct AgentConfigPresets;

impl AgentConfigPresets {
    /// Configuration for a completion-moderator invocation. `label` is used
    /// only for call-site logging (e.g. `malicious-behavior-<session>`);
    /// the session id itself is always a fresh UUIDv7 (spec §3.8).
    pub fn completion_moderator(label: impl AsRef<str>) -> AgentConfig {
        tracing::debug!(label = label.as_ref(), "building completion moderator config");
        Provider::Claude
            .default_config()
            .with_streaming(true)
            .with_timeout(120.0)
            .with_new_session_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_new_session_id_sets_a_uuid() {
        let config = Provider::Claude.default_config().with_new_session_id();
        let id = config.session_id.unwrap();
        assert!(uuid::Uuid::parse_str(&id).is_ok());
    }
}
