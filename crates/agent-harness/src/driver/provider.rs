//! Provider polymorphism (C3, spec §4.2 and §9).
//!
//! The source models providers via inheritance (`BaseProvider`,
//! `ClaudeAgentCLI`, `QwenAgentCLI`). Here a provider is a plain value — a
//! tagged enum — with a small capability surface (`build_command`,
//! `parse_stream_line`, `default_config`, `full_tool_set`). The retry loop
//! and the moderator-with-retry controller depend only on this surface, not
//! on which provider backs it.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::stream_parser::ParsedLine;
use crate::driver::AgentConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    Claude,
    Qwen,
    Gemini,
}

impl Provider {
    /// The full tool-name set this provider exposes, used to derive
    /// deny-lists from allow-lists (spec §3.5).
    pub fn full_tool_set(&self) -> HashSet<&'static str> {
        let tools: &[&'static str] = match self {
            Provider::Claude => &[
                "Read", "Write", "Edit", "Bash", "Glob", "Grep", "TodoWrite", "WebFetch",
                "WebSearch", "Task",
            ],
            Provider::Qwen => &["Read", "Write", "Edit", "Bash", "Glob", "Grep"],
            Provider::Gemini => &["Read", "Write", "Edit", "Bash", "Search"],
        };
        tools.iter().copied().collect()
    }

    /// Derive the deny-list as the complement of an allow-list against the
    /// provider's full tool set. Raises (returns Err) on an unknown tool
    /// name in the allow-list, per spec §4.2.
    pub fn deny_list_from_allow(&self, allowed: &[String]) -> Result<Vec<String>, String> {
        let full = self.full_tool_set();
        for name in allowed {
            if !full.contains(name.as_str()) {
                return Err(format!("unknown tool name for provider: {name}"));
            }
        }
        let allowed_set: HashSet<&str> = allowed.iter().map(|s| s.as_str()).collect();
        let mut deny: Vec<String> = full
            .into_iter()
            .filter(|t| !allowed_set.contains(t))
            .map(|s| s.to_string())
            .collect();
        deny.sort();
        Ok(deny)
    }

    /// Binary name key used to look the CLI path up in `Config::providers`.
    pub fn config_key(&self) -> &'static str {
        match self {
            Provider::Claude => "claude",
            Provider::Qwen => "qwen",
            Provider::Gemini => "gemini",
        }
    }

    /// Build the argv vector for invoking this provider's CLI.
    ///
    /// `cwd`/`add_dir` and the settings-file path are handled by the caller
    /// via `cwd`/`Command::current_dir`; this only produces flags.
    pub fn build_command(
        &self,
        cli_path: &str,
        instruction: &CommandInstruction,
        config: &AgentConfig,
    ) -> Result<Vec<String>, String> {
        let mut argv = vec![cli_path.to_string()];

        argv.push("--model".to_string());
        argv.push(config.model.clone());

        if let Some(session_id) = &config.session_id {
            if uuid::Uuid::parse_str(session_id).is_err() {
                return Err(format!("session_id is not a well-formed UUID: {session_id}"));
            }
            argv.push("--session-id".to_string());
            argv.push(session_id.clone());
        }

        match self {
            Provider::Qwen => {
                // Open question #1 (see DESIGN.md / SPEC_FULL.md §12): the
                // original Qwen adapter never actually builds a
                // disallowed-tools flag. Preserve that incompleteness
                // rather than invent flag semantics.
                if config.allowed_tools.is_some() {
                    tracing::warn!("qwen provider does not support tool allow-listing; ignoring allowed_tools");
                }
            }
            Provider::Claude | Provider::Gemini => {
                if let Some(allowed) = &config.allowed_tools {
                    let deny = self.deny_list_from_allow(allowed)?;
                    if !deny.is_empty() {
                        argv.push("--disallowed-tools".to_string());
                        argv.extend(deny);
                    }
                }
            }
        }

        if let Some(settings) = &config.settings_file {
            argv.push("--settings".to_string());
            argv.push(settings.display().to_string());
        }

        if let Some(dir) = &config.add_dir {
            argv.push("--add-dir".to_string());
            argv.push(dir.display().to_string());
        }

        if config.enable_streaming {
            argv.push("--verbose".to_string());
            argv.push("--output-format".to_string());
            argv.push("stream-json".to_string());
        }

        match instruction {
            CommandInstruction::Text(text) => {
                argv.push("--print".to_string());
                argv.push(text.clone());
            }
            CommandInstruction::File(path) => {
                argv.push("--prompt".to_string());
                argv.push(path.display().to_string());
            }
        }

        Ok(argv)
    }

    /// Parse a single line of stdout into a uniform (text, metadata) pair.
    pub fn parse_stream_line(&self, line: &str) -> ParsedLine {
        super::stream_parser::parse_line(line)
    }

    /// Default agent configuration for this provider (used when callers
    /// don't specify one explicitly).
    pub fn default_config(&self) -> AgentConfig {
        AgentConfig {
            model: match self {
                Provider::Claude => "claude-default".to_string(),
                Provider::Qwen => "qwen-default".to_string(),
                Provider::Gemini => "gemini-default".to_string(),
            },
            session_id: None,
            provider: *self,
            allowed_tools: None,
            hooks_enabled: true,
            enable_streaming: false,
            timeout_seconds: None,
            mcp_servers: None,
            settings_file: None,
            add_dir: None,
        }
    }
}

/// What to feed the child as its instruction — a literal string (fixed-stdin
/// style `--print`) or a path to an instruction file (`--prompt <file>`).
#[derive(Debug, Clone)]
pub enum CommandInstruction {
    Text(String),
    File(std::path::PathBuf),
}
