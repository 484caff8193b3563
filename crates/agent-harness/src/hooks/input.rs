//! Hook event parsing (spec §3.6, §4.3, §6.2).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Read;
use std::path::PathBuf;

use crate::error::{HarnessError, HarnessResult};

const MAX_HOOK_INPUT_SIZE: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HookEventName {
    PreToolUse,
    Stop,
    SubagentStop,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HookEvent {
    pub session_id: Option<String>,
    pub hook_event_name: HookEventName,
    pub tool_name: Option<String>,
    pub tool_input: Option<Value>,
    pub transcript_path: Option<PathBuf>,
}

impl HookEvent {
    /// Read exactly one JSON object from a reader, up to `MAX_HOOK_INPUT_SIZE`.
    /// A larger body is a fatal input error (spec §4.3).
    pub fn from_reader(mut reader: impl Read) -> HarnessResult<Self> {
        let mut buf = Vec::new();
        let mut limited = (&mut reader).take(MAX_HOOK_INPUT_SIZE + 1);
        limited
            .read_to_end(&mut buf)
            .map_err(|e| HarnessError::HookInputError {
                message: format!("failed to read stdin: {e}"),
            })?;
        if buf.len() as u64 > MAX_HOOK_INPUT_SIZE {
            return Err(HarnessError::HookInputError {
                message: format!("hook input exceeds {MAX_HOOK_INPUT_SIZE} bytes"),
            });
        }
        let event: HookEvent =
            serde_json::from_slice(&buf).map_err(|e| HarnessError::HookInputError {
                message: format!("malformed hook input JSON: {e}"),
            })?;
        Ok(event)
    }

    pub fn from_stdin() -> HarnessResult<Self> {
        Self::from_reader(std::io::stdin())
    }

    /// Whether a transcript file exists and is non-empty (spec §4.9 step 1).
    pub fn has_usable_transcript(&self) -> bool {
        match &self.transcript_path {
            Some(path) => path
                .metadata()
                .map(|m| m.is_file() && m.len() > 0)
                .unwrap_or(false),
            None => false,
        }
    }
}
