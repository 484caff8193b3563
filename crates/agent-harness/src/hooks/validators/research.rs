//! Research validator (spec §4.8).
//!
//! Only triggers when the change's line count exceeds a configurable
//! threshold (default 5); invokes a moderator that decides whether
//! sufficient research preceded the edit. Skipped when no transcript is
//! available.

use std::path::PathBuf;

use crate::context::prepare_moderator_context;
use crate::driver::{AgentConfigPresets, AgentDriver, CommandInstruction};
use crate::hooks::decision::HookResult;
use crate::hooks::input::HookEvent;
use crate::hooks::moderator::run_moderator_with_retry;
use crate::hooks::validators::quality::{parse_earliest_decision, reconstruct_proposed_content, EarliestDecision};
use crate::transcript::{load_session_todos, read_transcript};

pub struct ResearchValidator {
    prompt_path: PathBuf,
    audit_dir: PathBuf,
    line_threshold: usize,
}

impl ResearchValidator {
    pub fn new(prompt_path: PathBuf, audit_dir: PathBuf, line_threshold: usize) -> Self {
        ResearchValidator {
            prompt_path,
            audit_dir,
            line_threshold,
        }
    }

    fn changed_line_count(event: &HookEvent) -> usize {
        match reconstruct_proposed_content(event) {
            Some((old, new)) => {
                let old_lines: Vec<&str> = old.lines().collect();
                let new_lines: Vec<&str> = new.lines().collect();
                old_lines.len().abs_diff(new_lines.len()).max(new_lines.len().min(1))
            }
            None => 0,
        }
    }

    pub fn validate(&self, driver: &AgentDriver, event: &HookEvent) -> HookResult {
        if !matches!(event.tool_name.as_deref(), Some("Write") | Some("Edit")) {
            return HookResult::allow();
        }
        if !event.has_usable_transcript() {
            return HookResult::allow();
        }
        if Self::changed_line_count(event) < self.line_threshold {
            return HookResult::allow();
        }
        if !self.prompt_path.exists() {
            return HookResult::allow();
        }

        let transcript_path = event.transcript_path.as_ref().unwrap();
        let messages = read_transcript(transcript_path);
        let session_id = event.session_id.clone().unwrap_or_else(|| "unknown".to_string());
        let todos = load_session_todos(&session_id);
        let context = prepare_moderator_context(&messages, &todos);

        let Ok(template) = std::fs::read_to_string(&self.prompt_path) else {
            return HookResult::allow();
        };
        let prompt = template.replace("{conversation_context}", &context);

        let execution_id = uuid::Uuid::now_v7().to_string()[..8].to_string();
        let audit_log_path = self.audit_dir.join(format!("research-{execution_id}.log"));
        let config = AgentConfigPresets::completion_moderator(format!("research-{session_id}"));

        match run_moderator_with_retry(
            driver,
            CommandInstruction::Text(prompt),
            None,
            &config,
            &audit_log_path,
            2,
            3.5,
        ) {
            Ok(outcome) => match parse_earliest_decision(&outcome.output) {
                EarliestDecision::Allow => HookResult::allow(),
                EarliestDecision::Block(reason) => HookResult::deny(format!(
                    "Insufficient research detected before a {}+ line change: {reason}",
                    self.line_threshold
                )),
                EarliestDecision::Unparseable => {
                    HookResult::deny("research check returned an unparseable response; blocking for safety")
                }
            },
            Err(e) => HookResult::deny(format!("research check failed, blocking for safety: {e}")),
        }
    }
}
