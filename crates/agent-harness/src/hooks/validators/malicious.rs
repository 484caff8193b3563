//! Malicious-behaviour validator (spec §4.8).
//!
//! Runs first, before all other PreToolUse checks, to catch attempts to
//! bypass CI/CD, hooks, or quality checks. Invokes an LLM moderator with
//! the recent conversation context; fail-closed deny on timeout/error.

use std::path::{Path, PathBuf};

use crate::context::prepare_moderator_context;
use crate::driver::{AgentConfigPresets, AgentDriver, CommandInstruction};
use crate::hooks::decision::HookResult;
use crate::hooks::input::HookEvent;
use crate::hooks::moderator::run_moderator_with_retry;
use crate::hooks::validators::quality::{parse_earliest_decision, EarliestDecision};
use crate::transcript::{load_session_todos, read_transcript};

pub struct MaliciousBehaviorValidator {
    prompt_path: PathBuf,
    audit_dir: PathBuf,
}

impl MaliciousBehaviorValidator {
    pub fn new(prompt_path: PathBuf, audit_dir: PathBuf) -> Self {
        MaliciousBehaviorValidator {
            prompt_path,
            audit_dir,
        }
    }

    fn should_skip(&self, event: &HookEvent) -> bool {
        !matches!(event.tool_name.as_deref(), Some("Write") | Some("Edit") | Some("Bash"))
            || !event.has_usable_transcript()
    }

    pub fn validate(&self, driver: &AgentDriver, event: &HookEvent) -> HookResult {
        if self.should_skip(event) {
            return HookResult::allow();
        }

        let Some(transcript_path) = &event.transcript_path else {
            return HookResult::allow();
        };
        let messages = read_transcript(transcript_path);
        let session_id = event.session_id.clone().unwrap_or_else(|| "unknown".to_string());
        let todos = load_session_todos(&session_id);
        let context = prepare_moderator_context(&messages, &todos);

        if !self.prompt_path.exists() {
            tracing::error!(session_id, path = %self.prompt_path.display(), "malicious behavior prompt missing");
            return HookResult::allow();
        }
        let Ok(template) = std::fs::read_to_string(&self.prompt_path) else {
            return HookResult::allow();
        };
        let prompt = template.replace("{conversation_context}", &context);

        let execution_id = &uuid::Uuid::now_v7().to_string()[..8].to_string();
        tracing::info!(session_id, execution_id, tool = event.tool_name.as_deref(), "malicious_behavior_moderator_start");

        let audit_log_path = self
            .audit_dir
            .join(format!("malicious-behavior-{execution_id}.log"));

        let config = AgentConfigPresets::completion_moderator(format!("malicious-behavior-{session_id}"));
        let result = run_moderator_with_retry(
            driver,
            CommandInstruction::Text(prompt),
            None,
            &config,
            &audit_log_path,
            2,
            3.5,
        );

        match result {
            Ok(outcome) => {
                tracing::info!(session_id, execution_id, "malicious_behavior_moderator_output");
                match parse_earliest_decision(&outcome.output) {
                    EarliestDecision::Allow => HookResult::allow(),
                    EarliestDecision::Block(reason) => HookResult::deny_with_message(
                        format!(
                            "\u{1F6A8} QUALITY VIOLATION - ADDITIONAL TOKENS INCURRED FOR MODERATION\n\n\
                             Hook: PreToolUse ({})\n\
                             Validator: MaliciousBehaviorValidator\n\n\
                             \u{1F6A8} MALICIOUS BEHAVIOR DETECTED\n\n{}\n\n\
                             This operation has been blocked to protect CI/CD integrity.",
                            event.tool_name.as_deref().unwrap_or(""), reason
                        ),
                        "\u{1F6AB} Malicious behavior detected - operation blocked",
                    ),
                    EarliestDecision::Unparseable => HookResult::deny_with_message(
                        format!(
                            "\u{1F6A8} QUALITY VIOLATION - ADDITIONAL TOKENS INCURRED FOR MODERATION\n\n\
                             Hook: PreToolUse ({})\n\
                             Validator: MaliciousBehaviorValidator (Unparseable)\n\n\
                             Malicious behavior check returned unparseable response. Blocking for safety.\n\n\
                             This is likely a temporary issue - please try again.",
                            event.tool_name.as_deref().unwrap_or("")
                        ),
                        "\u{26A0}\u{FE0F} Security check failed - moderator error",
                    ),
                }
            }
            Err(e) => {
                tracing::error!(session_id, execution_id, error = %e, "malicious_behavior_moderator_error_fail_closed");
                HookResult::deny_with_message(
                    format!(
                        "\u{1F6A8} QUALITY VIOLATION - ADDITIONAL TOKENS INCURRED FOR MODERATION\n\n\
                         Hook: PreToolUse ({})\n\
                         Validator: MaliciousBehaviorValidator (Error)\n\n\
                         Malicious behavior check failed. Blocking for safety.\n\n\
                         Moderator error: {e}\n\n\
                         Please retry the operation.",
                        event.tool_name.as_deref().unwrap_or("")
                    ),
                    "\u{26A0}\u{FE0F} Security check error - operation blocked",
                )
            }
        }
    }
}
