//! Todo validator (spec §4.8).
//!
//! Triggers only on `TodoWrite`. Compares the proposed todo list against the
//! list currently persisted for the session; invokes a moderator only when a
//! todo transitioned to `completed` or an existing todo's text changed.
//! Fail-closed on moderator error, since this check guards against premature
//! completion claims.

use std::path::PathBuf;

use crate::context::prepare_moderator_context;
use crate::driver::{AgentConfigPresets, AgentDriver, CommandInstruction};
use crate::hooks::decision::HookResult;
use crate::hooks::input::HookEvent;
use crate::hooks::moderator::run_moderator_with_retry;
use crate::hooks::validators::quality::{parse_earliest_decision, EarliestDecision};
use crate::transcript::{load_session_todos, read_transcript, Todo};

pub struct TodoValidator {
    prompt_path: PathBuf,
    audit_dir: PathBuf,
}

impl TodoValidator {
    pub fn new(prompt_path: PathBuf, audit_dir: PathBuf) -> Self {
        TodoValidator {
            prompt_path,
            audit_dir,
        }
    }

    fn parse_proposed_todos(event: &HookEvent) -> Vec<Todo> {
        let Some(tool_input) = &event.tool_input else {
            return Vec::new();
        };
        let Some(todos) = tool_input.get("todos") else {
            return Vec::new();
        };
        serde_json::from_value(todos.clone()).unwrap_or_default()
    }

    /// A moderator check is warranted when some todo moved to `completed`
    /// that wasn't already completed, or an existing todo's text changed.
    fn needs_moderation(previous: &[Todo], proposed: &[Todo]) -> bool {
        for new_todo in proposed {
            match previous.iter().find(|t| t.content == new_todo.content) {
                Some(old_todo) => {
                    if new_todo.status == "completed" && old_todo.status != "completed" {
                        return true;
                    }
                }
                None => {
                    if new_todo.status == "completed" {
                        return true;
                    }
                }
            }
        }
        for old_todo in previous {
            if old_todo.status == "completed"
                && !proposed.iter().any(|t| t.content == old_todo.content)
            {
                // completed todo text was rewritten/removed rather than left intact
                return true;
            }
        }
        false
    }

    pub fn validate(&self, driver: &AgentDriver, event: &HookEvent) -> HookResult {
        if event.tool_name.as_deref() != Some("TodoWrite") {
            return HookResult::allow();
        }
        let session_id = event.session_id.clone().unwrap_or_else(|| "unknown".to_string());
        let previous = load_session_todos(&session_id);
        let proposed = Self::parse_proposed_todos(event);

        if !Self::needs_moderation(&previous, &proposed) {
            return HookResult::allow();
        }
        if !event.has_usable_transcript() || !self.prompt_path.exists() {
            return HookResult::allow();
        }

        let transcript_path = event.transcript_path.as_ref().unwrap();
        let messages = read_transcript(transcript_path);
        let context = prepare_moderator_context(&messages, &proposed);

        let Ok(template) = std::fs::read_to_string(&self.prompt_path) else {
            return HookResult::allow();
        };
        let prompt = template.replace("{conversation_context}", &context);

        let execution_id = uuid::Uuid::now_v7().to_string()[..8].to_string();
        let audit_log_path = self.audit_dir.join(format!("todo-{execution_id}.log"));
        let config = AgentConfigPresets::completion_moderator(format!("todo-{session_id}"));

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
                EarliestDecision::Block(reason) => {
                    HookResult::deny(format!("Todo completion claim rejected: {reason}"))
                }
                EarliestDecision::Unparseable => {
                    HookResult::deny("todo check returned an unparseable response; blocking for safety")
                }
            },
            Err(e) => HookResult::deny(format!("todo check failed, blocking for safety: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::decision::Decision;
    use crate::hooks::input::HookEventName;
    use serde_json::json;

    fn todo(content: &str, status: &str) -> Todo {
        Todo {
            content: content.to_string(),
            status: status.to_string(),
            active_form: String::new(),
        }
    }

    #[test]
    fn non_todowrite_tool_is_allowed() {
        let validator = TodoValidator::new(PathBuf::from("/nonexistent"), PathBuf::from("/tmp"));
        let event = HookEvent {
            session_id: Some("s1".into()),
            hook_event_name: HookEventName::PreToolUse,
            tool_name: Some("Write".to_string()),
            tool_input: None,
            transcript_path: None,
        };
        let driver = AgentDriver::new(crate::driver::Provider::Claude, "claude");
        assert_eq!(validator.validate(&driver, &event).decision, Decision::Allow);
    }

    #[test]
    fn transition_to_completed_needs_moderation() {
        let previous = vec![todo("write tests", "in_progress")];
        let proposed = vec![todo("write tests", "completed")];
        assert!(TodoValidator::needs_moderation(&previous, &proposed));
    }

    #[test]
    fn no_status_change_does_not_need_moderation() {
        let previous = vec![todo("write tests", "in_progress")];
        let proposed = vec![todo("write tests", "in_progress")];
        assert!(!TodoValidator::needs_moderation(&previous, &proposed));
    }

    #[test]
    fn missing_prompt_fails_open_to_allow_even_when_moderation_needed() {
        let validator = TodoValidator::new(PathBuf::from("/nonexistent"), PathBuf::from("/tmp"));
        let event = HookEvent {
            session_id: Some("s1".into()),
            hook_event_name: HookEventName::PreToolUse,
            tool_name: Some("TodoWrite".to_string()),
            tool_input: Some(json!({"todos": [{"content": "x", "status": "completed", "activeForm": ""}]})),
            transcript_path: None,
        };
        let driver = AgentDriver::new(crate::driver::Provider::Claude, "claude");
        assert_eq!(validator.validate(&driver, &event).decision, Decision::Allow);
    }
}
