//! Hook dispatcher (spec §4.3).
//!
//! The process-wide entry point every hook invocation funnels through.
//! Wraps the per-event-kind validator chain in a panic-catching fail-closed
//! boundary: any unexpected panic anywhere in a validator yields a synthetic
//! denial (PreToolUse) or block (Stop/SubagentStop) rather than propagating,
//! since the calling CLI always exits 0 and communicates its decision solely
//! through the emitted JSON body (spec §6.4).

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use crate::completion::moderator::CompletionModerator;
use crate::config::Config;
use crate::driver::{AgentDriver, Provider};
use crate::hooks::decision::{Decision, HookResult};
use crate::hooks::input::{HookEvent, HookEventName};
use crate::hooks::validators::command::CommandValidator;
use crate::hooks::validators::malicious::MaliciousBehaviorValidator;
use crate::hooks::validators::quality;
use crate::hooks::validators::research::ResearchValidator;
use crate::hooks::validators::response_scanner::{EarlyOutcome, ResponseScanner};
use crate::hooks::validators::shebang::ShebangValidator;
use crate::hooks::validators::todo::TodoValidator;
use crate::patterns::{load_deny_patterns, load_exemptions};
use crate::transcript::{load_session_todos, read_transcript};

pub struct HookDispatcher {
    driver: AgentDriver,
    malicious: MaliciousBehaviorValidator,
    command: CommandValidator,
    shebang: ShebangValidator,
    research: ResearchValidator,
    todo: TodoValidator,
    response_scanner: ResponseScanner,
    completion_moderator: CompletionModerator,
    audit_diff_core_prompt: Option<PathBuf>,
    audit_diff_python_prompt: Option<PathBuf>,
    python_deny_exemptions: Vec<String>,
}

impl HookDispatcher {
    pub fn new(config: &Config) -> Self {
        let claude_cli = config
            .provider("claude")
            .map(|p| p.command.clone())
            .unwrap_or_else(|| "claude".to_string());
        let driver = AgentDriver::new(Provider::Claude, claude_cli);

        let audit_dir = config.root.join(".agent-harness").join("audit");
        let prompts = &config.prompts;
        let patterns = &config.patterns;

        HookDispatcher {
            malicious: MaliciousBehaviorValidator::new(
                prompts.malicious_behavior_moderator.clone().unwrap_or_default(),
                audit_dir.clone(),
            ),
            command: CommandValidator::new(load_deny_patterns(
                patterns.bash_deny.as_deref().unwrap_or(std::path::Path::new("")),
            )),
            shebang: ShebangValidator,
            research: ResearchValidator::new(
                prompts.research_moderator.clone().unwrap_or_default(),
                audit_dir.clone(),
                config.research_validator_line_threshold,
            ),
            todo: TodoValidator::new(
                prompts.todo_moderator.clone().unwrap_or_default(),
                audit_dir.clone(),
            ),
            response_scanner: ResponseScanner::new(
                patterns.greetings.clone().unwrap_or_default(),
                patterns.api_limits.clone().unwrap_or_default(),
                patterns.prohibited_phrases.clone().unwrap_or_default(),
            ),
            completion_moderator: CompletionModerator::new(
                prompts.completion_moderator.clone().unwrap_or_default(),
                audit_dir,
                config.completion_moderator_enabled,
            ),
            audit_diff_core_prompt: prompts.audit_diff_core.clone(),
            audit_diff_python_prompt: prompts.audit_diff_python.clone(),
            python_deny_exemptions: load_exemptions(
                patterns.exemptions.as_deref().unwrap_or(std::path::Path::new("")),
            ),
            driver,
        }
    }

    /// Dispatch a single hook event, guaranteeing a decision is always
    /// produced even if a validator panics internally.
    pub fn dispatch(&self, event: HookEvent) -> HookResult {
        let event_kind = event.hook_event_name;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.dispatch_inner(&event)));
        match outcome {
            Ok(result) => result,
            Err(_) => {
                tracing::error!("validator panicked; failing closed");
                fail_closed(event_kind)
            }
        }
    }

    fn dispatch_inner(&self, event: &HookEvent) -> HookResult {
        match event.hook_event_name {
            HookEventName::PreToolUse => self.dispatch_pre_tool_use(event),
            HookEventName::Stop | HookEventName::SubagentStop => self.dispatch_stop(event),
        }
    }

    fn dispatch_pre_tool_use(&self, event: &HookEvent) -> HookResult {
        let checks: [HookResult; 5] = [
            self.malicious.validate(&self.driver, event),
            self.command.validate(event),
            self.shebang.validate(event),
            self.run_quality_diff_audit(event),
            self.research.validate(&self.driver, event),
        ];
        for result in checks {
            if result.decision != Decision::Allow {
                return result;
            }
        }
        self.todo.validate(&self.driver, event)
    }

    /// Core/Python quality validators (spec §4.8, §4.8.1): reconstruct the
    /// full proposed content for a Write/Edit and run it through the LLM
    /// diff-audit subroutine, selecting the Python or core patterns file and
    /// prompt template by the edited file's extension. Fails open when no
    /// prompt template is configured for the selected kind.
    fn run_quality_diff_audit(&self, event: &HookEvent) -> HookResult {
        if !matches!(event.tool_name.as_deref(), Some("Write") | Some("Edit")) {
            return HookResult::allow();
        }
        let Some(tool_input) = &event.tool_input else {
            return HookResult::allow();
        };
        let path = tool_input.get("file_path").and_then(|v| v.as_str()).unwrap_or("");
        let (prompt_path, validator_label) = if path.ends_with(".py") {
            (&self.audit_diff_python_prompt, "python-diff-audit")
        } else {
            (&self.audit_diff_core_prompt, "core-diff-audit")
        };
        let Some(prompt_path) = prompt_path else {
            return HookResult::allow();
        };
        let Some((old_content, new_content)) = quality::reconstruct_proposed_content(event) else {
            return HookResult::allow();
        };
        let Ok(template) = std::fs::read_to_string(prompt_path) else {
            return HookResult::allow();
        };
        let patterns_content = self.python_deny_exemptions.join("\n");
        let audit_dir = prompt_path.parent().unwrap_or(std::path::Path::new(".")).join("audit");
        let audit_log_path = audit_dir.join(format!("{validator_label}-{}.log", uuid::Uuid::now_v7()));

        match quality::run_diff_audit(
            &self.driver,
            &template,
            &patterns_content,
            &old_content,
            &new_content,
            &audit_log_path,
            validator_label,
        ) {
            Ok(result) => result,
            Err(e) => HookResult::deny(format!("{validator_label} failed, blocking for safety: {e}")),
        }
    }

    fn dispatch_stop(&self, event: &HookEvent) -> HookResult {
        match self.response_scanner.check_early_allow_conditions(event) {
            EarlyOutcome::Decided(result) => result,
            EarlyOutcome::Proceed { assistant_text } => {
                let session_id = event.session_id.clone().unwrap_or_else(|| "unknown".to_string());
                let messages = event
                    .transcript_path
                    .as_ref()
                    .map(|p| read_transcript(p))
                    .unwrap_or_default();
                let todos = load_session_todos(&session_id);
                self.completion_moderator
                    .evaluate(&self.driver, &session_id, &assistant_text, &messages, &todos)
            }
        }
    }
}

fn fail_closed(event: HookEventName) -> HookResult {
    match event {
        HookEventName::PreToolUse => {
            HookResult::deny("internal validator error; denied for safety (fail-closed)")
        }
        HookEventName::Stop | HookEventName::SubagentStop => {
            HookResult::block("internal validator error; blocked for safety (fail-closed)")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_closed_denies_pre_tool_use() {
        let result = fail_closed(HookEventName::PreToolUse);
        assert_eq!(result.decision, Decision::Deny);
    }

    #[test]
    fn fail_closed_blocks_stop() {
        let result = fail_closed(HookEventName::Stop);
        assert_eq!(result.decision, Decision::Block);
    }

    #[test]
    fn uninteresting_pre_tool_use_event_allows() {
        let config = Config {
            root: PathBuf::from("/tmp"),
            providers: Default::default(),
            prompts: Default::default(),
            patterns: Default::default(),
            timeouts: Default::default(),
            audit_globs: Default::default(),
            task_globs: Default::default(),
            doc_globs: Default::default(),
            max_workers: 4,
            completion_moderator_enabled: false,
            research_validator_line_threshold: 5,
            hook_settings_file: None,
        };
        let dispatcher = HookDispatcher::new(&config);
        let event = HookEvent {
            session_id: Some("s1".into()),
            hook_event_name: HookEventName::PreToolUse,
            tool_name: Some("Read".to_string()),
            tool_input: None,
            transcript_path: None,
        };
        assert_eq!(dispatcher.dispatch(event).decision, Decision::Allow);
    }

    #[test]
    fn quality_diff_audit_fails_open_when_no_prompt_template_is_configured() {
        let config = Config {
            root: PathBuf::from("/tmp"),
            providers: Default::default(),
            prompts: Default::default(),
            patterns: Default::default(),
            timeouts: Default::default(),
            audit_globs: Default::default(),
            task_globs: Default::default(),
            doc_globs: Default::default(),
            max_workers: 4,
            completion_moderator_enabled: false,
            research_validator_line_threshold: 5,
            hook_settings_file: None,
        };
        let dispatcher = HookDispatcher::new(&config);
        // A non-Python edit with no `audit_diff_core` prompt configured must
        // still fail open rather than panic or deny spuriously.
        let event = HookEvent {
            session_id: Some("s1".into()),
            hook_event_name: HookEventName::PreToolUse,
            tool_name: Some("Write".to_string()),
            tool_input: Some(serde_json::json!({"file_path": "src/main.rs", "content": "fn main() {}"})),
            transcript_path: None,
        };
        assert_eq!(dispatcher.run_quality_diff_audit(&event).decision, Decision::Allow);
    }
}
