//! Completion moderator (C8, spec §4.10).
//!
//! The final arbiter invoked once the response scanner has already ruled out
//! every cheap early-exit condition and confirmed a well-formed completion
//! marker is present. A `WORK DONE` marker with incomplete todos is blocked
//! without ever consulting the LLM; a `FEEDBACK:` marker is not subject to
//! that pre-check, since a worker reporting feedback is explicitly not
//! claiming completion.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use crate::completion::markers::{parse_code_fence_output, parse_completion_marker, CompletionMarker};
use crate::context::prepare_moderator_context;
use crate::driver::{AgentConfigPresets, AgentDriver, CommandInstruction};
use crate::error::HarnessError;
use crate::hooks::decision::HookResult;
use crate::hooks::moderator::run_moderator_with_retry;
use crate::transcript::{incomplete_todos, Todo, TranscriptMessage};

const FRAMEWORK_TIMEOUT_SECS: f64 = 120.0;
const FRAMEWORK_WARNING_MARGIN_SECS: f64 = 5.0;
const STDERR_TRUNCATE_LEN: usize = 500;

static CONVERSATIONAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(I see|Let me check|I need to|I was|I'm (confused|going)|I've (successfully|completed)|Could you|Should I)").unwrap()
});
static ALLOW_WITH_REASON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\bALLOW:\s*(.+)").unwrap());
static BARE_ALLOW_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bALLOW\b").unwrap());
static BLOCK_WITH_REASON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\bBLOCK:\s*(.+)").unwrap());
static BLOCK_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bBLOCK:").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeratorDecision {
    Allow(String),
    Block(String),
}

/// Priority-ordered decision parser (spec §4.10), distinct from the
/// earliest-match parser the diff-audit and malicious-behavior validators
/// use (`hooks::validators::quality::parse_earliest_decision`).
///
/// Order: a conversational non-decision response blocks outright; an
/// `ALLOW:`-with-reason allows, truncated at any trailing `BLOCK:` hedge; a
/// bare `ALLOW` with no reasoning blocks for safety; a `BLOCK:` blocks with
/// its stated (or a default) reason; anything else is an unclear block.
pub fn parse_priority_decision(output: &str) -> ModeratorDecision {
    let cleaned = parse_code_fence_output(output);

    if CONVERSATIONAL_RE.is_match(&cleaned)
        && !ALLOW_WITH_REASON_RE.is_match(&cleaned)
        && !BLOCK_WITH_REASON_RE.is_match(&cleaned)
    {
        return ModeratorDecision::Block(
            "Moderator returned a conversational response with no decision token".to_string(),
        );
    }

    if let Some(captures) = ALLOW_WITH_REASON_RE.captures(&cleaned) {
        let mut reason = captures[1].to_string();
        if let Some(hedge) = BLOCK_TOKEN_RE.find(&reason) {
            reason.truncate(hedge.start());
        }
        return ModeratorDecision::Allow(reason.trim().to_string());
    }

    if BARE_ALLOW_RE.is_match(&cleaned) {
        return ModeratorDecision::Block(
            "BLOCKED: ALLOW without explanation - required format is `ALLOW: <explanation>`".to_string(),
        );
    }

    if let Some(captures) = BLOCK_WITH_REASON_RE.captures(&cleaned) {
        let reason = captures[1].trim();
        let reason = if reason.is_empty() {
            "Task incomplete".to_string()
        } else {
            reason.to_string()
        };
        return ModeratorDecision::Block(reason);
    }

    ModeratorDecision::Block(
        "Moderator response unclear - no explicit ALLOW or BLOCK decision found".to_string(),
    )
}

pub struct CompletionModerator {
    prompt_path: PathBuf,
    audit_dir: PathBuf,
    enabled: bool,
}

impl CompletionModerator {
    pub fn new(prompt_path: PathBuf, audit_dir: PathBuf, enabled: bool) -> Self {
        CompletionModerator {
            prompt_path,
            audit_dir,
            enabled,
        }
    }

    pub fn evaluate(
        &self,
        driver: &AgentDriver,
        session_id: &str,
        assistant_text: &str,
        messages: &[TranscriptMessage],
        todos: &[Todo],
    ) -> HookResult {
        if !self.enabled {
            return HookResult::allow();
        }

        match parse_completion_marker(assistant_text) {
            CompletionMarker::WorkDone => {
                let incomplete = incomplete_todos(todos);
                if !incomplete.is_empty() {
                    let names: Vec<&str> = incomplete.iter().map(|t| t.content.as_str()).collect();
                    return HookResult::block(format!(
                        "WORK DONE claimed but {} todo(s) remain incomplete: {}",
                        incomplete.len(),
                        names.join(", ")
                    ));
                }
            }
            CompletionMarker::Feedback(_) => {
                // Not a completion claim; the incomplete-todos pre-check does not apply.
            }
            CompletionMarker::None => {
                return HookResult::block(
                    "COMPLETION MARKER REQUIRED: response must end with WORK DONE or FEEDBACK: <reason>",
                );
            }
        }

        if !self.prompt_path.exists() {
            return HookResult::block(format!(
                "completion moderator prompt template missing at {}; blocking for safety (fail-closed)",
                self.prompt_path.display()
            ));
        }
        let Ok(template) = std::fs::read_to_string(&self.prompt_path) else {
            return HookResult::block(format!(
                "completion moderator prompt template at {} could not be read; blocking for safety (fail-closed)",
                self.prompt_path.display()
            ));
        };
        let context = prepare_moderator_context(messages, todos);
        let prompt = template
            .replace("{conversation_context}", &context)
            .replace("{assistant_response}", assistant_text);

        let execution_id = uuid::Uuid::now_v7().to_string()[..8].to_string();
        let audit_log_path = self
            .audit_dir
            .join(format!("completion-moderator-{execution_id}.log"));
        if let Err(e) = write_audit_header(&audit_log_path, &execution_id, &prompt, &context) {
            tracing::warn!(execution_id, error = %e, "failed to write completion moderator audit header");
        }

        let cancel_warning = spawn_framework_timeout_warning(
            execution_id.clone(),
            FRAMEWORK_TIMEOUT_SECS - FRAMEWORK_WARNING_MARGIN_SECS,
        );

        let config = AgentConfigPresets::completion_moderator(format!("completion-{session_id}"))
            .with_timeout(FRAMEWORK_TIMEOUT_SECS);

        let result = run_moderator_with_retry(
            driver,
            CommandInstruction::Text(prompt),
            None,
            &config,
            &audit_log_path,
            2,
            3.5,
        );

        cancel_warning.store(true, Ordering::SeqCst);

        match result {
            Ok(outcome) => match parse_priority_decision(&outcome.output) {
                ModeratorDecision::Allow(reason) => HookResult::allow().with_system_message(reason),
                ModeratorDecision::Block(reason) => HookResult::block(reason),
            },
            Err(HarnessError::TimeoutError { .. }) => {
                HookResult::block("Completion moderator timed out; blocking for safety")
            }
            Err(HarnessError::ExecutionError {
                exit_code, stderr, ..
            }) => {
                let truncated: String = stderr.chars().take(STDERR_TRUNCATE_LEN).collect();
                HookResult::block(format!(
                    "Completion moderator exited with code {exit_code:?}: {truncated}"
                ))
            }
            Err(e) => {
                tracing::error!(execution_id, error = %e, "completion moderator unexpected failure");
                HookResult::block(format!("Completion moderator failed: {e}"))
            }
        }
    }
}

fn write_audit_header(path: &Path, execution_id: &str, prompt: &str, context: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut contents = String::new();
    contents.push_str(&format!("=== MODERATOR EXECUTION {execution_id} ===\n"));
    contents.push_str(prompt);
    contents.push('\n');
    contents.push_str(context);
    contents.push_str("\n=== STREAMING OUTPUT ===\n");
    std::fs::write(path, contents)
}

/// Spawn a watcher thread emulating the source's SIGALRM-based framework
/// timeout warning: logs once if the call is still outstanding after
/// `warn_after_secs`. Returns a cancel flag the caller sets once the call
/// completes, so a finished call never logs a stale warning.
fn spawn_framework_timeout_warning(execution_id: String, warn_after_secs: f64) -> Arc<AtomicBool> {
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_clone = Arc::clone(&cancel);
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_secs_f64(warn_after_secs.max(0.0)));
        if !cancel_clone.load(Ordering::SeqCst) {
            tracing::warn!(execution_id, "completion moderator approaching framework timeout");
        }
    });
    cancel
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::decision::Decision;

    #[test]
    fn allow_with_reason_truncates_at_trailing_block_hedge() {
        let output = "ALLOW: looks complete. BLOCK: just kidding maybe not";
        match parse_priority_decision(output) {
            ModeratorDecision::Allow(reason) => assert_eq!(reason, "looks complete."),
            other => panic!("expected Allow, got {other:?}"),
        }
    }

    #[test]
    fn bare_allow_blocks_for_safety() {
        match parse_priority_decision("ALLOW") {
            ModeratorDecision::Block(reason) => assert!(reason.contains("ALLOW without explanation")),
            other => panic!("expected Block, got {other:?}"),
        }
    }

    #[test]
    fn block_with_reason() {
        match parse_priority_decision("BLOCK: missing test coverage") {
            ModeratorDecision::Block(reason) => assert_eq!(reason, "missing test coverage"),
            other => panic!("expected Block, got {other:?}"),
        }
    }

    #[test]
    fn conversational_response_without_decision_blocks() {
        match parse_priority_decision("Let me check the test coverage before deciding.") {
            ModeratorDecision::Block(reason) => assert!(reason.contains("conversational")),
            other => panic!("expected Block, got {other:?}"),
        }
    }

    #[test]
    fn unclear_response_blocks() {
        match parse_priority_decision("not sure what to make of this") {
            ModeratorDecision::Block(reason) => assert!(reason.contains("unclear")),
            other => panic!("expected Block, got {other:?}"),
        }
    }

    #[test]
    fn disabled_moderator_allows_without_evaluation() {
        let moderator = CompletionModerator::new(PathBuf::from("/nonexistent"), PathBuf::from("/tmp"), false);
        let driver = AgentDriver::new(crate::driver::Provider::Claude, "claude");
        let result = moderator.evaluate(&driver, "s1", "WORK DONE", &[], &[]);
        assert_eq!(result.decision, Decision::Allow);
    }

    #[test]
    fn work_done_with_incomplete_todos_blocks_without_consulting_moderator() {
        let moderator = CompletionModerator::new(PathBuf::from("/nonexistent"), PathBuf::from("/tmp"), true);
        let driver = AgentDriver::new(crate::driver::Provider::Claude, "claude");
        let todos = vec![Todo {
            content: "write docs".into(),
            status: "pending".into(),
            active_form: String::new(),
        }];
        let result = moderator.evaluate(&driver, "s1", "all done. WORK DONE", &[], &todos);
        assert_eq!(result.decision, Decision::Block);
        assert!(result.reason.unwrap().contains("write docs"));
    }

    #[test]
    fn feedback_marker_skips_incomplete_todos_precheck_but_missing_prompt_blocks_closed() {
        // Past the pre-check, a missing prompt template fails closed (blocks).
        let moderator = CompletionModerator::new(PathBuf::from("/nonexistent"), PathBuf::from("/tmp"), true);
        let driver = AgentDriver::new(crate::driver::Provider::Claude, "claude");
        let todos = vec![Todo {
            content: "write docs".into(),
            status: "pending".into(),
            active_form: String::new(),
        }];
        let result = moderator.evaluate(&driver, "s1", "FEEDBACK: need clarification on scope", &[], &todos);
        assert_eq!(result.decision, Decision::Block);
    }

    #[test]
    fn missing_marker_blocks_defensively() {
        let moderator = CompletionModerator::new(PathBuf::from("/nonexistent"), PathBuf::from("/tmp"), true);
        let driver = AgentDriver::new(crate::driver::Provider::Claude, "claude");
        let result = moderator.evaluate(&driver, "s1", "still working", &[], &[]);
        assert_eq!(result.decision, Decision::Block);
    }
}
