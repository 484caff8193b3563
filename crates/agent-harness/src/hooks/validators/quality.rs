//! LLM diff-audit subroutine (spec §4.8.1) and the core/Python quality
//! validators that call it.
//!
//! Builds a temporary prompt file substituting a `{PATTERNS}` placeholder,
//! invokes the agent driver through the moderator-with-retry controller,
//! and parses the output for the *earliest* of `ALLOW` or `BLOCK:` —
//! distinct from the completion moderator's priority-ordered parser
//! (spec §4.10).

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::completion::markers::parse_code_fence_output;
use crate::driver::{AgentConfigPresets, AgentDriver, CommandInstruction};
use crate::error::HarnessResult;
use crate::hooks::decision::HookResult;
use crate::hooks::input::HookEvent;
use crate::hooks::moderator::run_moderator_with_retry;

static ALLOW_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bALLOW\b").unwrap());
static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bBLOCK:\s*").unwrap());

/// Parse the earliest of `ALLOW` / `BLOCK:` in a (code-fence-stripped)
/// moderator output. Earliest match wins, unlike the completion moderator's
/// priority-ordered grammar.
pub fn parse_earliest_decision(output: &str) -> EarliestDecision {
    let cleaned = parse_code_fence_output(output);
    let allow = ALLOW_RE.find(&cleaned);
    let block = BLOCK_RE.find(&cleaned);

    match (allow, block) {
        (Some(a), Some(b)) if a.start() < b.start() => EarliestDecision::Allow,
        (Some(_), None) => EarliestDecision::Allow,
        (_, Some(b)) => {
            let reason = cleaned[b.end()..].trim();
            let reason = if reason.is_empty() {
                "Violation detected".to_string()
            } else {
                reason.to_string()
            };
            EarliestDecision::Block(reason)
        }
        (None, None) => EarliestDecision::Unparseable,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EarliestDecision {
    Allow,
    Block(String),
    Unparseable,
}

/// Build a temp prompt file from a template with `{PATTERNS}` substituted,
/// run it through the moderator-with-retry controller, and clean the temp
/// file up unconditionally.
pub fn run_diff_audit(
    driver: &AgentDriver,
    template: &str,
    patterns_content: &str,
    old_content: &str,
    new_content: &str,
    audit_log_path: &Path,
    validator_label: &str,
) -> HarnessResult<HookResult> {
    let prompt = template
        .replace("{PATTERNS}", patterns_content)
        .replace("{OLD_CONTENT}", old_content)
        .replace("{NEW_CONTENT}", new_content);

    let temp_path = write_temp_prompt(&prompt)?;
    let cleanup = TempFileGuard(temp_path.clone());

    let config = AgentConfigPresets::completion_moderator(validator_label);
    let result = run_moderator_with_retry(
        driver,
        CommandInstruction::File(temp_path),
        None,
        &config,
        audit_log_path,
        2,
        3.5,
    );
    drop(cleanup);

    let outcome = result?;
    Ok(match parse_earliest_decision(&outcome.output) {
        EarliestDecision::Allow => HookResult::allow(),
        EarliestDecision::Block(reason) => HookResult::deny(reason),
        EarliestDecision::Unparseable => {
            HookResult::deny("diff audit returned an unparseable response; blocking for safety")
        }
    })
}

struct TempFileGuard(PathBuf);

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

fn write_temp_prompt(content: &str) -> HarnessResult<PathBuf> {
    let path = std::env::temp_dir().join(format!("diff-audit-{}.txt", uuid::Uuid::now_v7()));
    std::fs::write(&path, content)?;
    Ok(path)
}

/// Reconstruct the full proposed new content for Write/Edit tool calls. For
/// Edit, read the current file and apply the (single) substitution.
pub fn reconstruct_proposed_content(event: &HookEvent) -> Option<(String, String)> {
    let tool_input = event.tool_input.as_ref()?;
    let path = tool_input.get("file_path")?.as_str()?;

    match event.tool_name.as_deref() {
        Some("Write") => {
            let new_content = tool_input.get("content")?.as_str()?.to_string();
            let old_content = std::fs::read_to_string(path).unwrap_or_default();
            Some((old_content, new_content))
        }
        Some("Edit") => {
            let old_string = tool_input.get("old_string")?.as_str()?;
            let new_string = tool_input.get("new_string")?.as_str()?;
            let old_content = std::fs::read_to_string(path).ok()?;
            let new_content = old_content.replacen(old_string, new_string, 1);
            Some((old_content, new_content))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn earliest_allow_wins_when_allow_comes_first() {
        let output = "ALLOW - looks fine, though some might BLOCK: this later";
        assert_eq!(parse_earliest_decision(output), EarliestDecision::Allow);
    }

    #[test]
    fn earliest_block_wins_when_block_comes_first() {
        let output = "BLOCK: forbidden pattern, do not ALLOW this";
        match parse_earliest_decision(output) {
            EarliestDecision::Block(reason) => assert!(reason.contains("ALLOW")),
            other => panic!("expected Block, got {other:?}"),
        }
    }

    #[test]
    fn only_allow_present() {
        assert_eq!(parse_earliest_decision("ALLOW"), EarliestDecision::Allow);
    }

    #[test]
    fn neither_present_is_unparseable() {
        assert_eq!(
            parse_earliest_decision("no decision here"),
            EarliestDecision::Unparseable
        );
    }

    #[test]
    fn strips_one_code_fence_before_parsing() {
        let output = "```\nBLOCK: bad\n```";
        match parse_earliest_decision(output) {
            EarliestDecision::Block(reason) => assert_eq!(reason, "bad"),
            other => panic!("expected Block, got {other:?}"),
        }
    }
}
