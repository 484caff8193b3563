//! Audit consolidation (spec §4.6, "Consolidation").
//!
//! On every failed or timeout audit item, a second "consolidator" agent is
//! invoked with a prompt that includes both the current consolidated file
//! and the new item report, and is instructed to Read/Write/Edit the
//! consolidated file directly and emit only `UPDATED` or `NO_CHANGES`.

use std::path::Path;

use crate::driver::{AgentConfig, AgentDriver, CommandInstruction};
use crate::error::HarnessResult;
use crate::retry_loop::RetryStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsolidationOutcome {
    Updated,
    NoChanges,
    Unclear,
}

/// Whether this item's status warrants invoking the consolidator at all.
pub fn needs_consolidation(status: &RetryStatus) -> bool {
    matches!(status, RetryStatus::Failed(_) | RetryStatus::Timeout)
}

/// Invoke the consolidator agent for one failed/timeout item report.
pub fn run_consolidation(
    driver: &AgentDriver,
    template: &str,
    consolidated_path: &Path,
    item_report: &str,
    config: &AgentConfig,
) -> HarnessResult<ConsolidationOutcome> {
    let consolidated_content = std::fs::read_to_string(consolidated_path).unwrap_or_default();
    let prompt = template
        .replace("{CONSOLIDATED_CONTENT}", &consolidated_content)
        .replace("{NEW_REPORT}", item_report);

    let outcome = driver.run(CommandInstruction::Text(prompt), None, None, config)?;
    Ok(parse_consolidation_result(&outcome.output))
}

fn parse_consolidation_result(output: &str) -> ConsolidationOutcome {
    if output.contains("UPDATED") {
        ConsolidationOutcome::Updated
    } else if output.contains("NO_CHANGES") {
        ConsolidationOutcome::NoChanges
    } else {
        ConsolidationOutcome::Unclear
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needs_consolidation_only_for_failed_and_timeout() {
        assert!(needs_consolidation(&RetryStatus::Failed("x".into())));
        assert!(needs_consolidation(&RetryStatus::Timeout));
        assert!(!needs_consolidation(&RetryStatus::Completed));
        assert!(!needs_consolidation(&RetryStatus::Feedback("x".into())));
    }

    #[test]
    fn parses_updated_and_no_changes() {
        assert_eq!(parse_consolidation_result("UPDATED"), ConsolidationOutcome::Updated);
        assert_eq!(parse_consolidation_result("NO_CHANGES"), ConsolidationOutcome::NoChanges);
        assert_eq!(parse_consolidation_result("hmm"), ConsolidationOutcome::Unclear);
    }
}
