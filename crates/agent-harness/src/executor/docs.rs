//! Documentation executor (spec §4.6), the `--docs` CLI mode.
//!
//! Shares the discover → retry-loop → report pipeline with the audit and
//! task executors; reports carry an action (spec §3.3: `UPDATE`, `ARCHIVE`,
//! `DELETE`) detected from the worker's own output, instead of a violations
//! list or attempt summary.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::Config;
use crate::driver::{AgentDriver, CommandInstruction, Provider};
use crate::executor::discover::discover_work_items;
use crate::executor::report::{render_item_report, report_path, write_report};
use crate::executor::run::{run_parallel, run_sequential, ItemOutcome};
use crate::retry_loop::{log_execution_metadata, run_retry_loop, RetryStatus};

pub struct DocsRunOutcome {
    pub total: usize,
    pub updated: usize,
    pub failed_or_timed_out: usize,
}

/// The action a doc worker took (spec §3.3, `{UPDATE, ARCHIVE, DELETE}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocAction {
    Update,
    Archive,
    Delete,
}

impl DocAction {
    fn label(self) -> &'static str {
        match self {
            DocAction::Update => "documentation updated",
            DocAction::Archive => "documentation archived",
            DocAction::Delete => "documentation recommended for deletion",
        }
    }
}

/// Detect which action the worker took, grounded on `docs.py::_detect_action`:
/// scan the worker's own output for action indicators rather than inferring
/// from the retry-loop status. Checked in DELETE, ARCHIVE, UPDATE order so a
/// worker that both archives and deletes old material is recorded as DELETE.
fn detect_action(worker_output: &str) -> Option<DocAction> {
    let upper = worker_output.to_uppercase();
    if upper.contains("RECOMMEND DELETION") || upper.contains("DELETE") {
        Some(DocAction::Delete)
    } else if upper.contains("ARCHIVED") || upper.contains("ARCHIVE") {
        Some(DocAction::Archive)
    } else if upper.contains("UPDATED") || upper.contains("UPDATE") || upper.contains("EDIT") {
        Some(DocAction::Update)
    } else {
        None
    }
}

pub fn run_docs(
    config: &Config,
    root: &Path,
    output_dir: &Path,
    date_stamp: &str,
    parallel: bool,
) -> DocsRunOutcome {
    let items = discover_work_items(root, &config.doc_globs);
    let timeout = config.timeouts.doc_seconds as f64;
    let claude_cli = config
        .provider("claude")
        .map(|p| p.command.clone())
        .unwrap_or_else(|| "claude".to_string());

    // `RetryLoopResult` carries only status + attempts; the detected action
    // (spec §3.3, doc executor only) is recorded here, keyed by item path,
    // from each attempt's own worker output as it comes in.
    let action_by_item: Mutex<HashMap<PathBuf, DocAction>> = Mutex::new(HashMap::new());

    let process_item = {
        let claude_cli = claude_cli.clone();
        move |item_path: &PathBuf| -> crate::retry_loop::RetryLoopResult {
            let driver = AgentDriver::new(Provider::Claude, claude_cli.clone());
            let item_name = item_path.display().to_string();
            // See executor::tasks for why moderator_enabled is false here:
            // the agent CLI's own Stop hook performs completion moderation.
            run_retry_loop(
                &item_name,
                timeout,
                false,
                |_attempt_n, _extra| {
                    let worker_config = Provider::Claude
                        .default_config()
                        .with_new_session_id()
                        .with_timeout(timeout);
                    let outcome = driver.run(CommandInstruction::File(item_path.clone()), None, None, &worker_config)?;
                    if let Some(action) = detect_action(&outcome.output) {
                        action_by_item.lock().unwrap().insert(item_path.clone(), action);
                    }
                    Ok((outcome.output, outcome.metadata))
                },
                |_, _, _| unreachable!("documentation items do not consult the retry loop's moderator slot"),
            )
        }
    };

    let outcomes: Vec<ItemOutcome> = if parallel {
        run_parallel(items, config.effective_max_workers(), process_item)
    } else {
        run_sequential(items, process_item)
    };

    let action_by_item = action_by_item.into_inner().unwrap();
    let total = outcomes.len();
    let mut updated = 0;
    let mut failed_or_timed_out = 0;

    for outcome in &outcomes {
        log_execution_metadata(&outcome.item_path.display().to_string(), &outcome.result.attempts);
        match &outcome.result.status {
            RetryStatus::Completed => updated += 1,
            RetryStatus::Timeout | RetryStatus::Failed(_) => failed_or_timed_out += 1,
            RetryStatus::Feedback(_) => {}
        }

        let action = match action_by_item.get(&outcome.item_path) {
            Some(action) => action.label(),
            None => match &outcome.result.status {
                RetryStatus::Feedback(_) => "worker requested clarification",
                RetryStatus::Timeout => "no action (timed out)",
                RetryStatus::Failed(_) => "no action (failed)",
                RetryStatus::Completed => "no action detected",
            },
        };
        let rendered = render_item_report(
            &outcome.item_path,
            &outcome.result.status,
            &chrono::Utc::now().to_rfc3339(),
            0.0,
            &format!("Action: {action}\n"),
        );
        let path = report_path(output_dir, date_stamp, &outcome.item_path);
        if let Err(e) = write_report(&path, &rendered) {
            tracing::warn!(item = %outcome.item_path.display(), error = %e, "failed to write docs report");
        }
    }

    tracing::info!(total, updated, failed_or_timed_out, "docs run complete");

    DocsRunOutcome {
        total,
        updated,
        failed_or_timed_out,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_action_prefers_delete_over_archive_and_update() {
        assert_eq!(
            detect_action("Reviewed this doc and recommend deletion; it's also stale so I archived the rest."),
            Some(DocAction::Delete)
        );
    }

    #[test]
    fn detect_action_recognizes_archive() {
        assert_eq!(detect_action("This page is obsolete, I archived it."), Some(DocAction::Archive));
    }

    #[test]
    fn detect_action_recognizes_update() {
        assert_eq!(detect_action("Updated the installation steps for the new CLI flag."), Some(DocAction::Update));
    }

    #[test]
    fn detect_action_is_none_when_no_indicator_present() {
        assert_eq!(detect_action("WORK DONE"), None);
    }
}
