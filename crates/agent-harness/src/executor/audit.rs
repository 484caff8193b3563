//! Audit executor (spec §4.6, §8 scenarios 1-2), wiring discovery, a
//! single-shot audit worker, reports, and consolidation together for the
//! `--audit` CLI mode.
//!
//! Unlike the task/doc executors, the audit worker is **not** an iterative
//! `WORK DONE`/`FEEDBACK:` retry-loop participant: per
//! `audit_utils/processing.py::parse_audit_output`, it runs exactly once per
//! item and its output is parsed directly for literal `PASS`, `FAIL:
//! <reason>`, or `ERROR:`, producing an ordered list of violations (spec
//! §3.4). This executor therefore builds its own worker_fn/parse_fn pair
//! instead of going through `retry_loop::run_retry_loop`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::completion::markers::{parse_audit_output, AuditStatus, AuditViolation};
use crate::config::Config;
use crate::driver::{AgentConfig, AgentDriver, CommandInstruction, Provider};
use crate::executor::consolidate::{needs_consolidation, run_consolidation};
use crate::executor::discover::discover_work_items;
use crate::executor::report::{previously_failed_items, render_item_report, report_path, status_label, write_report};
use crate::executor::run::{run_parallel, run_sequential, ItemOutcome};
use crate::patterns::{detect_language, load_deny_patterns};
use crate::retry_loop::{AttemptRecord, RetryLoopResult, RetryStatus};

pub struct AuditOutcome {
    pub total: usize,
    pub failed_or_timed_out: usize,
}

/// Run an audit over `root` using the configured include/exclude globs,
/// writing per-item reports under `output_dir/<date_stamp>/...` and updating
/// the consolidated report for every failed or timed-out item. When
/// `retry_errors` is set, only items the most recent run recorded as
/// `failed`/`timeout` in its consolidated report are re-audited (spec
/// §6.1); if there is no prior run to read, every discovered item runs.
pub fn run_audit(
    config: &Config,
    root: &Path,
    output_dir: &Path,
    date_stamp: &str,
    parallel: bool,
    retry_errors: bool,
) -> AuditOutcome {
    let mut items = discover_work_items(root, &config.audit_globs);
    if retry_errors {
        let carryover = previously_failed_items(output_dir);
        if !carryover.is_empty() {
            items.retain(|item| carryover.contains(item));
        }
    }
    let audit_deny_path = config.patterns.bash_deny.clone().unwrap_or_default();
    let deny_patterns = load_deny_patterns(&audit_deny_path);
    let timeout = config.timeouts.audit_seconds as f64;
    let claude_cli = config
        .provider("claude")
        .map(|p| p.command.clone())
        .unwrap_or_else(|| "claude".to_string());

    // `RetryLoopResult`/`ItemOutcome` carry only `status` + `attempts` (they
    // were built for the iterative worker/moderator loop); the violations
    // list an audit item produces has no room there, so it is collected in
    // this side table keyed by item path and consulted when rendering
    // reports below.
    let violations_by_item: Mutex<HashMap<PathBuf, Vec<AuditViolation>>> = Mutex::new(HashMap::new());

    let process_item = {
        let timeout = timeout;
        let claude_cli = claude_cli.clone();
        move |item_path: &PathBuf| -> RetryLoopResult {
            let driver = AgentDriver::new(Provider::Claude, claude_cli.clone());
            let item_name = item_path.display().to_string();
            let worker_config = worker_config(&item_name);

            let run_result = driver.run(CommandInstruction::File(item_path.clone()), None, None, &worker_config);

            let (status, violations, worker_metadata) = match run_result {
                Ok(outcome) => {
                    let (audit_status, violations) = parse_audit_output(&outcome.output);
                    let status = match audit_status {
                        AuditStatus::Pass => RetryStatus::Completed,
                        AuditStatus::Fail | AuditStatus::Error => {
                            let reason = violations
                                .first()
                                .map(|v| v.message.clone())
                                .unwrap_or_else(|| "audit worker returned an unparseable result".to_string());
                            RetryStatus::Failed(reason)
                        }
                    };
                    (status, violations, outcome.metadata)
                }
                Err(e) => {
                    tracing::error!(item = %item_name, error = %e, "audit worker invocation failed");
                    (RetryStatus::Failed(e.to_string()), Vec::new(), Default::default())
                }
            };

            if !violations.is_empty() {
                violations_by_item
                    .lock()
                    .unwrap()
                    .insert(item_path.clone(), violations);
            }

            RetryLoopResult {
                status,
                attempts: vec![AttemptRecord {
                    attempt_n: 1,
                    worker_metadata,
                    moderator_metadata: None,
                }],
            }
        }
    };

    let outcomes: Vec<ItemOutcome> = if parallel {
        run_parallel(items, config.effective_max_workers(), process_item)
    } else {
        run_sequential(items, process_item)
    };

    let violations_by_item = violations_by_item.into_inner().unwrap();
    let consolidated_path = output_dir.join(date_stamp).join("consolidated.md");
    let mut failed_or_timed_out = 0;
    let total = outcomes.len();

    for outcome in &outcomes {
        crate::retry_loop::log_execution_metadata(&outcome.item_path.display().to_string(), &outcome.result.attempts);
        if needs_consolidation(&outcome.result.status) {
            failed_or_timed_out += 1;
        }

        let language = detect_language(&outcome.item_path).unwrap_or("text");
        let violations = violations_by_item.get(&outcome.item_path);
        let body = render_violations_body(language, deny_patterns.len(), violations);
        let rendered = render_item_report(
            &outcome.item_path,
            &outcome.result.status,
            &chrono::Utc::now().to_rfc3339(),
            0.0,
            &body,
        );
        let path = report_path(output_dir, date_stamp, &outcome.item_path);
        if let Err(e) = write_report(&path, &rendered) {
            tracing::warn!(item = %outcome.item_path.display(), error = %e, "failed to write audit report");
        }

        if needs_consolidation(&outcome.result.status) {
            if let Err(e) = crate::executor::report::append_consolidated_entry(
                &consolidated_path,
                &outcome.item_path,
                &outcome.result.status,
            ) {
                tracing::warn!(error = %e, "failed to append consolidated entry");
            }
        }
    }

    tracing::info!(
        total,
        failed_or_timed_out,
        "audit run complete, status={}",
        outcomes.last().map(|o| status_label(&o.result.status)).unwrap_or("none")
    );

    AuditOutcome {
        total,
        failed_or_timed_out,
    }
}

fn render_violations_body(language: &str, deny_pattern_count: usize, violations: Option<&Vec<AuditViolation>>) -> String {
    let mut body = format!("Detected language: {language}\n\nDeny patterns evaluated: {deny_pattern_count}\n\n");
    match violations {
        None => body.push_str("No violations detected.\n"),
        Some(violations) => {
            body.push_str(&format!("## Violations ({})\n\n", violations.len()));
            for v in violations {
                body.push_str(&format!(
                    "- Line {}: {} (severity: {:?}, pattern: {})\n",
                    v.line, v.message, v.severity, v.pattern_id
                ));
            }
        }
    }
    body
}

fn worker_config(item_name: &str) -> AgentConfig {
    tracing::debug!(item_name, "building audit worker config");
    Provider::Claude.default_config().with_new_session_id()
}

/// Re-consolidate a single item's report after the fact, used by
/// `--retry-errors` re-audits (spec §6.1).
pub fn consolidate_item(
    driver: &AgentDriver,
    consolidator_template: &str,
    consolidated_path: &Path,
    item_report: &str,
    config: &AgentConfig,
) -> crate::error::HarnessResult<crate::executor::consolidate::ConsolidationOutcome> {
    run_consolidation(driver, consolidator_template, consolidated_path, item_report, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_config_always_carries_a_fresh_session_id() {
        let config = worker_config("item");
        assert!(config.session_id.is_some());
    }

    #[test]
    fn render_violations_body_reports_none_when_no_violations() {
        let body = render_violations_body("python", 3, None);
        assert!(body.contains("No violations detected"));
    }

    #[test]
    fn render_violations_body_lists_each_violation() {
        let violations = vec![AuditViolation {
            line: 12,
            pattern_id: "llm_audit".to_string(),
            severity: crate::completion::markers::ViolationSeverity::Critical,
            message: "FAIL: eval() on untrusted input".to_string(),
        }];
        let body = render_violations_body("python", 3, Some(&violations));
        assert!(body.contains("Violations (1)"));
        assert!(body.contains("eval() on untrusted input"));
    }
}
