//! Task executor (spec §4.7), the `--tasks` CLI mode.
//!
//! Generalizes the audit executor's discover → retry-loop → report pipeline
//! with the task-specific extensions: an immutability lock around the first
//! attempt, an append-only per-run progress file, and a feedback file on
//! `feedback` status.

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::driver::{AgentDriver, CommandInstruction, Provider};
use crate::executor::discover::discover_work_items;
use crate::executor::lock::TaskFileLock;
use crate::executor::report::{render_item_report, report_path, status_label, write_report};
use crate::executor::run::{run_parallel, run_sequential, ItemOutcome};
use crate::retry_loop::{log_execution_metadata, run_retry_loop, RetryStatus};

pub struct TaskRunOutcome {
    pub total: usize,
    pub completed: usize,
    pub feedback: usize,
}

/// Run every task file discovered under `root`, honoring the task-specific
/// extensions described in spec §4.7.
pub fn run_tasks(
    config: &Config,
    root: &Path,
    output_dir: &Path,
    date_stamp: &str,
    parallel: bool,
) -> TaskRunOutcome {
    let items = discover_work_items(root, &config.task_globs);
    let timeout = config.timeouts.task_seconds as f64;
    let claude_cli = config
        .provider("claude")
        .map(|p| p.command.clone())
        .unwrap_or_else(|| "claude".to_string());

    let run_stamp = chrono::Utc::now().format("%Y%m%d%H%M%S").to_string();

    let process_item = {
        let claude_cli = claude_cli.clone();
        let run_stamp = run_stamp.clone();
        move |item_path: &PathBuf| -> crate::retry_loop::RetryLoopResult {
            let driver = AgentDriver::new(Provider::Claude, claude_cli.clone());
            let item_name = item_path.display().to_string();
            let progress_path = sibling_artifact_path(item_path, "progress", &run_stamp);

            let lock = TaskFileLock::acquire(item_path);
            // Completion moderation happens out-of-process: the worker's
            // AgentConfig leaves hooks enabled, so the agent CLI itself
            // invokes our Stop hook (hooks::dispatcher) at completion time,
            // which runs the real CompletionModerator against the CLI's own
            // transcript. The retry loop's own moderator slot stays
            // disabled here to avoid moderating twice.
            let result = run_retry_loop(
                &item_name,
                timeout,
                false,
                |attempt_n, extra| {
                    let worker_config = Provider::Claude
                        .default_config()
                        .with_new_session_id()
                        .with_timeout(timeout);
                    let outcome = driver.run(
                        CommandInstruction::File(item_path.clone()),
                        None,
                        None,
                        &worker_config,
                    )?;
                    append_progress_entry(&progress_path, attempt_n, extra, &outcome.output);
                    Ok((outcome.output, outcome.metadata))
                },
                |_, _, _| unreachable!("completion moderator is wired in by the CLI layer, not here"),
            );
            drop(lock);

            if let RetryStatus::Feedback(content) = &result.status {
                let feedback_path = sibling_artifact_path(item_path, "feedback", &run_stamp);
                let task_name = item_path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| item_name.clone());
                let body = format!("# Feedback Request: {task_name}\n\n{content}\n");
                if let Err(e) = write_report(&feedback_path, &body) {
                    tracing::warn!(item = %item_name, error = %e, "failed to write task feedback file");
                }
            }

            result
        }
    };

    let outcomes: Vec<ItemOutcome> = if parallel {
        run_parallel(items, config.effective_max_workers(), process_item)
    } else {
        run_sequential(items, process_item)
    };

    let total = outcomes.len();
    let mut completed = 0;
    let mut feedback = 0;

    for outcome in &outcomes {
        log_execution_metadata(&outcome.item_path.display().to_string(), &outcome.result.attempts);
        match &outcome.result.status {
            RetryStatus::Completed => completed += 1,
            RetryStatus::Feedback(_) => feedback += 1,
            _ => {}
        }

        let rendered = render_item_report(
            &outcome.item_path,
            &outcome.result.status,
            &chrono::Utc::now().to_rfc3339(),
            0.0,
            &format!("Attempts: {}\n", outcome.result.attempts.len()),
        );
        let path = report_path(output_dir, date_stamp, &outcome.item_path);
        if let Err(e) = write_report(&path, &rendered) {
            tracing::warn!(item = %outcome.item_path.display(), error = %e, "failed to write task report");
        }
    }

    tracing::info!(total, completed, feedback, "task run complete");

    TaskRunOutcome {
        total,
        completed,
        feedback,
    }
}

/// `<dir>/<kind>-YYYYMMDDHHMMSS-<task-stem>.md` beside the task file.
fn sibling_artifact_path(item_path: &Path, kind: &str, stamp: &str) -> PathBuf {
    let stem = item_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "task".to_string());
    let dir = item_path.parent().unwrap_or_else(|| Path::new("."));
    dir.join(format!("{kind}-{stamp}-{stem}.md"))
}

fn append_progress_entry(path: &Path, attempt_n: u32, extra: &str, output: &str) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!(error = %e, "failed to create progress file directory");
            return;
        }
    }
    let mut entry = format!("## Attempt {attempt_n}\n\n");
    if !extra.is_empty() {
        entry.push_str(&format!("Context: {extra}\n\n"));
    }
    entry.push_str(output);
    entry.push_str("\n\n");

    use std::io::Write;
    let file = std::fs::OpenOptions::new().create(true).append(true).open(path);
    match file {
        Ok(mut f) => {
            if let Err(e) = f.write_all(entry.as_bytes()) {
                tracing::warn!(error = %e, "failed to append to progress file");
            }
        }
        Err(e) => tracing::warn!(error = %e, "failed to open progress file"),
    }
}
