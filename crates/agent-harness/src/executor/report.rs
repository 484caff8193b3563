//! Per-item and consolidated report writing (spec §4.6, §4.11).
//!
//! All artefacts are plain Markdown, written "atomically enough for a
//! crash-safe read" — a single `write` call, never an in-place edit.

use std::path::{Path, PathBuf};

use crate::retry_loop::RetryStatus;

/// The unified lowercase status vocabulary used across every report kind.
pub fn status_label(status: &RetryStatus) -> &'static str {
    match status {
        RetryStatus::Completed => "completed",
        RetryStatus::Feedback(_) => "feedback",
        RetryStatus::Timeout => "timeout",
        RetryStatus::Failed(_) => "failed",
    }
}

/// Build the per-item report path: `<output_dir>/DD.MM.YYYY/<relative-path>.md`.
pub fn report_path(output_dir: &Path, date_stamp: &str, relative_item_path: &Path) -> PathBuf {
    output_dir
        .join(date_stamp)
        .join(format!("{}.md", relative_item_path.display()))
}

/// Render a per-item report body.
pub fn render_item_report(
    item_path: &Path,
    status: &RetryStatus,
    timestamp: &str,
    execution_time_secs: f64,
    body: &str,
) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", item_path.display()));
    out.push_str(&format!("- **Status**: {}\n", status_label(status)));
    out.push_str(&format!("- **Timestamp**: {timestamp}\n"));
    out.push_str(&format!("- **Execution time**: {execution_time_secs:.2}s\n\n"));
    if let RetryStatus::Failed(reason) | RetryStatus::Feedback(reason) = status {
        out.push_str(&format!("## Detail\n\n{reason}\n\n"));
    }
    out.push_str(body);
    out
}

/// Write a report to disk, creating parent directories as needed. A single
/// write call, no in-place editing (spec §4.11).
pub fn write_report(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)
}

/// Append a single failed/timeout item entry to the consolidated report.
/// The consolidated file itself is later rewritten by the consolidator
/// agent (spec §4.6 "Consolidation"); this just ensures an entry exists for
/// it to act on.
pub fn append_consolidated_entry(consolidated_path: &Path, item_path: &Path, status: &RetryStatus) -> std::io::Result<()> {
    if let Some(parent) = consolidated_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut existing = std::fs::read_to_string(consolidated_path).unwrap_or_default();
    if existing.is_empty() {
        existing.push_str("# Consolidated audit report\n\n");
    }
    existing.push_str(&format!("- `{}` — {}\n", item_path.display(), status_label(status)));
    std::fs::write(consolidated_path, existing)
}

/// Find the most recently written consolidated report under `output_dir`
/// (its date-stamped subdirectories sort lexicographically only by
/// accident of format, so this picks by directory mtime) and return the
/// item paths it recorded as `failed` or `timeout` — the working set for
/// `--retry-errors` (spec §6.1).
pub fn previously_failed_items(output_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(output_dir) else {
        return Vec::new();
    };
    let latest = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.metadata().ok().and_then(|m| m.modified().ok()).map(|mtime| (mtime, e.path())))
        .max_by_key(|(mtime, _)| *mtime)
        .map(|(_, path)| path);

    let Some(dir) = latest else {
        return Vec::new();
    };
    let Ok(content) = std::fs::read_to_string(dir.join("consolidated.md")) else {
        return Vec::new();
    };

    content
        .lines()
        .filter_map(|line| {
            let rest = line.strip_prefix("- `")?;
            let (path_str, tail) = rest.split_once('`')?;
            let status = tail.trim_start_matches(" — ").trim();
            if status == "failed" || status == "timeout" {
                Some(PathBuf::from(path_str))
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_path_stamps_date_and_mirrors_relative_path() {
        let path = report_path(Path::new("docs/audit"), "28.07.2026", Path::new("src/lib.py"));
        assert_eq!(path, PathBuf::from("docs/audit/28.07.2026/src/lib.py.md"));
    }

    #[test]
    fn completed_report_has_no_detail_section() {
        let rendered = render_item_report(
            Path::new("src/lib.py"),
            &RetryStatus::Completed,
            "2026-07-28T00:00:00Z",
            1.5,
            "no violations found\n",
        );
        assert!(rendered.contains("**Status**: completed"));
        assert!(!rendered.contains("## Detail"));
    }

    #[test]
    fn failed_report_includes_detail() {
        let rendered = render_item_report(
            Path::new("src/lib.py"),
            &RetryStatus::Failed("agent crashed".into()),
            "2026-07-28T00:00:00Z",
            0.2,
            "",
        );
        assert!(rendered.contains("## Detail"));
        assert!(rendered.contains("agent crashed"));
    }

    #[test]
    fn write_report_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("report.md");
        write_report(&path, "hello").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    }

    #[test]
    fn consolidated_entry_is_appended_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("consolidated.md");
        append_consolidated_entry(&path, Path::new("a.py"), &RetryStatus::Timeout).unwrap();
        append_consolidated_entry(&path, Path::new("b.py"), &RetryStatus::Failed("x".into())).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("a.py"));
        assert!(content.contains("b.py"));
    }

    #[test]
    fn previously_failed_items_reads_failed_and_timeout_only() {
        let dir = tempfile::tempdir().unwrap();
        let run_dir = dir.path().join("28.07.2026");
        let consolidated = run_dir.join("consolidated.md");
        append_consolidated_entry(&consolidated, Path::new("a.py"), &RetryStatus::Timeout).unwrap();
        append_consolidated_entry(&consolidated, Path::new("b.py"), &RetryStatus::Failed("x".into())).unwrap();
        append_consolidated_entry(&consolidated, Path::new("c.py"), &RetryStatus::Completed).unwrap();

        let items = previously_failed_items(dir.path());
        assert_eq!(items.len(), 2);
        assert!(items.contains(&PathBuf::from("a.py")));
        assert!(items.contains(&PathBuf::from("b.py")));
    }

    #[test]
    fn previously_failed_items_is_empty_with_no_prior_run() {
        let dir = tempfile::tempdir().unwrap();
        assert!(previously_failed_items(dir.path()).is_empty());
    }
}
