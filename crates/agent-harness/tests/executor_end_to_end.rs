//! End-to-end executor tests (spec §8, scenarios 1-3): a fixture shell
//! script stands in for the agent CLI, exercised through the real
//! `Command`-spawning driver rather than a mock, so these cover the actual
//! discover -> retry-loop -> report wiring.

use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use agent_harness::config::{Config, DiscoveryGlobs, PatternPaths, PromptPaths, Timeouts};
use agent_harness::executor::{audit, tasks};

fn write_fixture_cli(dir: &Path, name: &str, stdout: &str) -> PathBuf {
    let path = dir.join(name);
    let mut file = fs::File::create(&path).unwrap();
    writeln!(file, "#!/bin/sh").unwrap();
    writeln!(file, "cat <<'EOF'\n{stdout}\nEOF").unwrap();
    drop(file);
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn test_config(root: &Path, claude_cli: &Path) -> Config {
    let mut providers = std::collections::HashMap::new();
    providers.insert(
        "claude".to_string(),
        agent_harness::config::ProviderConfig {
            command: claude_cli.display().to_string(),
            extra_args: Vec::new(),
        },
    );
    Config {
        root: root.to_path_buf(),
        providers,
        prompts: PromptPaths::default(),
        patterns: PatternPaths::default(),
        timeouts: Timeouts {
            task_seconds: 30,
            doc_seconds: 30,
            audit_seconds: 30,
            framework_seconds: 30,
            first_output_seconds: 3.5,
        },
        audit_globs: DiscoveryGlobs {
            include: vec!["**/*.py".to_string()],
            exclude: vec![],
        },
        task_globs: DiscoveryGlobs {
            include: vec!["**/*.md".to_string()],
            exclude: vec![],
        },
        doc_globs: DiscoveryGlobs::default(),
        max_workers: 2,
        completion_moderator_enabled: false,
        research_validator_line_threshold: 5,
        hook_settings_file: None,
    }
}

#[test]
fn audit_pass_produces_a_completed_report() {
    let workspace = tempfile::tempdir().unwrap();
    fs::write(workspace.path().join("m.py"), "def foo(): pass\n").unwrap();

    let fixtures = tempfile::tempdir().unwrap();
    // Spec §8 scenario 1: the audit worker is single-shot and its verdict is
    // the literal string "PASS", not a "WORK DONE" completion marker.
    let cli = write_fixture_cli(fixtures.path(), "claude", "PASS");

    let output_dir = tempfile::tempdir().unwrap();
    let config = test_config(workspace.path(), &cli);

    let outcome = audit::run_audit(
        &config,
        workspace.path(),
        output_dir.path(),
        "28.07.2026",
        false,
        false,
    );

    assert_eq!(outcome.total, 1);
    assert_eq!(outcome.failed_or_timed_out, 0);

    let report_path = output_dir.path().join("28.07.2026").join("m.py.md");
    let report = fs::read_to_string(&report_path).unwrap();
    assert!(report.contains("**Status**: completed"));
    assert!(report.contains("No violations detected"));
}

#[test]
fn audit_fail_produces_a_failed_report_with_a_violation() {
    let workspace = tempfile::tempdir().unwrap();
    fs::write(workspace.path().join("m.py"), "eval(user_input)\n").unwrap();

    let fixtures = tempfile::tempdir().unwrap();
    // Spec §8 scenario 2: a literal "FAIL: <reason>" verdict, parsed
    // directly into a recorded violation rather than retried.
    let cli = write_fixture_cli(fixtures.path(), "claude", "FAIL: Use of eval() on untrusted input");

    let output_dir = tempfile::tempdir().unwrap();
    let config = test_config(workspace.path(), &cli);

    let outcome = audit::run_audit(
        &config,
        workspace.path(),
        output_dir.path(),
        "28.07.2026",
        false,
        false,
    );

    assert_eq!(outcome.total, 1);
    assert_eq!(outcome.failed_or_timed_out, 1);

    let report_path = output_dir.path().join("28.07.2026").join("m.py.md");
    let report = fs::read_to_string(&report_path).unwrap();
    assert!(report.contains("**Status**: failed"));
    assert!(report.contains("Use of eval() on untrusted input"));
}

#[test]
fn audit_retry_errors_with_no_prior_run_audits_everything() {
    let workspace = tempfile::tempdir().unwrap();
    fs::write(workspace.path().join("m.py"), "def foo(): pass\n").unwrap();

    let fixtures = tempfile::tempdir().unwrap();
    let cli = write_fixture_cli(fixtures.path(), "claude", "PASS");

    let output_dir = tempfile::tempdir().unwrap();
    let config = test_config(workspace.path(), &cli);

    let outcome = audit::run_audit(
        &config,
        workspace.path(),
        output_dir.path(),
        "28.07.2026",
        false,
        true,
    );

    assert_eq!(outcome.total, 1);
}

#[test]
fn task_feedback_writes_a_feedback_sidecar_file() {
    let workspace = tempfile::tempdir().unwrap();
    fs::write(workspace.path().join("t.md"), "Implement the thing.\n").unwrap();

    let fixtures = tempfile::tempdir().unwrap();
    let cli = write_fixture_cli(fixtures.path(), "claude", "FEEDBACK: Need clarification on X");

    let output_dir = tempfile::tempdir().unwrap();
    let config = test_config(workspace.path(), &cli);

    let outcome = tasks::run_tasks(
        &config,
        workspace.path(),
        output_dir.path(),
        "20260728120000",
        false,
    );

    assert_eq!(outcome.total, 1);
    assert_eq!(outcome.feedback, 1);

    // The feedback file is stamped with the run's own wall-clock time, not
    // the date_stamp passed in for report paths, so find it by prefix.
    let feedback_entry = fs::read_dir(workspace.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .find(|e| e.file_name().to_string_lossy().starts_with("feedback-"))
        .expect("a feedback-*-t.md sidecar file should have been written");
    let content = fs::read_to_string(feedback_entry.path()).unwrap();
    assert_eq!(content, "# Feedback Request: t\n\nNeed clarification on X\n");
}
