//! Moderator-with-retry controller (C5, spec §4.5).
//!
//! Wraps a single moderator invocation to detect startup hangs (no output
//! within `first_output_timeout`) and analysis hangs (output present but no
//! decision token before timeout), restarting the child up to `max_attempts`
//! times and always restoring the caller's original timeout on every exit
//! path.

use regex::Regex;
use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;

use crate::completion::markers::parse_code_fence_output;
use crate::driver::{AgentConfig, AgentDriver, CommandInstruction};
use crate::error::{HarnessError, HarnessResult};

static DECISION_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(ALLOW|BLOCK)\b").unwrap());

const FIRST_OUTPUT_MARKER: &str = "=== FIRST OUTPUT:";

pub struct ModeratorRetryOutcome {
    pub output: String,
    pub metadata: crate::driver::ExecutionMetadata,
}

/// Runs `driver` against `instruction` with startup/analysis hang
/// detection, per the exact algorithm in spec §4.5.
#[allow(clippy::too_many_arguments)]
pub fn run_moderator_with_retry(
    driver: &AgentDriver,
    instruction: CommandInstruction,
    cwd: Option<&Path>,
    agent_config: &AgentConfig,
    audit_log_path: &Path,
    max_attempts: u32,
    first_output_timeout: f64,
) -> HarnessResult<ModeratorRetryOutcome> {
    let original_timeout = agent_config.timeout_seconds;
    let hang_detection_timeout = (2.0 * first_output_timeout).max(15.0);

    let mut last_output: Option<String> = None;
    let mut last_metadata = crate::driver::ExecutionMetadata::default();

    for attempt in 1..=max_attempts {
        truncate_audit_log(audit_log_path)?;

        let mut attempt_config = agent_config.clone();
        attempt_config.timeout_seconds = Some(hang_detection_timeout);

        let audit_log_path_owned = audit_log_path.to_path_buf();
        let run_result = driver.run_traced(instruction.clone(), cwd, &attempt_config, || {
            mark_first_output(&audit_log_path_owned);
        });

        let run_result = match run_result {
            Ok(outcome) => outcome,
            Err(e) if e.is_retryable() => {
                if attempt < max_attempts {
                    let _ = driver.kill_current();
                    continue;
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let has_first = audit_log_contains_marker(audit_log_path)?;
        let cleaned = parse_code_fence_output(&run_result.output);
        let has_decision = DECISION_TOKEN_RE.is_match(&cleaned);

        if has_first && has_decision {
            return Ok(ModeratorRetryOutcome {
                output: run_result.output,
                metadata: run_result.metadata,
            });
        }

        if has_first && !has_decision {
            if attempt < max_attempts {
                let _ = driver.kill_current();
                last_output = Some(run_result.output);
                last_metadata = run_result.metadata;
                continue;
            }
            // Last-ditch: return as-is, upstream will fail-closed on an
            // unparseable decision.
            return Ok(ModeratorRetryOutcome {
                output: run_result.output,
                metadata: run_result.metadata,
            });
        }

        if !has_first {
            // Anomaly: the run completed without ever writing a first-output
            // marker. Return as-is rather than treating it as a hang.
            return Ok(ModeratorRetryOutcome {
                output: run_result.output,
                metadata: run_result.metadata,
            });
        }

        last_output = Some(run_result.output);
        last_metadata = run_result.metadata;
    }

    let _ = last_output;
    let _ = last_metadata;
    Err(HarnessError::TimeoutError {
        configured_timeout: original_timeout,
        actual_duration: hang_detection_timeout * max_attempts as f64,
    })
}

fn truncate_audit_log(path: &Path) -> HarnessResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::File::create(path)?;
    Ok(())
}

fn mark_first_output(path: &Path) {
    let Ok(mut file) = std::fs::OpenOptions::new().append(true).open(path) else {
        return;
    };
    let _ = writeln!(file, "{FIRST_OUTPUT_MARKER} {}", chrono::Utc::now().to_rfc3339());
}

fn audit_log_contains_marker(path: &Path) -> HarnessResult<bool> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(content.contains(FIRST_OUTPUT_MARKER)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(HarnessError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Provider;

    #[test]
    fn hang_detection_timeout_formula() {
        assert_eq!((2.0_f64 * 3.5).max(15.0), 15.0);
        assert_eq!((2.0_f64 * 10.0).max(15.0), 20.0);
    }

    #[test]
    fn decision_token_regex_matches_allow_and_block() {
        assert!(DECISION_TOKEN_RE.is_match("ALLOW: looks good"));
        assert!(DECISION_TOKEN_RE.is_match("BLOCK: no"));
        assert!(!DECISION_TOKEN_RE.is_match("no decision here"));
    }

    #[test]
    fn command_not_found_propagates_without_retry_loop_hang() {
        let driver = AgentDriver::new(Provider::Claude, "definitely-not-a-real-binary-xyz");
        let dir = tempfile::tempdir().unwrap();
        let audit_log = dir.path().join("audit.log");
        let config = Provider::Claude.default_config().with_timeout(1.0);
        let result = run_moderator_with_retry(
            &driver,
            CommandInstruction::Text("hi".into()),
            None,
            &config,
            &audit_log,
            2,
            3.5,
        );
        assert!(result.is_err());
    }
}
