//! Completion marker grammar (spec §4.4, §9).
//!
//! A small enumerated grammar: `WORK DONE`, `FEEDBACK:`, `PASS`, `FAIL:`,
//! `ALLOW`, `ALLOW:`, `BLOCK:`. Implemented as hand-written recognizers over
//! a cleaned string (one optional outer code-fence strip).

use regex::Regex;
use std::sync::LazyLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionMarker {
    WorkDone,
    Feedback(String),
    None,
}

static FEEDBACK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)FEEDBACK:\s*(.+)").unwrap());
static FAIL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)FAIL:\s*(.+)").unwrap());

/// Parse a worker's completion marker.
///
/// Tie-break (spec §4.4, overriding the original source's incidental
/// if/elif code order): `FEEDBACK:` wins over `WORK DONE` when both appear,
/// since feedback is a user-visible halt.
pub fn parse_completion_marker(output: &str) -> CompletionMarker {
    if let Some(captures) = FEEDBACK_RE.captures(output) {
        let content = captures[1].trim();
        if !content.is_empty() {
            return CompletionMarker::Feedback(content.to_string());
        }
    }
    if output.contains("WORK DONE") {
        return CompletionMarker::WorkDone;
    }
    CompletionMarker::None
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeratorResult {
    Pass,
    Fail(String),
}

/// Parse a moderator's PASS/FAIL result (spec §4.4).
pub fn parse_moderator_result(output: &str) -> ModeratorResult {
    if output.contains("PASS") {
        return ModeratorResult::Pass;
    }
    if let Some(captures) = FAIL_RE.captures(output) {
        return ModeratorResult::Fail(captures[1].trim().to_string());
    }
    ModeratorResult::Fail("Moderator validation unclear - no explicit PASS or FAIL in output".to_string())
}

/// Severity of a single audit violation (spec §3.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ViolationSeverity {
    Critical,
    Error,
    Warning,
    Info,
}

/// A single audit finding (spec §3.4): `{line, pattern_id, severity, message}`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AuditViolation {
    pub line: u32,
    pub pattern_id: String,
    pub severity: ViolationSeverity,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditStatus {
    Pass,
    Fail,
    Error,
}

/// Parse an audit worker's single-shot verdict (spec §8 scenarios 1-2),
/// grounded on `audit_utils/processing.py::parse_audit_output`: unlike the
/// iterative worker/moderator grammar above, the audit worker is single-shot
/// and its output is one of exact `PASS`, a `FAIL:` line (possibly buried in
/// an LLM preamble), or `ERROR:`. Anything else is a format violation,
/// reported as `AuditStatus::Error`.
pub fn parse_audit_output(output: &str) -> (AuditStatus, Vec<AuditViolation>) {
    let trimmed = output.trim();

    if trimmed == "PASS" {
        return (AuditStatus::Pass, Vec::new());
    }

    if trimmed.contains("FAIL:") {
        let fail_line = trimmed.lines().find(|line| line.starts_with("FAIL:"));
        let message = fail_line.unwrap_or(trimmed).to_string();
        return (
            AuditStatus::Fail,
            vec![AuditViolation {
                line: 0,
                pattern_id: "llm_audit".to_string(),
                severity: ViolationSeverity::Critical,
                message,
            }],
        );
    }

    if trimmed.contains("ERROR:") {
        return (
            AuditStatus::Error,
            vec![AuditViolation {
                line: 0,
                pattern_id: "audit_error".to_string(),
                severity: ViolationSeverity::Error,
                message: trimmed.to_string(),
            }],
        );
    }

    let first_line = trimmed.lines().next().unwrap_or("");
    let truncated: String = first_line.chars().take(200).collect();
    (
        AuditStatus::Error,
        vec![AuditViolation {
            line: 0,
            pattern_id: "audit_format_violation".to_string(),
            severity: ViolationSeverity::Error,
            message: format!(
                "Audit agent violated output format. Expected 'PASS' or 'FAIL: <reasons>', got: {truncated}"
            ),
        }],
    )
}

/// Strip one optional outer ```...``` code fence. Not recursive — only the
/// single outermost fence is removed, matching `validation_utils.py`.
pub fn parse_code_fence_output(output: &str) -> String {
    let trimmed = output.trim();
    if !trimmed.starts_with("```") {
        return output.to_string();
    }
    let Some(first_newline) = trimmed.find('\n') else {
        return output.to_string();
    };
    let rest = &trimmed[first_newline + 1..];
    let Some(closing) = rest.rfind("```") else {
        return output.to_string();
    };
    rest[..closing].trim().to_string()
}
