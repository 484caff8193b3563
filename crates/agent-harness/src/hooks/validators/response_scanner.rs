//! Response scanner (spec §4.9).
//!
//! The Stop/SubagentStop front-end. Applies a sequence of cheap early-allow
//! checks before ever invoking the completion moderator: missing/empty
//! transcript, a greeting-only exchange, and an API-limit notice all allow
//! without moderation; a prohibited phrase blocks outright; a missing
//! completion marker blocks without moderation. Only a well-formed
//! completion marker with no early-exit condition reaches the moderator.

use regex::Regex;
use std::path::PathBuf;

use crate::hooks::decision::HookResult;
use crate::hooks::input::HookEvent;
use crate::patterns::{load_api_limit_patterns, load_greeting_patterns, load_prohibited_phrases};
use crate::transcript::{last_assistant_text, read_transcript};

pub struct ResponseScanner {
    greeting_patterns: Vec<String>,
    api_limit_patterns: Vec<String>,
    prohibited_phrases: Vec<String>,
}

/// Outcome of the early-allow checks, shared with the completion moderator
/// call site so it knows whether to proceed (spec §11).
pub enum EarlyOutcome {
    Decided(HookResult),
    Proceed { assistant_text: String },
}

impl ResponseScanner {
    pub fn new(greeting_path: PathBuf, api_limit_path: PathBuf, prohibited_path: PathBuf) -> Self {
        ResponseScanner {
            greeting_patterns: load_greeting_patterns(&greeting_path),
            api_limit_patterns: load_api_limit_patterns(&api_limit_path),
            prohibited_phrases: load_prohibited_phrases(&prohibited_path),
        }
    }

    fn matches_any(patterns: &[String], text: &str) -> bool {
        patterns.iter().any(|p| {
            Regex::new(p)
                .map(|re| re.is_match(text))
                .unwrap_or(false)
        })
    }

    /// Run every early-allow/early-block check in order; returns either a
    /// final decision or the assistant text the caller should hand to the
    /// completion moderator.
    pub fn check_early_allow_conditions(&self, event: &HookEvent) -> EarlyOutcome {
        if !event.has_usable_transcript() {
            return EarlyOutcome::Decided(HookResult::allow());
        }
        let transcript_path = event.transcript_path.as_ref().unwrap();
        let messages = read_transcript(transcript_path);
        let Some(text) = last_assistant_text(&messages) else {
            return EarlyOutcome::Decided(HookResult::allow());
        };
        if text.trim().is_empty() {
            return EarlyOutcome::Decided(HookResult::allow());
        }
        if Self::matches_any(&self.greeting_patterns, &text) {
            return EarlyOutcome::Decided(HookResult::allow());
        }
        if Self::matches_any(&self.api_limit_patterns, &text) {
            return EarlyOutcome::Decided(HookResult::allow());
        }
        if Self::matches_any(&self.prohibited_phrases, &text) {
            return EarlyOutcome::Decided(HookResult::block(
                "Response contains a prohibited phrase and was blocked without further moderation.",
            ));
        }

        use crate::completion::markers::{parse_completion_marker, CompletionMarker};
        match parse_completion_marker(&text) {
            CompletionMarker::None => EarlyOutcome::Decided(HookResult::block(
                "COMPLETION MARKER REQUIRED: response must end with WORK DONE or FEEDBACK: <reason>",
            )),
            CompletionMarker::WorkDone | CompletionMarker::Feedback(_) => {
                EarlyOutcome::Proceed { assistant_text: text }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::decision::Decision;
    use crate::hooks::input::HookEventName;
    use std::io::Write;

    fn scanner_with_patterns(greetings: &str, api_limits: &str, prohibited: &str) -> ResponseScanner {
        let mut g = tempfile::NamedTempFile::new().unwrap();
        write!(g, "{greetings}").unwrap();
        let mut a = tempfile::NamedTempFile::new().unwrap();
        write!(a, "{api_limits}").unwrap();
        let mut p = tempfile::NamedTempFile::new().unwrap();
        write!(p, "{prohibited}").unwrap();
        let scanner = ResponseScanner::new(
            g.path().to_path_buf(),
            a.path().to_path_buf(),
            p.path().to_path_buf(),
        );
        // keep temp files alive until scanner is built (already loaded into memory)
        drop((g, a, p));
        scanner
    }

    fn event_with_transcript(content: &str) -> (HookEvent, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.jsonl");
        std::fs::write(&path, content).unwrap();
        let event = HookEvent {
            session_id: Some("s1".into()),
            hook_event_name: HookEventName::Stop,
            tool_name: None,
            tool_input: None,
            transcript_path: Some(path),
        };
        (event, dir)
    }

    #[test]
    fn no_transcript_allows() {
        let scanner = scanner_with_patterns("[]", "[]", "[]");
        let event = HookEvent {
            session_id: None,
            hook_event_name: HookEventName::Stop,
            tool_name: None,
            tool_input: None,
            transcript_path: None,
        };
        match scanner.check_early_allow_conditions(&event) {
            EarlyOutcome::Decided(r) => assert_eq!(r.decision, Decision::Allow),
            _ => panic!("expected decided allow"),
        }
    }

    #[test]
    fn greeting_only_is_allowed() {
        let scanner = scanner_with_patterns("- \"^(hi|hello)\\\\b\"", "[]", "[]");
        let (event, _dir) = event_with_transcript(
            "{\"type\":\"assistant\",\"message\":{\"content\":[{\"type\":\"text\",\"text\":\"hello there!\"}]}}\n",
        );
        match scanner.check_early_allow_conditions(&event) {
            EarlyOutcome::Decided(r) => assert_eq!(r.decision, Decision::Allow),
            _ => panic!("expected decided allow"),
        }
    }

    #[test]
    fn prohibited_phrase_blocks() {
        let scanner = scanner_with_patterns("[]", "[]", "- \"let me lie to you\"");
        let (event, _dir) = event_with_transcript(
            "{\"type\":\"assistant\",\"message\":{\"content\":[{\"type\":\"text\",\"text\":\"let me lie to you about this\"}]}}\n",
        );
        match scanner.check_early_allow_conditions(&event) {
            EarlyOutcome::Decided(r) => assert_eq!(r.decision, Decision::Block),
            _ => panic!("expected decided block"),
        }
    }

    #[test]
    fn missing_marker_blocks_without_moderation() {
        let scanner = scanner_with_patterns("[]", "[]", "[]");
        let (event, _dir) = event_with_transcript(
            "{\"type\":\"assistant\",\"message\":{\"content\":[{\"type\":\"text\",\"text\":\"still working on it\"}]}}\n",
        );
        match scanner.check_early_allow_conditions(&event) {
            EarlyOutcome::Decided(r) => {
                assert_eq!(r.decision, Decision::Block);
                assert!(r.reason.unwrap().contains("COMPLETION MARKER"));
            }
            _ => panic!("expected decided block"),
        }
    }

    #[test]
    fn work_done_marker_proceeds_to_moderation() {
        let scanner = scanner_with_patterns("[]", "[]", "[]");
        let (event, _dir) = event_with_transcript(
            "{\"type\":\"assistant\",\"message\":{\"content\":[{\"type\":\"text\",\"text\":\"all changes applied. WORK DONE\"}]}}\n",
        );
        match scanner.check_early_allow_conditions(&event) {
            EarlyOutcome::Proceed { assistant_text } => assert!(assistant_text.contains("WORK DONE")),
            _ => panic!("expected proceed"),
        }
    }
}
