//! Command validator (spec §4.8).
//!
//! Applies deny regex patterns loaded from YAML, only to the `command`
//! field of `tool_input` — never to description/metadata, since only
//! `command` is ever executed by the Bash tool.

use regex::Regex;

use crate::hooks::decision::HookResult;
use crate::hooks::input::HookEvent;
use crate::patterns::DenyPattern;

pub struct CommandValidator {
    deny_patterns: Vec<DenyPattern>,
}

impl CommandValidator {
    pub fn new(deny_patterns: Vec<DenyPattern>) -> Self {
        CommandValidator { deny_patterns }
    }

    pub fn validate(&self, event: &HookEvent) -> HookResult {
        if event.tool_name.as_deref() != Some("Bash") {
            return HookResult::allow();
        }
        let Some(tool_input) = &event.tool_input else {
            return HookResult::allow();
        };
        let command = tool_input
            .get("command")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        for deny in &self.deny_patterns {
            let Ok(re) = Regex::new(&deny.pattern) else {
                continue;
            };
            if re.is_match(command) {
                return HookResult::deny(format!(
                    "\u{1F6A8} QUALITY VIOLATION - ADDITIONAL TOKENS INCURRED FOR MODERATION\n\n\
                     Hook: PreToolUse (Bash)\n\
                     Validator: CommandValidator\n\n\
                     {}\n\
                     Pattern: {}",
                    deny.message, deny.pattern
                ));
            }
        }
        HookResult::allow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::input::HookEventName;
    use serde_json::json;

    fn event(tool_name: &str, tool_input: Option<serde_json::Value>) -> HookEvent {
        HookEvent {
            session_id: Some("s1".into()),
            hook_event_name: HookEventName::PreToolUse,
            tool_name: Some(tool_name.to_string()),
            tool_input,
            transcript_path: None,
        }
    }

    #[test]
    fn non_bash_tool_is_allowed() {
        let validator = CommandValidator::new(vec![DenyPattern {
            pattern: "rm -rf".into(),
            message: "destructive".into(),
        }]);
        let result = validator.validate(&event("Write", Some(json!({"command": "rm -rf /"}))));
        assert_eq!(result.decision, crate::hooks::decision::Decision::Allow);
    }

    #[test]
    fn missing_tool_input_is_allowed() {
        let validator = CommandValidator::new(vec![]);
        let result = validator.validate(&event("Bash", None));
        assert_eq!(result.decision, crate::hooks::decision::Decision::Allow);
    }

    #[test]
    fn matching_pattern_denies() {
        let validator = CommandValidator::new(vec![DenyPattern {
            pattern: "rm -rf".into(),
            message: "destructive command".into(),
        }]);
        let result = validator.validate(&event("Bash", Some(json!({"command": "rm -rf /tmp"}))));
        assert_eq!(result.decision, crate::hooks::decision::Decision::Deny);
        assert!(result.reason.unwrap().contains("destructive command"));
    }

    #[test]
    fn only_command_field_is_checked_not_description() {
        let validator = CommandValidator::new(vec![DenyPattern {
            pattern: "rm -rf".into(),
            message: "destructive".into(),
        }]);
        let result = validator.validate(&event(
            "Bash",
            Some(json!({"command": "ls", "description": "rm -rf is dangerous"})),
        ));
        assert_eq!(result.decision, crate::hooks::decision::Decision::Allow);
    }

    #[test]
    fn first_matching_pattern_wins() {
        let validator = CommandValidator::new(vec![
            DenyPattern {
                pattern: "rm".into(),
                message: "first".into(),
            },
            DenyPattern {
                pattern: "rm -rf".into(),
                message: "second".into(),
            },
        ]);
        let result = validator.validate(&event("Bash", Some(json!({"command": "rm -rf /"}))));
        assert!(result.reason.unwrap().contains("first"));
    }
}
