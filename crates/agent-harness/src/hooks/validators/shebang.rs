//! Shebang validator (spec §4.8).
//!
//! Applies to Python file writes/edits. Rejects shebangs that invoke
//! `sudo`, an absolute system Python path, or a bare `python3` unless the
//! path also mentions the project's wrapper. Scans only the first 200
//! bytes of the proposed content.

use regex::Regex;
use std::sync::LazyLock;

use crate::hooks::decision::HookResult;
use crate::hooks::input::HookEvent;

const SCAN_WINDOW: usize = 200;
const WRAPPER_MARKER: &str = "ami-run";

static SHEBANG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#!(.*)$").unwrap());

pub struct ShebangValidator;

impl ShebangValidator {
    pub fn validate(&self, event: &HookEvent) -> HookResult {
        if !matches!(event.tool_name.as_deref(), Some("Write") | Some("Edit")) {
            return HookResult::allow();
        }
        let Some(tool_input) = &event.tool_input else {
            return HookResult::allow();
        };
        let path = tool_input
            .get("file_path")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        if !path.ends_with(".py") {
            return HookResult::allow();
        }
        let content = tool_input
            .get("content")
            .or_else(|| tool_input.get("new_string"))
            .and_then(|v| v.as_str())
            .unwrap_or("");

        let window: String = content.chars().take(SCAN_WINDOW).collect();
        let Some(first_line) = window.lines().next() else {
            return HookResult::allow();
        };
        let Some(captures) = SHEBANG_RE.captures(first_line) else {
            return HookResult::allow();
        };
        let shebang_body = captures[1].trim();

        let is_sudo = shebang_body.contains("sudo");
        let is_system_python = shebang_body.starts_with("/usr/bin/python")
            || shebang_body.starts_with("/usr/local/bin/python");
        let is_bare_python3 = shebang_body == "/usr/bin/env python3" || shebang_body == "python3";
        let mentions_wrapper = path.contains(WRAPPER_MARKER) || shebang_body.contains(WRAPPER_MARKER);

        if is_sudo {
            return HookResult::deny(format!(
                "Shebang invokes sudo, which is not permitted in committed Python files: {first_line}"
            ));
        }
        if is_system_python {
            return HookResult::deny(format!(
                "Shebang uses an absolute system Python path: {first_line}"
            ));
        }
        if is_bare_python3 && !mentions_wrapper {
            return HookResult::deny(format!(
                "Bare python3 shebang without the project wrapper: {first_line}"
            ));
        }

        HookResult::allow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::decision::Decision;
    use crate::hooks::input::HookEventName;
    use serde_json::json;

    fn event(path: &str, content: &str) -> HookEvent {
        HookEvent {
            session_id: None,
            hook_event_name: HookEventName::PreToolUse,
            tool_name: Some("Write".to_string()),
            tool_input: Some(json!({"file_path": path, "content": content})),
            transcript_path: None,
        }
    }

    #[test]
    fn non_python_file_is_allowed() {
        let validator = ShebangValidator;
        let result = validator.validate(&event("script.sh", "#!/usr/bin/sudo bash\n"));
        assert_eq!(result.decision, Decision::Allow);
    }

    #[test]
    fn sudo_shebang_is_denied() {
        let validator = ShebangValidator;
        let result = validator.validate(&event("script.py", "#!/usr/bin/sudo python3\nprint(1)\n"));
        assert_eq!(result.decision, Decision::Deny);
    }

    #[test]
    fn system_python_path_is_denied() {
        let validator = ShebangValidator;
        let result = validator.validate(&event("script.py", "#!/usr/bin/python3\nprint(1)\n"));
        assert_eq!(result.decision, Decision::Deny);
    }

    #[test]
    fn bare_python3_with_wrapper_mention_is_allowed() {
        let validator = ShebangValidator;
        let result = validator.validate(&event(
            "scripts/ami-run/script.py",
            "#!/usr/bin/env python3\nprint(1)\n",
        ));
        assert_eq!(result.decision, Decision::Allow);
    }

    #[test]
    fn no_shebang_is_allowed() {
        let validator = ShebangValidator;
        let result = validator.validate(&event("script.py", "print(1)\n"));
        assert_eq!(result.decision, Decision::Allow);
    }
}
