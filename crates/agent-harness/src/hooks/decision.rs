//! Hook decision (spec §3.7, §6.4).
//!
//! Internal decision values {allow, deny, block, none}; `none` serialises
//! as bare allow. Serialisation shape is event-dependent.

use serde_json::{json, Value};

use crate::hooks::input::HookEventName;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
    Block,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookResult {
    pub decision: Decision,
    pub reason: Option<String>,
    pub system_message: Option<String>,
}

impl HookResult {
    pub fn allow() -> Self {
        HookResult {
            decision: Decision::Allow,
            reason: None,
            system_message: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        HookResult {
            decision: Decision::Deny,
            reason: Some(reason.into()),
            system_message: None,
        }
    }

    pub fn deny_with_message(reason: impl Into<String>, system_message: impl Into<String>) -> Self {
        HookResult {
            decision: Decision::Deny,
            reason: Some(reason.into()),
            system_message: Some(system_message.into()),
        }
    }

    pub fn block(reason: impl Into<String>) -> Self {
        HookResult {
            decision: Decision::Block,
            reason: Some(reason.into()),
            system_message: None,
        }
    }

    pub fn with_system_message(mut self, message: impl Into<String>) -> Self {
        self.system_message = Some(message.into());
        self
    }

    /// Serialise this result for the given event type (spec §6.4).
    pub fn to_json(&self, event: HookEventName) -> Value {
        match event {
            HookEventName::PreToolUse => self.to_json_pre_tool_use(),
            HookEventName::Stop | HookEventName::SubagentStop => self.to_json_stop_event(),
        }
    }

    fn to_json_pre_tool_use(&self) -> Value {
        let permission_decision = match self.decision {
            Decision::Allow | Decision::None => "allow",
            Decision::Deny | Decision::Block => "deny",
        };
        let mut hook_specific = json!({
            "hookEventName": "PreToolUse",
            "permissionDecision": permission_decision,
        });
        if let Some(reason) = &self.reason {
            hook_specific["permissionDecisionReason"] = json!(reason);
        }
        let mut body = json!({ "hookSpecificOutput": hook_specific });
        if let Some(message) = &self.system_message {
            body["systemMessage"] = json!(message);
        }
        body
    }

    fn to_json_stop_event(&self) -> Value {
        let decision = match self.decision {
            Decision::Allow | Decision::None => "approve",
            Decision::Deny | Decision::Block => "block",
        };
        let mut body = json!({ "decision": decision });
        if let Some(reason) = &self.reason {
            body["reason"] = json!(reason);
        }
        if let Some(message) = &self.system_message {
            body["systemMessage"] = json!(message);
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_round_trips_pre_tool_use() {
        let result = HookResult::allow();
        let json = result.to_json(HookEventName::PreToolUse);
        assert_eq!(json["hookSpecificOutput"]["permissionDecision"], "allow");
    }

    #[test]
    fn deny_round_trips_pre_tool_use_with_reason() {
        let result = HookResult::deny("bad command");
        let json = result.to_json(HookEventName::PreToolUse);
        assert_eq!(json["hookSpecificOutput"]["permissionDecision"], "deny");
        assert_eq!(
            json["hookSpecificOutput"]["permissionDecisionReason"],
            "bad command"
        );
    }

    #[test]
    fn allow_maps_to_approve_for_stop_events() {
        let result = HookResult::allow();
        let json = result.to_json(HookEventName::Stop);
        assert_eq!(json["decision"], "approve");
    }

    #[test]
    fn block_stays_block_for_stop_events() {
        let result = HookResult::block("incomplete");
        let json = result.to_json(HookEventName::SubagentStop);
        assert_eq!(json["decision"], "block");
        assert_eq!(json["reason"], "incomplete");
    }

    #[test]
    fn system_message_is_carried_through() {
        let result = HookResult::deny("bad").with_system_message("nope");
        let json = result.to_json(HookEventName::PreToolUse);
        assert_eq!(json["systemMessage"], "nope");
    }
}
