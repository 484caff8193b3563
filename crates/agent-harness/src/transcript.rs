//! Transcript reading (spec §6.3).
//!
//! JSONL input, never written by this process. Malformed lines are skipped
//! silently with a warning.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
    pub raw: Value,
}

/// Read a transcript file line by line, returning every parseable `user`
/// and `assistant` event.
pub fn read_transcript(path: &Path) -> Vec<TranscriptMessage> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    read_transcript_str(&content)
}

pub fn read_transcript_str(content: &str) -> Vec<TranscriptMessage> {
    let mut messages = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let value: Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "skipping malformed transcript line");
                continue;
            }
        };
        let kind = value.get("type").and_then(Value::as_str).unwrap_or("");
        if kind != "user" && kind != "assistant" {
            continue;
        }
        let text = extract_text(&value);
        messages.push(TranscriptMessage {
            kind: kind.to_string(),
            text,
            raw: value,
        });
    }
    messages
}

fn extract_text(value: &Value) -> String {
    let Some(content) = value
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_array())
    else {
        return String::new();
    };
    content
        .iter()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("")
}

/// Extract the last assistant message's text (spec §4.9 step 2).
pub fn last_assistant_text(messages: &[TranscriptMessage]) -> Option<String> {
    messages
        .iter()
        .rev()
        .find(|m| m.kind == "assistant")
        .map(|m| m.text.clone())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Todo {
    pub content: String,
    pub status: String,
    #[serde(rename = "activeForm", default)]
    pub active_form: String,
}

/// Load the session todo list, fail-open: missing or malformed files yield
/// an empty list rather than an error (spec §11 / `workflows/core.py`).
pub fn load_session_todos(session_id: &str) -> Vec<Todo> {
    let Some(home) = dirs_home() else {
        return Vec::new();
    };
    let path = home
        .join(".claude")
        .join("todos")
        .join(format!("{session_id}-agent-{session_id}.json"));
    let Ok(content) = std::fs::read_to_string(&path) else {
        return Vec::new();
    };
    serde_json::from_str(&content).unwrap_or_default()
}

fn dirs_home() -> Option<std::path::PathBuf> {
    std::env::var_os("HOME").map(std::path::PathBuf::from)
}

pub fn incomplete_todos(todos: &[Todo]) -> Vec<&Todo> {
    todos
        .iter()
        .filter(|t| t.status == "pending" || t.status == "in_progress")
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_last_assistant_text() {
        let content = r#"
{"type":"user","message":{"content":[{"type":"text","text":"hi"}]}}
{"type":"assistant","message":{"content":[{"type":"text","text":"first"}]}}
{"type":"assistant","message":{"content":[{"type":"text","text":"WORK DONE"}]}}
"#;
        let messages = read_transcript_str(content);
        assert_eq!(last_assistant_text(&messages).as_deref(), Some("WORK DONE"));
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let content = "{not json}\n{\"type\":\"assistant\",\"message\":{\"content\":[{\"type\":\"text\",\"text\":\"ok\"}]}}\n";
        let messages = read_transcript_str(content);
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn empty_transcript_yields_no_last_message() {
        let messages = read_transcript_str("");
        assert!(last_assistant_text(&messages).is_none());
    }

    #[test]
    fn incomplete_todos_filters_pending_and_in_progress() {
        let todos = vec![
            Todo {
                content: "a".into(),
                status: "completed".into(),
                active_form: String::new(),
            },
            Todo {
                content: "b".into(),
                status: "pending".into(),
                active_form: String::new(),
            },
            Todo {
                content: "c".into(),
                status: "in_progress".into(),
                active_form: String::new(),
            },
        ];
        assert_eq!(incomplete_todos(&todos).len(), 2);
    }
}
