//! Stream parser (C3).
//!
//! Interprets one line of agent CLI stdout and reduces it to a uniform
//! (text, metadata) pair. Never raises on malformed input — worst case the
//! raw line is returned as text (spec §4.2).

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    /// Extracted text content, or empty string for pure-metadata lines.
    pub text: String,
    /// Parsed JSON metadata, when the line was a recognised JSON event.
    pub metadata: Option<Value>,
}

impl ParsedLine {
    fn text_only(text: impl Into<String>) -> Self {
        ParsedLine {
            text: text.into(),
            metadata: None,
        }
    }

    fn metadata_only(metadata: Value) -> Self {
        ParsedLine {
            text: String::new(),
            metadata: Some(metadata),
        }
    }
}

/// Parse one line of stdout into text + metadata.
///
/// Classification order:
/// 1. non-JSON line -> raw text;
/// 2. JSON with `type: "assistant"` and textual content -> assistant text chunk;
/// 3. JSON with `type` of `"system"` or `"result"` -> empty text + metadata;
/// 4. JSON with `type: "content_block_delta"` -> `delta.text`;
/// 5. any other recognised JSON -> its serialised form as text.
pub fn parse_line(line: &str) -> ParsedLine {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ParsedLine::text_only("");
    }

    let value: Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(_) => return ParsedLine::text_only(line),
    };

    let event_type = value.get("type").and_then(|t| t.as_str()).unwrap_or("");

    match event_type {
        "assistant" => {
            let text = extract_assistant_text(&value);
            ParsedLine {
                text,
                metadata: Some(value),
            }
        }
        "system" | "result" => ParsedLine::metadata_only(value),
        "content_block_delta" => {
            let text = value
                .get("delta")
                .and_then(|d| d.get("text"))
                .and_then(|t| t.as_str())
                .unwrap_or("")
                .to_string();
            ParsedLine {
                text,
                metadata: Some(value),
            }
        }
        "" => ParsedLine::text_only(value.to_string()),
        _ => ParsedLine::text_only(value.to_string()),
    }
}

fn extract_assistant_text(value: &Value) -> String {
    let Some(content) = value
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_array())
    else {
        return String::new();
    };

    content
        .iter()
        .filter(|block| block.get("type").and_then(|t| t.as_str()) == Some("text"))
        .filter_map(|block| block.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join("")
}
