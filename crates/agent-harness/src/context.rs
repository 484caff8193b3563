//! Moderator context preparation (spec §4.10, §9, §11).
//!
//! Two independently-testable caps: a hard 100-message cap applied first,
//! then a binary-search token-budget truncation (100,000 GPT-4-tokenizer
//! tokens). Both are critical invariants per spec §8.

use tiktoken_rs::cl100k_base;

use crate::transcript::{Todo, TranscriptMessage};

pub const MAX_MODERATOR_MESSAGE_COUNT: usize = 100;
pub const MAX_MODERATOR_CONTEXT_TOKENS: usize = 100_000;

pub fn count_tokens(text: &str) -> usize {
    match cl100k_base() {
        Ok(bpe) => bpe.encode_with_special_tokens(text).len(),
        Err(_) => text.split_whitespace().count(),
    }
}

/// Format a window of messages the same way the moderator prompt expects:
/// `role: text` per line.
fn format_messages(messages: &[TranscriptMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.kind, m.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Hard-cap to the most recent `MAX_MODERATOR_MESSAGE_COUNT` messages, then
/// binary-search the window so the formatted text fits within
/// `MAX_MODERATOR_CONTEXT_TOKENS`.
pub fn prepare_moderator_context(messages: &[TranscriptMessage], todos: &[Todo]) -> String {
    let windowed: &[TranscriptMessage] = if messages.len() > MAX_MODERATOR_MESSAGE_COUNT {
        &messages[messages.len() - MAX_MODERATOR_MESSAGE_COUNT..]
    } else {
        messages
    };

    let fitted = fit_to_token_budget(windowed, MAX_MODERATOR_CONTEXT_TOKENS);

    let mut context = format_messages(fitted);
    if !todos.is_empty() {
        context.push_str("\n\n=== TODO LIST ===\n");
        context.push_str(&format_todo_section(todos));
    }
    context
}

fn format_todo_section(todos: &[Todo]) -> String {
    todos
        .iter()
        .map(|t| {
            let emoji = match t.status.as_str() {
                "completed" => "\u{2705}",
                "in_progress" => "\u{1F504}",
                _ => "\u{23F3}",
            };
            format!("{emoji} [{}] {}", t.status, t.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Binary-search the largest suffix of `messages` whose formatted text fits
/// within `max_tokens`.
fn fit_to_token_budget(messages: &[TranscriptMessage], max_tokens: usize) -> &[TranscriptMessage] {
    if messages.is_empty() {
        return messages;
    }
    if count_tokens(&format_messages(messages)) <= max_tokens {
        return messages;
    }

    let mut lo = 0usize;
    let mut hi = messages.len();
    // Invariant: a window of size `hi` fits is unknown; a window of size
    // `lo` is known to fit (0 trivially fits). Find the largest size that
    // fits, keeping the most recent messages (suffix).
    while lo < hi {
        let mid = lo + (hi - lo + 1) / 2;
        let candidate = &messages[messages.len() - mid..];
        if count_tokens(&format_messages(candidate)) <= max_tokens {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    &messages[messages.len() - lo..]
}
