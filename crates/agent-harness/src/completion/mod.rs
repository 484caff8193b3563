//! Completion-marker grammar (C4) and completion moderator (C8).

pub mod markers;
pub mod moderator;
