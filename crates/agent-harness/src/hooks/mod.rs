//! Hook input/output plumbing (C4), the moderator-with-retry controller
//! (C5), the per-check validators, and the process-wide dispatcher (§4.3).

pub mod decision;
pub mod dispatcher;
pub mod input;
pub mod moderator;
pub mod validators;
