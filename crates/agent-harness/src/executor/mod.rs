//! Executors (C7, spec §4.6/§4.7): discovery, sequential/parallel execution,
//! reports, consolidation, the task-specific extensions, and the three
//! concrete CLI modes (`--audit`, `--tasks`, `--docs`) built from them.

pub mod audit;
pub mod consolidate;
pub mod discover;
pub mod docs;
pub mod lock;
pub mod report;
pub mod run;
pub mod tasks;
