//! Retry loop engine (C6, spec §4.4).
//!
//! Runs one work item: worker attempt → parse completion marker → optional
//! moderator validation → retry with rebuilt feedback context, until the
//! item completes, reports feedback, times out, or fails. The retry context
//! is rebuilt fresh every iteration; the worker never sees a growing
//! history (spec §4.4, "worker never sees a growing history").

use std::time::Instant;

use crate::completion::markers::{parse_completion_marker, CompletionMarker};
use crate::driver::ExecutionMetadata;
use crate::error::HarnessResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryStatus {
    Completed,
    Feedback(String),
    Timeout,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub attempt_n: u32,
    pub worker_metadata: ExecutionMetadata,
    pub moderator_metadata: Option<ExecutionMetadata>,
}

#[derive(Debug, Clone)]
pub struct RetryLoopResult {
    pub status: RetryStatus,
    pub attempts: Vec<AttemptRecord>,
}

/// Run the retry loop for a single work item.
///
/// `execute_attempt(attempt_n, extra_context) -> (output, worker_metadata)`
/// and `validate_with_moderator(item_name, output, attempt_n) -> (passed,
/// reason, moderator_metadata)` mirror the source's callback contract
/// (spec §4.4); the latter is only invoked when `moderator_enabled` and the
/// worker claimed `WORK DONE`.
pub fn run_retry_loop(
    item_name: &str,
    timeout_seconds: f64,
    moderator_enabled: bool,
    mut execute_attempt: impl FnMut(u32, &str) -> HarnessResult<(String, ExecutionMetadata)>,
    mut validate_with_moderator: impl FnMut(&str, &str, u32) -> HarnessResult<(bool, String, ExecutionMetadata)>,
) -> RetryLoopResult {
    let start = Instant::now();
    let mut attempt_n: u32 = 0;
    let mut extra = String::new();
    let mut attempts = Vec::new();

    loop {
        if start.elapsed().as_secs_f64() >= timeout_seconds {
            return RetryLoopResult {
                status: RetryStatus::Timeout,
                attempts,
            };
        }

        attempt_n += 1;
        let (output, worker_metadata) = match execute_attempt(attempt_n, &extra) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(item_name, attempt_n, error = %e, "retry loop attempt failed");
                return RetryLoopResult {
                    status: RetryStatus::Failed(e.to_string()),
                    attempts,
                };
            }
        };

        match parse_completion_marker(&output) {
            CompletionMarker::Feedback(content) => {
                attempts.push(AttemptRecord {
                    attempt_n,
                    worker_metadata,
                    moderator_metadata: None,
                });
                return RetryLoopResult {
                    status: RetryStatus::Feedback(content),
                    attempts,
                };
            }
            CompletionMarker::WorkDone if !moderator_enabled => {
                attempts.push(AttemptRecord {
                    attempt_n,
                    worker_metadata,
                    moderator_metadata: None,
                });
                return RetryLoopResult {
                    status: RetryStatus::Completed,
                    attempts,
                };
            }
            CompletionMarker::WorkDone => {
                match validate_with_moderator(item_name, &output, attempt_n) {
                    Ok((true, _reason, moderator_metadata)) => {
                        attempts.push(AttemptRecord {
                            attempt_n,
                            worker_metadata,
                            moderator_metadata: Some(moderator_metadata),
                        });
                        return RetryLoopResult {
                            status: RetryStatus::Completed,
                            attempts,
                        };
                    }
                    Ok((false, reason, moderator_metadata)) => {
                        attempts.push(AttemptRecord {
                            attempt_n,
                            worker_metadata,
                            moderator_metadata: Some(moderator_metadata),
                        });
                        extra = format!("PREVIOUS ATTEMPT FAILED VALIDATION: {reason}");
                    }
                    Err(e) => {
                        attempts.push(AttemptRecord {
                            attempt_n,
                            worker_metadata,
                            moderator_metadata: None,
                        });
                        return RetryLoopResult {
                            status: RetryStatus::Failed(e.to_string()),
                            attempts,
                        };
                    }
                }
            }
            CompletionMarker::None => {
                attempts.push(AttemptRecord {
                    attempt_n,
                    worker_metadata,
                    moderator_metadata: None,
                });
                extra = "MUST OUTPUT 'WORK DONE' OR 'FEEDBACK: <reason>'".to_string();
            }
        }
    }
}

/// Log an aggregated cost/duration/turn summary across all attempts, only
/// when the total is non-zero (spec §11, `display_execution_metadata`).
pub fn log_execution_metadata(item_name: &str, attempts: &[AttemptRecord]) {
    let mut total_cost = 0.0;
    let mut total_duration_ms = 0.0;
    let mut total_api_ms = 0.0;
    let mut total_turns = 0u64;

    for attempt in attempts {
        total_cost += attempt.worker_metadata.cost_usd.unwrap_or(0.0);
        total_duration_ms += attempt.worker_metadata.duration_ms.unwrap_or(0.0);
        total_api_ms += attempt.worker_metadata.duration_api_ms.unwrap_or(0.0);
        total_turns += attempt.worker_metadata.num_turns.unwrap_or(0);
        if let Some(moderator_metadata) = &attempt.moderator_metadata {
            total_cost += moderator_metadata.cost_usd.unwrap_or(0.0);
            total_duration_ms += moderator_metadata.duration_ms.unwrap_or(0.0);
            total_api_ms += moderator_metadata.duration_api_ms.unwrap_or(0.0);
            total_turns += moderator_metadata.num_turns.unwrap_or(0);
        }
    }

    if total_cost == 0.0 && total_duration_ms == 0.0 && total_api_ms == 0.0 && total_turns == 0 {
        return;
    }

    tracing::info!(
        item_name,
        attempts = attempts.len(),
        cost_usd = total_cost,
        duration_ms = total_duration_ms,
        duration_api_ms = total_api_ms,
        turns = total_turns,
        "retry loop execution metadata"
    );
}
