//! Sequential and bounded-parallel item execution (spec §4.6, §5).
//!
//! Parallel mode uses a small thread pool over a shared work channel, the
//! same `std::thread::spawn` + `std::sync::mpsc` idiom the agent driver uses
//! for its streaming reader (`driver::process`), rather than pulling in an
//! async runtime for what is fundamentally a bounded set of blocking,
//! independent child-process invocations. Each item runs its retry loop
//! entirely on one worker thread and never migrates (spec §5). Cancellation
//! is cooperative: the pool is joined at function return, and an in-flight
//! retry loop only notices a shutdown at its own next deadline check.

use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use crate::retry_loop::RetryLoopResult;

pub struct ItemOutcome {
    pub item_path: PathBuf,
    pub result: RetryLoopResult,
}

/// Run `process_item` once per item, in lexicographic order, on the calling
/// thread (spec §4.6 "Sequential mode").
pub fn run_sequential(
    items: Vec<PathBuf>,
    mut process_item: impl FnMut(&PathBuf) -> RetryLoopResult,
) -> Vec<ItemOutcome> {
    items
        .into_iter()
        .map(|item_path| {
            let result = process_item(&item_path);
            ItemOutcome { item_path, result }
        })
        .collect()
}

/// Run `process_item` across a bounded pool of `max_workers` threads
/// (`min(max_workers, 8)`, spec §5). Results are returned re-ordered to
/// match the original submission order regardless of completion order.
pub fn run_parallel(
    items: Vec<PathBuf>,
    max_workers: usize,
    process_item: impl Fn(&PathBuf) -> RetryLoopResult + Send + Sync + 'static,
) -> Vec<ItemOutcome> {
    let worker_count = max_workers.min(8).max(1).min(items.len().max(1));
    let total = items.len();
    if total == 0 {
        return Vec::new();
    }

    let indexed: Vec<(usize, PathBuf)> = items.into_iter().enumerate().collect();
    let queue = Arc::new(Mutex::new(indexed.into_iter()));
    let process_item = Arc::new(process_item);
    let (tx, rx) = mpsc::channel::<(usize, ItemOutcome)>();

    let mut handles = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        let queue = Arc::clone(&queue);
        let process_item = Arc::clone(&process_item);
        let tx = tx.clone();
        handles.push(std::thread::spawn(move || loop {
            let next = queue.lock().unwrap().next();
            let Some((index, item_path)) = next else {
                break;
            };
            let result = process_item(&item_path);
            if tx
                .send((
                    index,
                    ItemOutcome {
                        item_path,
                        result,
                    },
                ))
                .is_err()
            {
                break;
            }
        }));
    }
    drop(tx);

    let mut ordered: Vec<Option<ItemOutcome>> = (0..total).map(|_| None).collect();
    for (index, outcome) in rx {
        ordered[index] = Some(outcome);
    }

    for handle in handles {
        let _ = handle.join();
    }

    ordered.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry_loop::RetryStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn completed() -> RetryLoopResult {
        RetryLoopResult {
            status: RetryStatus::Completed,
            attempts: Vec::new(),
        }
    }

    #[test]
    fn sequential_preserves_input_order() {
        let items = vec![PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("c")];
        let outcomes = run_sequential(items.clone(), |_| completed());
        let paths: Vec<_> = outcomes.iter().map(|o| o.item_path.clone()).collect();
        assert_eq!(paths, items);
    }

    #[test]
    fn parallel_result_order_matches_submission_order() {
        let items: Vec<PathBuf> = (0..20).map(|i| PathBuf::from(format!("item-{i}"))).collect();
        let expected = items.clone();
        let outcomes = run_parallel(items, 4, |path| {
            // Vary processing time so completion order differs from submission order.
            let n: u64 = path
                .to_string_lossy()
                .chars()
                .filter(|c| c.is_ascii_digit())
                .collect::<String>()
                .parse()
                .unwrap_or(0);
            std::thread::sleep(std::time::Duration::from_micros((20 - n) * 200));
            completed()
        });
        let paths: Vec<_> = outcomes.iter().map(|o| o.item_path.clone()).collect();
        assert_eq!(paths, expected);
    }

    #[test]
    fn a_failing_item_does_not_abort_other_items() {
        let items: Vec<PathBuf> = (0..5).map(|i| PathBuf::from(format!("item-{i}"))).collect();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let outcomes = run_parallel(items, 3, move |path| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            if path.to_string_lossy().ends_with('2') {
                RetryLoopResult {
                    status: RetryStatus::Failed("boom".into()),
                    attempts: Vec::new(),
                }
            } else {
                completed()
            }
        });
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(outcomes.len(), 5);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let outcomes = run_parallel(Vec::new(), 4, |_| completed());
        assert!(outcomes.is_empty());
    }
}
