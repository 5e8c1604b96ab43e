//! Batched scheduling of work items.
//!
//! The scheduler slices the manifest's key list into fixed-size batches and
//! runs one task per key within a batch, then blocks until every unit in
//! the batch has terminated before releasing the next. Concurrency is
//! capped at the batch size; a slow item delays the start of the next
//! batch. The barrier keeps connections, file descriptors and scratch disk
//! flat for the whole run.

use crate::pipeline::{ItemError, ItemOutcome, ProgressReporter, StageExecutor, WorkItem};
use std::sync::Arc;

/// Partition keys into ordered batches of at most `batch_size`.
///
/// Covers the list exactly once, preserving order within and across
/// batches; only the last batch may be short.
pub fn batches(keys: &[String], batch_size: usize) -> impl Iterator<Item = &[String]> {
    keys.chunks(batch_size.max(1))
}

/// Scheduler driving work items through the stage executor in batches.
pub struct BatchScheduler {
    /// Stage executor shared by all units
    executor: Arc<StageExecutor>,

    /// Progress reporter receiving one event per terminal item
    reporter: Arc<ProgressReporter>,

    /// Maximum concurrent work items
    batch_size: usize,
}

impl BatchScheduler {
    /// Create a new scheduler.
    pub fn new(
        executor: Arc<StageExecutor>,
        reporter: Arc<ProgressReporter>,
        batch_size: usize,
    ) -> Self {
        Self {
            executor,
            reporter,
            batch_size: batch_size.max(1),
        }
    }

    /// Run every key to a terminal outcome.
    pub async fn run(&self, keys: Vec<String>) -> SchedulerStats {
        let total_items = keys.len();
        let num_batches = total_items.div_ceil(self.batch_size);

        tracing::info!(
            "Scheduling {} archives in {} batches of up to {}",
            total_items,
            num_batches,
            self.batch_size
        );

        let mut stats = SchedulerStats {
            total_items,
            ..Default::default()
        };

        for (batch_idx, batch) in batches(&keys, self.batch_size).enumerate() {
            tracing::debug!(
                "Starting batch {}/{} ({} items)",
                batch_idx + 1,
                num_batches,
                batch.len()
            );

            let mut handles = Vec::with_capacity(batch.len());
            for key in batch {
                let executor = self.executor.clone();
                let reporter = self.reporter.clone();
                let item = WorkItem::new(key.clone());

                handles.push(tokio::spawn(async move {
                    let outcome = executor.run(item).await;
                    // Report at the terminal stage, not at the batch join:
                    // the operator sees completions as they happen
                    reporter.item_done(&outcome);
                    outcome.is_completed()
                }));
            }

            // Barrier: every unit in this batch terminates before the next
            // batch starts
            for handle in handles {
                match handle.await {
                    Ok(true) => stats.items_completed += 1,
                    Ok(false) => stats.items_failed += 1,
                    Err(e) => {
                        // A panicked unit is a failed item, nothing more;
                        // the batch and the run continue
                        tracing::error!("Work item task panicked: {}", e);
                        self.reporter.item_done(&ItemOutcome::Failed(ItemError::Aborted(
                            anyhow::anyhow!("{}", e),
                        )));
                        stats.items_failed += 1;
                    }
                }
            }
        }

        stats
    }
}

/// Statistics from a scheduler run.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    /// Total items attempted
    pub total_items: usize,

    /// Items that completed all stages
    pub items_completed: usize,

    /// Items that failed a stage
    pub items_failed: usize,
}

impl std::fmt::Display for SchedulerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Completed: {}, Failed: {}, Total: {}",
            self.items_completed, self.items_failed, self.total_items
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("pdf/arXiv_pdf_{:04}.tar", i)).collect()
    }

    #[test]
    fn test_batches_ceiling_count() {
        // ⌈N/B⌉ batches for all N, B combinations
        for (n, b, expected) in [(0, 2, 0), (1, 2, 1), (4, 2, 2), (5, 2, 3), (16, 16, 1), (17, 16, 2)] {
            let keys = keys(n);
            assert_eq!(batches(&keys, b).count(), expected, "n={} b={}", n, b);
        }
    }

    #[test]
    fn test_batches_sizes_bounded() {
        let keys = keys(10);
        for batch in batches(&keys, 4) {
            assert!(batch.len() <= 4);
            assert!(!batch.is_empty());
        }
    }

    #[test]
    fn test_batches_cover_exactly_once_in_order() {
        let keys = keys(11);
        let flattened: Vec<&String> = batches(&keys, 3).flatten().collect();
        assert_eq!(flattened.len(), keys.len());
        for (original, batched) in keys.iter().zip(flattened) {
            assert_eq!(original, batched);
        }
    }

    #[test]
    fn test_batches_zero_size_clamped() {
        let keys = keys(3);
        // A zero batch size degrades to one item at a time, not a panic
        assert_eq!(batches(&keys, 0).count(), 3);
    }

    #[test]
    fn test_scheduler_stats_display() {
        let stats = SchedulerStats {
            total_items: 100,
            items_completed: 93,
            items_failed: 7,
        };

        let display = format!("{}", stats);
        assert!(display.contains("93"));
        assert!(display.contains("7"));
        assert!(display.contains("100"));
    }
}
