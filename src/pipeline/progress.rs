//! Progress tracking and metrics collection.
//!
//! Counters are plain atomics so executor tasks report completion with a
//! handful of relaxed increments; the operator-facing progress bar and the
//! periodic log reporter both read from the same counters.

use crate::pipeline::ItemOutcome;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::{Serialize, Serializer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::interval;

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Metrics for the pipeline.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Work items that completed all stages
    pub items_completed: AtomicU64,

    /// Work items that failed a stage
    pub items_failed: AtomicU64,

    /// Documents whose text was extracted and persisted
    pub documents_extracted: AtomicU64,

    /// Documents skipped after a document-level extraction failure
    pub documents_failed: AtomicU64,

    /// Total bytes downloaded from S3
    pub bytes_downloaded: AtomicU64,

    /// Start time
    start_time: Option<Instant>,
}

impl Metrics {
    /// Create new metrics.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            items_completed: AtomicU64::new(0),
            items_failed: AtomicU64::new(0),
            documents_extracted: AtomicU64::new(0),
            documents_failed: AtomicU64::new(0),
            bytes_downloaded: AtomicU64::new(0),
            start_time: Some(Instant::now()),
        })
    }

    /// Record a completed item.
    pub fn add_item_completed(&self) {
        self.items_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed item.
    pub fn add_item_failed(&self) {
        self.items_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record extracted documents.
    pub fn add_documents_extracted(&self, count: u64) {
        self.documents_extracted.fetch_add(count, Ordering::Relaxed);
    }

    /// Record failed documents.
    pub fn add_documents_failed(&self, count: u64) {
        self.documents_failed.fetch_add(count, Ordering::Relaxed);
    }

    /// Record downloaded bytes.
    pub fn add_bytes_downloaded(&self, bytes: u64) {
        self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Items that have reached a terminal stage so far.
    pub fn items_finished(&self) -> u64 {
        self.items_completed.load(Ordering::Relaxed) + self.items_failed.load(Ordering::Relaxed)
    }

    /// Get elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start_time.map_or(Duration::ZERO, |t| t.elapsed())
    }

    /// Get archives per second.
    pub fn items_per_second(&self) -> f64 {
        let items = self.items_finished();
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            items as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            items_completed: self.items_completed.load(Ordering::Relaxed),
            items_failed: self.items_failed.load(Ordering::Relaxed),
            documents_extracted: self.documents_extracted.load(Ordering::Relaxed),
            documents_failed: self.documents_failed.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            elapsed: self.elapsed(),
            items_per_second: self.items_per_second(),
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub items_completed: u64,
    pub items_failed: u64,
    pub documents_extracted: u64,
    pub documents_failed: u64,
    pub bytes_downloaded: u64,
    #[serde(serialize_with = "serialize_duration")]
    pub elapsed: Duration,
    pub items_per_second: f64,
}

impl MetricsSnapshot {
    /// Save metrics to a JSON file.
    pub fn save_to_file(&self, path: &str) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!("Metrics saved to {}", path);
        Ok(())
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Archives: {} completed, {} failed | Documents: {} extracted, {} failed | \
             Downloaded: {:.2} GB | Rate: {:.2} archives/s | Elapsed: {:.1}s",
            self.items_completed,
            self.items_failed,
            self.documents_extracted,
            self.documents_failed,
            self.bytes_downloaded as f64 / (1024.0 * 1024.0 * 1024.0),
            self.items_per_second,
            self.elapsed.as_secs_f64(),
        )
    }
}

/// Operator-facing progress: one completion event per work item.
///
/// Updates are a few relaxed atomic increments plus an `indicatif` tick, so
/// reporting never blocks an executor task for long.
pub struct ProgressReporter {
    metrics: Arc<Metrics>,
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a reporter for `total` work items.
    pub fn new(metrics: Arc<Metrics>, total: u64, enabled: bool) -> Self {
        let bar = if enabled {
            ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stderr_with_hz(4))
        } else {
            ProgressBar::hidden()
        };
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} [{elapsed_precise}] {bar:30} {pos}/{len} archives ({eta}) {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.enable_steady_tick(Duration::from_millis(250));

        Self { metrics, bar }
    }

    /// Record one item's terminal outcome. Called exactly once per item.
    pub fn item_done(&self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Completed {
                documents_extracted,
                documents_failed,
            } => {
                self.metrics.add_item_completed();
                self.metrics
                    .add_documents_extracted(*documents_extracted as u64);
                self.metrics.add_documents_failed(*documents_failed as u64);
            }
            ItemOutcome::Failed(_) => {
                self.metrics.add_item_failed();
            }
        }

        self.bar.inc(1);
        let failed = self.metrics.items_failed.load(Ordering::Relaxed);
        if failed > 0 {
            self.bar.set_message(format!("{} failed", failed));
        }
    }

    /// Finish the progress display.
    pub fn finish(&self) {
        self.bar.finish();
    }
}

/// Periodic metrics reporter: a snapshot line in the log every interval.
pub struct MetricsReporter {
    metrics: Arc<Metrics>,
    interval_secs: u64,
    total_items: u64,
}

impl MetricsReporter {
    /// Create a new metrics reporter.
    pub fn new(metrics: Arc<Metrics>, interval_secs: u64, total_items: u64) -> Self {
        Self {
            metrics,
            interval_secs,
            total_items,
        }
    }

    /// Start the periodic reporter.
    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) {
        let mut ticker = interval(Duration::from_secs(self.interval_secs));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let snapshot = self.metrics.snapshot();
                    let progress = if self.total_items > 0 {
                        self.metrics.items_finished() as f64 / self.total_items as f64 * 100.0
                    } else {
                        0.0
                    };

                    tracing::info!("[{:.1}%] {}", progress, snapshot);
                }
                _ = shutdown.recv() => {
                    let snapshot = self.metrics.snapshot();
                    tracing::info!("Final: {}", snapshot);
                    break;
                }
            }
        }
    }
}

/// Aggregate result of a full run.
#[derive(Debug)]
pub struct RunSummary {
    /// Items listed in the manifest
    pub total_items: usize,

    /// Items that completed every stage
    pub items_completed: usize,

    /// Items that failed a stage
    pub items_failed: usize,

    /// Documents extracted across all items
    pub documents_extracted: u64,

    /// Documents that failed extraction across all items
    pub documents_failed: u64,

    /// Wall-clock duration of the run
    pub elapsed: Duration,
}

impl RunSummary {
    /// Finalize a summary from the run's metrics.
    pub fn from_metrics(metrics: &Metrics, total_items: usize) -> Self {
        let snapshot = metrics.snapshot();
        Self {
            total_items,
            items_completed: snapshot.items_completed as usize,
            items_failed: snapshot.items_failed as usize,
            documents_extracted: snapshot.documents_extracted,
            documents_failed: snapshot.documents_failed,
            elapsed: snapshot.elapsed,
        }
    }

    /// Print the end-of-run summary block.
    pub fn print(&self) {
        println!("\n=== Run Summary ===");
        println!("Archives: {}", self.total_items);
        println!("Completed: {}", self.items_completed);
        println!("Failed: {}", self.items_failed);
        println!("Documents extracted: {}", self.documents_extracted);
        println!("Documents failed: {}", self.documents_failed);
        println!(
            "Total time: {:.1} minutes",
            self.elapsed.as_secs_f64() / 60.0
        );
        println!("===================\n");
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Completed: {}, Failed: {}, Total: {}, Documents: {} (+{} failed), Elapsed: {:.1}s",
            self.items_completed,
            self.items_failed,
            self.total_items,
            self.documents_extracted,
            self.documents_failed,
            self.elapsed.as_secs_f64(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ItemError;

    #[test]
    fn test_metrics_increment() {
        let metrics = Metrics::new();

        metrics.add_bytes_downloaded(1000);
        metrics.add_bytes_downloaded(500);

        assert_eq!(metrics.bytes_downloaded.load(Ordering::Relaxed), 1500);
    }

    #[test]
    fn test_metrics_snapshot() {
        let metrics = Metrics::new();

        metrics.add_item_completed();
        metrics.add_item_completed();
        metrics.add_item_failed();
        metrics.add_documents_extracted(20);
        metrics.add_documents_failed(3);

        let snapshot = metrics.snapshot();

        assert_eq!(snapshot.items_completed, 2);
        assert_eq!(snapshot.items_failed, 1);
        assert_eq!(snapshot.documents_extracted, 20);
        assert_eq!(snapshot.documents_failed, 3);
        assert_eq!(metrics.items_finished(), 3);
    }

    #[test]
    fn test_zero_elapsed_no_panic() {
        let metrics = Metrics {
            start_time: None,
            ..Default::default()
        };

        assert_eq!(metrics.items_per_second(), 0.0);
        assert_eq!(metrics.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_snapshot_display() {
        let snapshot = MetricsSnapshot {
            items_completed: 120,
            items_failed: 4,
            documents_extracted: 58_000,
            documents_failed: 17,
            bytes_downloaded: 1024 * 1024 * 1024,
            elapsed: Duration::from_secs(600),
            items_per_second: 0.2,
        };

        let display = format!("{}", snapshot);
        assert!(display.contains("120 completed"));
        assert!(display.contains("4 failed"));
        assert!(display.contains("58000 extracted"));
    }

    #[test]
    fn test_progress_reporter_counts_outcomes_once() {
        let metrics = Metrics::new();
        let reporter = ProgressReporter::new(metrics.clone(), 3, false);

        reporter.item_done(&ItemOutcome::Completed {
            documents_extracted: 5,
            documents_failed: 1,
        });
        reporter.item_done(&ItemOutcome::Completed {
            documents_extracted: 2,
            documents_failed: 0,
        });
        reporter.item_done(&ItemOutcome::Failed(ItemError::Download(anyhow::anyhow!(
            "timeout"
        ))));
        reporter.finish();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.items_completed, 2);
        assert_eq!(snapshot.items_failed, 1);
        assert_eq!(snapshot.documents_extracted, 7);
        assert_eq!(snapshot.documents_failed, 1);
        assert_eq!(metrics.items_finished(), 3);
    }

    #[test]
    fn test_run_summary_from_metrics() {
        let metrics = Metrics::new();
        metrics.add_item_completed();
        metrics.add_item_failed();
        metrics.add_documents_extracted(9);

        let summary = RunSummary::from_metrics(&metrics, 2);
        assert_eq!(summary.total_items, 2);
        assert_eq!(summary.items_completed, 1);
        assert_eq!(summary.items_failed, 1);
        assert_eq!(summary.documents_extracted, 9);
        // Every item reached exactly one terminal stage
        assert_eq!(
            summary.items_completed + summary.items_failed,
            summary.total_items
        );
    }

    #[test]
    fn test_run_summary_display() {
        let summary = RunSummary {
            total_items: 10,
            items_completed: 8,
            items_failed: 2,
            documents_extracted: 4000,
            documents_failed: 12,
            elapsed: Duration::from_secs(90),
        };

        let display = format!("{}", summary);
        assert!(display.contains("Completed: 8"));
        assert!(display.contains("Failed: 2"));
        assert!(display.contains("Total: 10"));
    }

    #[tokio::test]
    async fn test_metrics_reporter_shutdown() {
        let metrics = Metrics::new();
        let reporter = MetricsReporter::new(metrics, 3600, 10);

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let handle = tokio::spawn(reporter.run(shutdown_rx));

        shutdown_tx.send(()).await.unwrap();
        handle.await.unwrap();
    }
}
