//! arXiv PDF-to-text pipeline
//!
//! Downloads the arXiv bulk-data tar archives from S3, extracts the text of
//! every PDF they contain, and persists one text file per document.
//!
//! # Architecture
//!
//! The pipeline consists of:
//!
//! - **Manifest**: the bucket's listing of every tar archive
//! - **I/O**: S3 client construction and streamed archive downloads
//! - **Extract**: tar unpacking and per-document text extraction
//! - **Pipeline**: batched concurrent stage execution with progress metrics
//!
//! # Usage
//!
//! ```no_run
//! use arxiv_text::{run_pipeline, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     run_pipeline(config).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod extract;
pub mod io;
pub mod manifest;
pub mod pipeline;

pub use config::Config;
pub use manifest::Manifest;
pub use pipeline::{BatchScheduler, Metrics, ProgressReporter, RunSummary, StageExecutor};

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Run the full pipeline with the given configuration.
///
/// Returns the run summary on any full traversal of the manifest; item and
/// document failures are recorded in the summary, not escalated. The only
/// errors returned here are fatal ones: invalid configuration, a store that
/// cannot be built, or a manifest that cannot be retrieved or parsed.
pub async fn run_pipeline(config: Config) -> Result<RunSummary> {
    config.validate()?;
    let config = Arc::new(config);

    tracing::info!("Starting arXiv text extraction pipeline");

    let store = io::create_archive_store(&config.storage)?;

    // No manifest, no work: failure here aborts the run
    let manifest = Manifest::fetch(store.clone(), &config.storage.manifest_key).await?;
    let total = manifest.total();
    let batch_size = config.processing.effective_batch_size();

    println!(
        "Converting {} arXiv PDF archives to text, {} at a time.",
        total, batch_size
    );

    let metrics = Metrics::new();
    let fetcher = Arc::new(io::ArchiveFetcher::with_metrics(store, metrics.clone()));
    let extractor: Arc<dyn extract::TextExtractor> = Arc::new(extract::PdfExtractor);
    let executor = Arc::new(StageExecutor::new(fetcher, extractor, config.clone()));
    let reporter = Arc::new(ProgressReporter::new(
        metrics.clone(),
        total as u64,
        config.processing.enable_progress,
    ));

    // Periodic metrics lines land in the log while the bar owns the terminal
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    let metrics_handle = tokio::spawn(
        pipeline::MetricsReporter::new(
            metrics.clone(),
            config.processing.metrics_interval_secs,
            total as u64,
        )
        .run(shutdown_rx),
    );

    let scheduler = BatchScheduler::new(executor, reporter.clone(), batch_size);
    let stats = scheduler.run(manifest.into_keys()).await;

    let _ = shutdown_tx.send(()).await;
    let _ = metrics_handle.await;
    reporter.finish();

    tracing::info!("Pipeline complete: {}", stats);

    if let Some(path) = &config.processing.metrics_output_path {
        if let Err(e) = metrics.snapshot().save_to_file(path) {
            tracing::warn!("Failed to save metrics to {}: {}", path, e);
        }
    }

    Ok(RunSummary::from_metrics(&metrics, total))
}

/// Build the Tokio runtime the pipeline runs on.
pub fn build_runtime() -> Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    Ok(builder.build()?)
}
