//! Per-item stage execution.
//!
//! One executor drives one work item through its four stages: download,
//! unpack, extract text, cleanup. Two fault boundaries apply:
//!
//! - **Item-level**: a failed download or unpack aborts the remaining
//!   stages for that item only; the outcome records the failing stage.
//! - **Document-level**: a failed text extraction is logged and skipped;
//!   sibling documents and the item's cleanup proceed.
//!
//! Nothing thrown here escapes past [`StageExecutor::run`]; a concurrent
//! unit can never take down its batch.

use crate::config::Config;
use crate::extract::{self, TextExtractor};
use crate::io::ArchiveFetcher;
use crate::pipeline::{ItemError, ItemOutcome, Stage, WorkItem};
use anyhow::{anyhow, Context, Result};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Executor for individual work items.
pub struct StageExecutor {
    /// Archive downloads
    fetcher: Arc<ArchiveFetcher>,

    /// Document text extraction
    extractor: Arc<dyn TextExtractor>,

    /// Configuration
    config: Arc<Config>,
}

impl StageExecutor {
    /// Create a new stage executor.
    pub fn new(
        fetcher: Arc<ArchiveFetcher>,
        extractor: Arc<dyn TextExtractor>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            config,
        }
    }

    /// Run all stages for one work item, producing its terminal outcome.
    pub async fn run(&self, mut item: WorkItem) -> ItemOutcome {
        match self.execute(&mut item).await {
            Ok((documents_extracted, documents_failed)) => {
                item.set_stage(Stage::Completed);
                tracing::info!(
                    "{}: completed, {} documents extracted, {} failed",
                    item.key(),
                    documents_extracted,
                    documents_failed
                );
                ItemOutcome::Completed {
                    documents_extracted,
                    documents_failed,
                }
            }
            Err(error) => {
                item.set_stage(Stage::Failed);
                tracing::error!("{}: {}", item.key(), error);
                ItemOutcome::Failed(error)
            }
        }
    }

    async fn execute(&self, item: &mut WorkItem) -> Result<(usize, usize), ItemError> {
        let key = item.key().to_string();
        let tar_path = self
            .config
            .layout
            .archive_dir
            .join(extract::archive_filename(&key));
        let unpack_dir = self
            .config
            .layout
            .unpack_dir
            .join(extract::archive_slug(&key));

        item.set_stage(Stage::Downloading);
        let bytes = self
            .staged(Stage::Downloading, self.download_with_retry(&key, &tar_path))
            .await?;
        tracing::debug!("{}: downloaded {} bytes", key, bytes);

        item.set_stage(Stage::Unpacking);
        self.staged(Stage::Unpacking, self.unpack(&key, &tar_path, &unpack_dir))
            .await?;

        item.set_stage(Stage::ExtractingText);
        let counts = self
            .staged(
                Stage::ExtractingText,
                self.extract_texts(&key, &unpack_dir),
            )
            .await?;

        // Cleanup runs however many documents failed above; only a total
        // unpack/extract failure leaves the tree behind.
        item.set_stage(Stage::CleaningUp);
        self.staged(Stage::CleaningUp, self.cleanup(&unpack_dir))
            .await?;

        Ok(counts)
    }

    /// Apply the configured per-stage timeout, if any, to a stage future.
    async fn staged<T>(
        &self,
        stage: Stage,
        fut: impl Future<Output = Result<T, ItemError>>,
    ) -> Result<T, ItemError> {
        match self.config.processing.stage_timeout_secs {
            Some(seconds) => match tokio::time::timeout(Duration::from_secs(seconds), fut).await {
                Ok(result) => result,
                Err(_) => Err(ItemError::Timeout { stage, seconds }),
            },
            None => fut.await,
        }
    }

    /// Download the archive, retrying transient failures with exponential
    /// backoff. An exhausted retry budget is an item-level failure.
    async fn download_with_retry(&self, key: &str, dest: &Path) -> Result<u64, ItemError> {
        let retry = &self.config.processing.retry;
        let mut attempt = 0;
        let mut backoff = retry.initial_backoff_ms;

        loop {
            match self.fetcher.fetch(key, dest).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    attempt += 1;
                    if attempt >= retry.max_retries {
                        return Err(ItemError::Download(e));
                    }

                    tracing::warn!(
                        "{}: download attempt {} failed: {:#}, retrying in {}ms",
                        key,
                        attempt,
                        e,
                        backoff
                    );

                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                    backoff = (backoff * 2).min(retry.max_backoff_ms);
                }
            }
        }
    }

    /// Unpack the downloaded tar into the item's private directory, then
    /// delete the tar to bound intermediate disk usage.
    async fn unpack(&self, key: &str, tar_path: &Path, dest: &Path) -> Result<(), ItemError> {
        let tar = tar_path.to_path_buf();
        let dest_dir = dest.to_path_buf();

        let result =
            tokio::task::spawn_blocking(move || extract::unpack_archive(&tar, &dest_dir)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(ItemError::Unpack(e)),
            Err(e) => return Err(ItemError::Unpack(anyhow!("unpack task panicked: {}", e))),
        }

        // The archive has served its purpose; reclaim the disk before
        // extraction starts
        if let Err(e) = tokio::fs::remove_file(tar_path).await {
            tracing::warn!(
                "{}: failed to remove archive {}: {}",
                key,
                tar_path.display(),
                e
            );
        }

        tracing::debug!("{}: unpacked to {}", key, dest.display());
        Ok(())
    }

    /// Extract text from every document under the unpacked directory.
    ///
    /// Returns (extracted, failed) document counts. A single document
    /// failing is logged and skipped; only a failure to enumerate the
    /// directory at all fails the stage.
    async fn extract_texts(
        &self,
        key: &str,
        unpack_dir: &Path,
    ) -> Result<(usize, usize), ItemError> {
        let extractor = self.extractor.clone();
        let text_dir = self.config.layout.text_dir.clone();
        let dir = unpack_dir.to_path_buf();
        let key = key.to_string();

        let result = tokio::task::spawn_blocking(move || -> Result<(usize, usize)> {
            let documents = extract::discover_documents(&dir)?;
            tracing::debug!("{}: {} documents discovered", key, documents.len());

            let mut extracted = 0;
            let mut failed = 0;
            for document in &documents {
                match extract_one(extractor.as_ref(), document, &text_dir) {
                    Ok(()) => extracted += 1,
                    Err(e) => {
                        failed += 1;
                        tracing::warn!(
                            "{}: skipping document {}: {:#}",
                            key,
                            document.display(),
                            e
                        );
                    }
                }
            }
            Ok((extracted, failed))
        })
        .await;

        match result {
            Ok(Ok(counts)) => Ok(counts),
            Ok(Err(e)) => Err(ItemError::Extract(e)),
            Err(e) => Err(ItemError::Extract(anyhow!("extraction task panicked: {}", e))),
        }
    }

    /// Remove the item's unpack tree.
    async fn cleanup(&self, unpack_dir: &Path) -> Result<(), ItemError> {
        tokio::fs::remove_dir_all(unpack_dir)
            .await
            .with_context(|| format!("Failed to remove {}", unpack_dir.display()))
            .map_err(ItemError::Cleanup)
    }
}

/// Extract and persist a single document's text.
fn extract_one(extractor: &dyn TextExtractor, document: &Path, text_dir: &Path) -> Result<()> {
    let bytes = std::fs::read(document)
        .with_context(|| format!("Failed to read {}", document.display()))?;
    let text = extractor.extract(&bytes)?;
    extract::save_text(&text, document, text_dir)?;
    Ok(())
}
