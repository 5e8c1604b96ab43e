//! Archive downloads: one S3 object key to one local file.

use crate::pipeline::Metrics;
use anyhow::{Context, Result};
use futures::StreamExt;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// Fetcher for tar archives.
///
/// Bodies are streamed straight to disk so an archive's size never lands in
/// memory; multi-gigabyte tars are the normal case for this bucket.
pub struct ArchiveFetcher {
    store: Arc<dyn ObjectStore>,
    metrics: Option<Arc<Metrics>>,
}

impl ArchiveFetcher {
    /// Create a new fetcher.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            metrics: None,
        }
    }

    /// Create a fetcher that records downloaded bytes.
    pub fn with_metrics(store: Arc<dyn ObjectStore>, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            metrics: Some(metrics),
        }
    }

    /// Download the object at `key` to `dest`, returning the bytes written.
    ///
    /// A failed transfer removes any partial file before returning the
    /// error, so intermediate disk usage stays bounded to completed
    /// downloads.
    pub async fn fetch(&self, key: &str, dest: &Path) -> Result<u64> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        match self.fetch_inner(key, dest).await {
            Ok(written) => {
                if let Some(metrics) = &self.metrics {
                    metrics.add_bytes_downloaded(written);
                }
                Ok(written)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(dest).await;
                Err(e)
            }
        }
    }

    async fn fetch_inner(&self, key: &str, dest: &Path) -> Result<u64> {
        let path = ObjectPath::from(key);
        let result = self
            .store
            .get(&path)
            .await
            .with_context(|| format!("Failed to fetch s3 object '{}'", key))?;

        let mut stream = result.into_stream();
        let mut file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("Failed to create {}", dest.display()))?;

        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.with_context(|| format!("Transfer failed for '{}'", key))?;
            file.write_all(&chunk)
                .await
                .with_context(|| format!("Failed to write {}", dest.display()))?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        tracing::debug!("Downloaded {} ({} bytes) to {}", key, written, dest.display());
        Ok(written)
    }
}
