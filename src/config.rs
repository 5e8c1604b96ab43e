//! Configuration for the arXiv text-extraction pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Object storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Local filesystem layout
    #[serde(default)]
    pub layout: LayoutConfig,

    /// Processing configuration
    #[serde(default)]
    pub processing: ProcessingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// S3 source configuration.
///
/// The arXiv bulk-data bucket is requester-pays: every GET is billed to the
/// caller, so credentials are effectively mandatory even though the objects
/// are public.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Source S3 bucket
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// AWS region the bucket lives in
    #[serde(default = "default_region")]
    pub region: String,

    /// Access key id; falls back to the ambient AWS environment when unset
    #[serde(default)]
    pub access_key_id: Option<String>,

    /// Secret access key; falls back to the ambient AWS environment when unset
    #[serde(default)]
    pub secret_access_key: Option<String>,

    /// Bill transfers to the requester (required for the arXiv bucket)
    #[serde(default = "default_true")]
    pub requester_pays: bool,

    /// Object key of the archive manifest
    #[serde(default = "default_manifest_key")]
    pub manifest_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            region: default_region(),
            access_key_id: None,
            secret_access_key: None,
            requester_pays: true,
            manifest_key: default_manifest_key(),
        }
    }
}

/// Local filesystem layout.
///
/// `archive_dir` and `unpack_dir` hold intermediate bytes and are emptied as
/// the run progresses; `text_dir` is the final output namespace, flat and
/// keyed by document name only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Directory for downloaded tar archives
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,

    /// Root directory for per-archive unpack subdirectories
    #[serde(default = "default_unpack_dir")]
    pub unpack_dir: PathBuf,

    /// Output directory for extracted text files
    #[serde(default = "default_text_dir")]
    pub text_dir: PathBuf,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            archive_dir: default_archive_dir(),
            unpack_dir: default_unpack_dir(),
            text_dir: default_text_dir(),
        }
    }
}

/// Processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Upper bound on batch size regardless of core count.
    /// Caps simultaneous S3 connections, open file descriptors and disk
    /// contention.
    #[serde(default = "default_batch_ceiling")]
    pub batch_ceiling: usize,

    /// Explicit batch size; overrides the parallelism/ceiling derivation
    #[serde(default)]
    pub batch_size: Option<usize>,

    /// Per-stage timeout in seconds. Unset means no timeout: a hung
    /// download or extraction stalls its whole batch.
    #[serde(default)]
    pub stage_timeout_secs: Option<u64>,

    /// Show the terminal progress bar
    #[serde(default = "default_true")]
    pub enable_progress: bool,

    /// Interval for periodic metrics lines in the log
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_secs: u64,

    /// Retry configuration for failed downloads
    #[serde(default)]
    pub retry: RetryConfig,

    /// Optional path to save a metrics JSON snapshot after the run
    #[serde(default)]
    pub metrics_output_path: Option<String>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            batch_ceiling: 16,
            batch_size: None,
            stage_timeout_secs: None,
            enable_progress: true,
            metrics_interval_secs: 30,
            retry: RetryConfig::default(),
            metrics_output_path: None,
        }
    }
}

impl ProcessingConfig {
    /// Effective batch size: the explicit override if set, otherwise
    /// `min(available_parallelism, batch_ceiling)`.
    pub fn effective_batch_size(&self) -> usize {
        if let Some(size) = self.batch_size {
            return size;
        }
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        cores.min(self.batch_ceiling).max(1)
    }
}

/// Retry configuration for transient download failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum download attempts per archive
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Initial backoff in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log file for structured diagnostics; unset disables the file sink
    #[serde(default = "default_log_file")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML or JSON file.
    /// Format is auto-detected from file extension (.yaml, .yml, or .json).
    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config: Config = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => {
                // Try YAML first (it's a superset of JSON)
                serde_yaml::from_str(&contents)?
            }
        };
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.storage.bucket.is_empty() {
            anyhow::bail!("Storage bucket must not be empty");
        }
        if self.storage.manifest_key.is_empty() {
            anyhow::bail!("Manifest key must not be empty");
        }
        match (&self.storage.access_key_id, &self.storage.secret_access_key) {
            (Some(_), None) | (None, Some(_)) => {
                anyhow::bail!("access_key_id and secret_access_key must be set together");
            }
            _ => {}
        }
        if self.processing.batch_ceiling == 0 {
            anyhow::bail!("Batch ceiling must be > 0");
        }
        if self.processing.batch_size == Some(0) {
            anyhow::bail!("Batch size must be > 0");
        }
        if self.processing.retry.max_retries == 0 {
            anyhow::bail!("max_retries must be > 0 (1 means a single attempt)");
        }
        Ok(())
    }
}

// Default value functions for serde
fn default_bucket() -> String {
    "arxiv".to_string()
}
fn default_region() -> String {
    // Same region the arXiv bucket is in
    "us-east-1".to_string()
}
fn default_manifest_key() -> String {
    "pdf/arXiv_pdf_manifest.xml".to_string()
}
fn default_archive_dir() -> PathBuf {
    PathBuf::from("archives")
}
fn default_unpack_dir() -> PathBuf {
    PathBuf::from("pdf_files")
}
fn default_text_dir() -> PathBuf {
    PathBuf::from("text_files")
}
fn default_true() -> bool {
    true
}
fn default_batch_ceiling() -> usize {
    16
}
fn default_metrics_interval() -> u64 {
    30
}
fn default_max_retries() -> usize {
    3
}
fn default_initial_backoff_ms() -> u64 {
    500
}
fn default_max_backoff_ms() -> u64 {
    10_000
}
fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from("log.txt"))
}
