//! arXiv PDF-to-text CLI
//!
//! Bulk-converts the arXiv PDF archives on S3 into plain-text files.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use arxiv_text::{build_runtime, io, pipeline, run_pipeline, Config, Manifest};

#[derive(Parser)]
#[command(name = "arxiv-text")]
#[command(about = "Convert the arXiv PDF archives on S3 to plain-text files", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    /// Override the batch size
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the conversion pipeline (default if no command specified)
    Run,

    /// Fetch the manifest and describe the work without processing
    Analyze,

    /// Validate configuration
    Validate,

    /// Generate a sample configuration file
    GenerateConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config.yaml")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Commands::Run) => {
            run_command(cli.config, cli.batch_size)?;
        }

        Some(Commands::Analyze) => {
            analyze_command(cli.config, cli.batch_size)?;
        }

        Some(Commands::Validate) => {
            validate_command(cli.config)?;
        }

        Some(Commands::GenerateConfig { output }) => {
            generate_config_command(output)?;
        }
    }

    Ok(())
}

/// Load the config file if present, falling back to defaults.
///
/// The pipeline is runnable without a config file when credentials come
/// from the ambient AWS environment.
fn load_config(path: &PathBuf) -> Result<Config> {
    if path.exists() {
        Config::from_file(path)
    } else {
        Ok(Config::default())
    }
}

/// Initialize tracing: a quiet console layer on stderr (overridable with
/// RUST_LOG) and a full INFO log file for post-run inspection.
fn init_tracing(config: &Config) -> Result<()> {
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()));

    let file_layer = match &config.logging.file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(LevelFilter::INFO),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}

fn run_command(config_path: PathBuf, batch_size: Option<usize>) -> Result<()> {
    let mut config = load_config(&config_path)?;

    // Apply overrides
    if let Some(size) = batch_size {
        config.processing.batch_size = Some(size);
    }

    config.validate()?;
    init_tracing(&config)?;

    let runtime = build_runtime()?;
    let summary = runtime.block_on(async { run_pipeline(config).await })?;

    summary.print();

    Ok(())
}

fn analyze_command(config_path: PathBuf, batch_size: Option<usize>) -> Result<()> {
    let mut config = load_config(&config_path)?;
    if let Some(size) = batch_size {
        config.processing.batch_size = Some(size);
    }
    config.validate()?;
    init_tracing(&config)?;

    let runtime = build_runtime()?;

    runtime.block_on(async {
        let store = io::create_archive_store(&config.storage)?;
        let manifest = Manifest::fetch(store, &config.storage.manifest_key).await?;

        let total = manifest.total();
        let batch_size = config.processing.effective_batch_size();
        let num_batches = pipeline::batches(manifest.keys(), batch_size).count();

        println!("\n=== Work Analysis ===");
        println!("Archives in manifest: {}", total);
        println!("Batch size: {}", batch_size);
        println!("Batches: {}", num_batches);
        if let (Some(first), Some(last)) = (manifest.keys().first(), manifest.keys().last()) {
            println!("First archive: {}", first);
            println!("Last archive: {}", last);
        }
        println!("Output directory: {}", config.layout.text_dir.display());
        println!("=====================\n");

        Ok(())
    })
}

fn validate_command(config_path: PathBuf) -> Result<()> {
    let config = Config::from_file(&config_path)?;
    config.validate()?;
    println!("Configuration is valid");
    Ok(())
}

fn generate_config_command(output: PathBuf) -> Result<()> {
    // Generate a commented YAML config
    let yaml = r#"# arXiv PDF-to-text pipeline configuration

# === STORAGE: Where the archives come from ===
storage:
  # Source bucket (requester-pays: downloads are billed to you)
  bucket: "arxiv"

  # Region the bucket lives in
  region: "us-east-1"

  # Credentials. Leave unset to use the ambient AWS environment
  # (AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY, config files, instance role)
  # access_key_id: "AKIA..."
  # secret_access_key: "..."

  # Bill transfers to the requester (required for the arXiv bucket)
  requester_pays: true

  # Object key of the archive manifest
  manifest_key: "pdf/arXiv_pdf_manifest.xml"

# === LAYOUT: Local directories ===
layout:
  # Downloaded tar archives (deleted after unpacking)
  archive_dir: "archives"

  # Per-archive unpack directories (deleted after extraction)
  unpack_dir: "pdf_files"

  # Extracted text output, one .txt per document
  text_dir: "text_files"

# === PROCESSING: Concurrency and resilience ===
processing:
  # Upper bound on concurrent archives regardless of core count.
  # Caps S3 connections, open file descriptors and disk contention.
  batch_ceiling: 16

  # Explicit batch size (overrides the core-count derivation)
  # batch_size: 8

  # Per-stage timeout in seconds. Unset: a hung transfer stalls its batch.
  # stage_timeout_secs: 3600

  # Terminal progress bar
  enable_progress: true

  # Interval for periodic metrics lines in the log
  metrics_interval_secs: 30

  # Retry budget for failed downloads
  retry:
    max_retries: 3
    initial_backoff_ms: 500
    max_backoff_ms: 10000

  # Save a metrics JSON snapshot after the run
  # metrics_output_path: "metrics.json"

# === LOGGING ===
logging:
  # Structured diagnostics for post-run inspection
  file: "log.txt"
"#;

    std::fs::write(&output, yaml)?;
    println!("Generated sample configuration at: {}", output.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_default() {
        // No subcommand - should default to Run
        let cli = Cli::try_parse_from(["arxiv-text"]);
        assert!(cli.is_ok());
        assert!(cli.unwrap().command.is_none());
    }

    #[test]
    fn test_cli_parse_with_config() {
        let cli = Cli::try_parse_from(["arxiv-text", "-c", "other.yaml"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn test_cli_parse_batch_size_override() {
        let cli = Cli::try_parse_from(["arxiv-text", "run", "--batch-size", "4"]).unwrap();
        assert_eq!(cli.batch_size, Some(4));
    }

    #[test]
    fn test_cli_parse_analyze() {
        let cli = Cli::try_parse_from(["arxiv-text", "analyze", "-c", "test.json"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn test_generated_config_parses_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        generate_config_command(path.clone()).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.storage.bucket, "arxiv");
        assert_eq!(config.processing.batch_ceiling, 16);
    }
}
