//! CLI commands and argument parsing

use crate::types::ParquetCompression;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Incremental columnar ingest with per-entity watermarks
#[derive(Parser, Debug)]
#[command(name = "etl-pipeline")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Pipeline configuration file (YAML or JSON)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert CSV / JSON Lines inputs into one Parquet file
    Convert {
        /// Destination Parquet file
        #[arg(short, long)]
        output: PathBuf,

        /// Rows per chunk (defaults to the config value)
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Parquet compression codec (defaults to the config value)
        #[arg(long, value_enum)]
        compression: Option<ParquetCompression>,

        /// Input files, appended in order
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Count new records per entity and advance the watermarks
    Deltas {
        /// Directory of per-entity Parquet files (defaults to the config value)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Watermark document (defaults to the config value)
        #[arg(long)]
        watermarks: Option<PathBuf>,

        /// Entities (comma-separated, defaults to the config value)
        #[arg(long, value_delimiter = ',')]
        entities: Vec<String>,

        /// Start from an empty document if the watermark file is missing
        #[arg(long)]
        seed_empty: bool,
    },

    /// Print the watermark document
    Watermarks {
        /// Watermark document (defaults to the config value)
        #[arg(long)]
        watermarks: Option<PathBuf>,
    },

    /// Upload a local directory
    Upload {
        /// Local directory
        #[arg(long)]
        local: PathBuf,

        /// Destination URL
        /// Supports: /path, s3://bucket/path, r2://bucket/path, gs://bucket/path, az://container/path
        #[arg(long)]
        remote: String,

        /// Glob of relative paths to include (repeatable, empty = all)
        #[arg(long)]
        include: Vec<String>,

        /// Files uploaded concurrently
        #[arg(long, default_value = "8")]
        concurrency: usize,
    },

    /// Run the full pipeline from the config file
    Run,

    /// Print the scraper settings for the configured mode
    Settings,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one message per line)
    Json,
    /// Human-readable output
    Pretty,
}
