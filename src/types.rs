//! Common types used throughout the pipeline
//!
//! This module contains shared type definitions and naming conventions
//! used across multiple modules.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Extension of every columnar file written by the pipeline
pub const COLUMNAR_EXTENSION: &str = "parquet";

/// Default number of rows per read chunk
pub const DEFAULT_CHUNK_SIZE: usize = 20_000;

// ============================================================================
// Input Format
// ============================================================================

/// Row-oriented input format accepted by the columnar writer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    /// Delimited text with a header row
    Csv,
    /// JSON Lines (one object per line)
    Jsonl,
}

impl InputFormat {
    /// Detect the format from a file extension
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(Self::Csv),
            "jl" | "jsonl" | "ndjson" => Some(Self::Jsonl),
            _ => None,
        }
    }

    /// File extensions recognized for this format
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Csv => &["csv"],
            Self::Jsonl => &["jl", "jsonl", "ndjson"],
        }
    }
}

impl std::fmt::Display for InputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Csv => write!(f, "csv"),
            Self::Jsonl => write!(f, "jsonl"),
        }
    }
}

// ============================================================================
// Scrape Mode
// ============================================================================

/// How the upstream scraper is asked to collect records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeMode {
    /// Only collect records newer than what was already scraped
    #[default]
    Update,
    /// Collect everything inside a date range
    Dump,
}

impl ScrapeMode {
    /// Setting value understood by the scraper
    pub fn as_setting(self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Dump => "dump",
        }
    }
}

// ============================================================================
// Missing Watermark Policy
// ============================================================================

/// What a delta run does when the watermark document does not exist yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingWatermarkPolicy {
    /// Propagate the not-found error
    Fail,
    /// Start from an empty document (every entity at the sentinel)
    #[default]
    SeedEmpty,
}

// ============================================================================
// Parquet Compression
// ============================================================================

/// Compression codec of written Parquet files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ParquetCompression {
    /// Snappy
    #[default]
    Snappy,
    /// Zstandard at the default level
    Zstd,
    /// No compression
    Uncompressed,
}

impl ParquetCompression {
    /// Parquet codec for this setting
    pub fn codec(self) -> parquet::basic::Compression {
        match self {
            Self::Snappy => parquet::basic::Compression::SNAPPY,
            Self::Zstd => parquet::basic::Compression::ZSTD(parquet::basic::ZstdLevel::default()),
            Self::Uncompressed => parquet::basic::Compression::UNCOMPRESSED,
        }
    }
}

// ============================================================================
// Naming
// ============================================================================

/// Path of the columnar file for an entity: `{dir}/{entity}.parquet`
pub fn entity_path(dir: impl AsRef<Path>, entity: &str) -> PathBuf {
    dir.as_ref().join(format!("{entity}.{COLUMNAR_EXTENSION}"))
}
