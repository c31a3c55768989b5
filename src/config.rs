//! Pipeline configuration
//!
//! All settings of a pipeline run, loaded from YAML (or JSON, which
//! `serde_yaml` also reads) and validated before use.

use crate::error::{Error, Result};
use crate::types::{
    InputFormat, MissingWatermarkPolicy, ParquetCompression, ScrapeMode, DEFAULT_CHUNK_SIZE,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Date format of date range bounds
const DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// Top-Level Pipeline Config
// ============================================================================

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Rows per read chunk and per row group
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Force an input format instead of detecting it from extensions
    #[serde(default)]
    pub input_format: Option<InputFormat>,

    /// CSV field delimiter
    #[serde(default = "default_csv_delimiter")]
    pub csv_delimiter: char,

    /// Compression codec of written Parquet files
    #[serde(default)]
    pub compression: ParquetCompression,

    /// Directory holding raw scraper outputs
    #[serde(default = "default_raw_dir")]
    pub raw_dir: PathBuf,

    /// Directory holding one columnar file per entity
    #[serde(default = "default_columnar_dir")]
    pub columnar_dir: PathBuf,

    /// Columnar file with every entity combined (`null` disables it)
    #[serde(default = "default_consolidated_path")]
    pub consolidated_path: Option<PathBuf>,

    /// Watermark document
    #[serde(default = "default_watermark_path")]
    pub watermark_path: PathBuf,

    /// Event-time column used for deltas
    #[serde(default = "default_timestamp_column")]
    pub timestamp_column: String,

    /// Fixed entity set; empty means every raw input stem
    #[serde(default)]
    pub entities: Vec<String>,

    /// Behavior when the watermark document does not exist
    #[serde(default)]
    pub missing_watermarks: MissingWatermarkPolicy,

    /// Scrape mode handed to the scraper
    #[serde(default)]
    pub mode: ScrapeMode,

    /// Date range for dump mode
    #[serde(default)]
    pub date_range: Option<DateRange>,

    /// Upload of the columnar output after a run
    #[serde(default)]
    pub upload: Option<UploadConfig>,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_csv_delimiter() -> char {
    ','
}

fn default_raw_dir() -> PathBuf {
    PathBuf::from("data/outputs")
}

fn default_columnar_dir() -> PathBuf {
    PathBuf::from("data/s3/news")
}

fn default_consolidated_path() -> Option<PathBuf> {
    Some(PathBuf::from("data/s3/news.parquet"))
}

fn default_watermark_path() -> PathBuf {
    PathBuf::from("data/s3/watermarks.json")
}

fn default_timestamp_column() -> String {
    crate::delta::DEFAULT_TIMESTAMP_COLUMN.to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            input_format: None,
            csv_delimiter: default_csv_delimiter(),
            compression: ParquetCompression::default(),
            raw_dir: default_raw_dir(),
            columnar_dir: default_columnar_dir(),
            consolidated_path: default_consolidated_path(),
            watermark_path: default_watermark_path(),
            timestamp_column: default_timestamp_column(),
            entities: Vec::new(),
            missing_watermarks: MissingWatermarkPolicy::default(),
            mode: ScrapeMode::default(),
            date_range: None,
            upload: None,
        }
    }
}

// ============================================================================
// Date Range
// ============================================================================

/// Inclusive date range for dump mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// First day
    pub start: NaiveDate,
    /// Last day; `None` means today
    #[serde(default)]
    pub end: Option<NaiveDate>,
}

impl DateRange {
    /// Resolve the end bound against `today`
    pub fn bounds(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        (self.start, self.end.unwrap_or(today))
    }
}

// ============================================================================
// Upload Config
// ============================================================================

/// Where and what to upload after a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UploadConfig {
    /// Destination URL (`s3://`, `r2://`, `gs://`, `az://` or a local path)
    pub destination: String,

    /// Local directory to upload; defaults to the columnar directory's parent
    #[serde(default)]
    pub local_dir: Option<PathBuf>,

    /// Glob patterns of relative paths to include; empty means all
    #[serde(default)]
    pub include: Vec<String>,

    /// Files uploaded concurrently
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_concurrency() -> usize {
    crate::output::DEFAULT_UPLOAD_CONCURRENCY
}

// ============================================================================
// Loading & Validation
// ============================================================================

impl PipelineConfig {
    /// Load a config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::not_found(path)
            } else {
                Error::config(format!(
                    "Failed to read config file '{}': {e}",
                    path.display()
                ))
            }
        })?;
        Self::from_yaml_str(&content)
    }

    /// Parse a config from YAML or JSON text
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("Failed to parse pipeline config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::invalid_value("chunk_size", "must be greater than 0"));
        }

        if !self.csv_delimiter.is_ascii() {
            return Err(Error::invalid_value(
                "csv_delimiter",
                format!("'{}' is not a single ASCII character", self.csv_delimiter),
            ));
        }

        if self.timestamp_column.trim().is_empty() {
            return Err(Error::invalid_value("timestamp_column", "cannot be empty"));
        }

        if let Some(entity) = self
            .entities
            .iter()
            .find(|e| e.is_empty() || e.contains(['/', '\\']))
        {
            return Err(Error::invalid_value(
                "entities",
                format!("'{entity}' is not a valid entity id"),
            ));
        }

        match (self.mode, &self.date_range) {
            (ScrapeMode::Dump, None) => {
                return Err(Error::invalid_value(
                    "date_range",
                    "required when mode is 'dump'",
                ));
            }
            (_, Some(DateRange { start, end: Some(end) })) if start > end => {
                return Err(Error::invalid_value(
                    "date_range",
                    format!("start {start} is after end {end}"),
                ));
            }
            _ => {}
        }

        if let Some(upload) = &self.upload {
            if upload.destination.trim().is_empty() {
                return Err(Error::invalid_value("upload.destination", "cannot be empty"));
            }
            if upload.concurrency == 0 {
                return Err(Error::invalid_value(
                    "upload.concurrency",
                    "must be greater than 0",
                ));
            }
        }

        Ok(())
    }

    /// CSV delimiter as a byte
    pub fn csv_delimiter_byte(&self) -> u8 {
        u8::try_from(self.csv_delimiter).unwrap_or(b',')
    }

    /// Directory uploaded when no `local_dir` is configured
    pub fn upload_local_dir(&self) -> Option<PathBuf> {
        let upload = self.upload.as_ref()?;
        upload.local_dir.clone().or_else(|| {
            self.columnar_dir
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .or_else(|| Some(self.columnar_dir.clone()))
        })
    }

    /// Settings handed to the scraper for the configured mode
    pub fn scraper_settings(&self) -> BTreeMap<String, Value> {
        self.scraper_settings_on(chrono::Local::now().date_naive())
    }

    /// Settings handed to the scraper, resolving an open range against `today`
    pub fn scraper_settings_on(&self, today: NaiveDate) -> BTreeMap<String, Value> {
        let mut settings = BTreeMap::new();
        settings.insert(
            "SCRAPE_MODE".to_string(),
            Value::from(self.mode.as_setting()),
        );

        if self.mode == ScrapeMode::Dump {
            if let Some(range) = &self.date_range {
                let (start, end) = range.bounds(today);
                settings.insert(
                    "DATE_RANGE".to_string(),
                    Value::from(vec![
                        start.format(DATE_FORMAT).to_string(),
                        end.format(DATE_FORMAT).to_string(),
                    ]),
                );
            }
        }

        settings
    }
}
