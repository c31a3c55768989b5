//! One pass of the ingest pipeline
//!
//! Raw inputs are converted into per-entity columnar files and one
//! consolidated file, deltas are computed against the watermark document,
//! and the columnar directory is optionally uploaded.

use crate::config::PipelineConfig;
use crate::delta::{DeltaComputer, DeltaReport};
use crate::error::{Error, Result, ResultExt};
use crate::output::{
    count_rows, CloudDestination, ColumnarWriter, IncludePatterns, UploadSummary, Uploader,
};
use crate::report::{render, SyncReport};
use crate::types::{entity_path, InputFormat};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Outcome of a pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// New records per entity
    pub report: SyncReport,
    /// Rows in the consolidated file, if one is configured and exists
    pub consolidated_rows: Option<usize>,
    /// Upload result, if an upload is configured
    pub upload: Option<UploadSummary>,
}

/// Runs the pipeline for one configuration
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    uploader: Option<Uploader>,
}

impl Pipeline {
    /// Create a pipeline from a validated configuration
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            uploader: None,
        })
    }

    /// Use a specific uploader instead of the configured destination
    #[must_use]
    pub fn with_uploader(mut self, uploader: Uploader) -> Self {
        self.uploader = Some(uploader);
        self
    }

    /// Get the configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn columnar_writer(&self) -> ColumnarWriter {
        ColumnarWriter::new()
            .with_chunk_size(self.config.chunk_size)
            .with_format(self.config.input_format)
            .with_csv_delimiter(self.config.csv_delimiter_byte())
            .with_compression(self.config.compression)
    }

    fn accepts(&self, path: &Path) -> bool {
        match self.config.input_format {
            Some(format) => path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| {
                    format
                        .extensions()
                        .iter()
                        .any(|known| known.eq_ignore_ascii_case(ext))
                }),
            None => InputFormat::from_path(path).is_some(),
        }
    }

    /// Raw input files in the raw directory, sorted by path
    ///
    /// A missing raw directory yields no inputs.
    pub fn discover_inputs(&self) -> Result<Vec<PathBuf>> {
        let raw_dir = &self.config.raw_dir;
        let entries = match fs::read_dir(raw_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("Raw directory {} does not exist", raw_dir.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let mut inputs = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && self.accepts(&path) {
                inputs.push(path);
            }
        }
        inputs.sort();
        tracing::info!("Found {} raw inputs in {}", inputs.len(), raw_dir.display());
        Ok(inputs)
    }

    /// Convert inputs into `<columnar_dir>/<stem>.parquet`, one file per stem
    ///
    /// Returns the stems that produced a file.
    pub fn convert_inputs(&self, inputs: &[PathBuf]) -> Result<Vec<String>> {
        let writer = self.columnar_writer();
        let mut converted = Vec::new();
        for (stem, paths) in group_by_stem(inputs) {
            let output = entity_path(&self.config.columnar_dir, &stem);
            let outcome = writer
                .convert(&paths, &output)
                .with_context(|| format!("Failed to convert {stem}"))?;
            if outcome.created {
                converted.push(stem);
            }
        }
        Ok(converted)
    }

    /// Convert every input into the consolidated file and count its rows
    pub fn convert_consolidated(&self, inputs: &[PathBuf]) -> Result<Option<usize>> {
        let Some(path) = &self.config.consolidated_path else {
            return Ok(None);
        };

        self.columnar_writer().convert(inputs, path)?;
        if !path.exists() {
            return Ok(None);
        }
        let rows = count_rows(path)?;
        tracing::info!("Total new articles: {rows} rows in {}", path.display());
        Ok(Some(rows))
    }

    /// Compute deltas for the given entities against the watermark document
    pub fn compute_deltas(&self, entities: &[String]) -> Result<DeltaReport> {
        DeltaComputer::new(self.config.timestamp_column.clone())
            .with_missing_watermarks(self.config.missing_watermarks)
            .compute_deltas(
                entities,
                &self.config.columnar_dir,
                &self.config.watermark_path,
            )
    }

    /// Entities for the delta pass: the configured set, or the input stems
    pub fn entities(&self, inputs: &[PathBuf]) -> Vec<String> {
        if self.config.entities.is_empty() {
            group_by_stem(inputs).into_keys().collect()
        } else {
            self.config.entities.clone()
        }
    }

    fn uploader(&self) -> Result<Option<Uploader>> {
        if let Some(uploader) = &self.uploader {
            return Ok(Some(uploader.clone()));
        }
        let Some(upload) = &self.config.upload else {
            return Ok(None);
        };
        let destination = CloudDestination::parse(&upload.destination)?;
        Ok(Some(
            Uploader::new(destination).with_concurrency(upload.concurrency),
        ))
    }

    /// Upload the configured local directory
    pub async fn upload(&self) -> Result<Option<UploadSummary>> {
        let Some(uploader) = self.uploader()? else {
            return Ok(None);
        };

        let (local_dir, include) = match &self.config.upload {
            Some(upload) => (
                self.config
                    .upload_local_dir()
                    .unwrap_or_else(|| self.config.columnar_dir.clone()),
                IncludePatterns::new(&upload.include)?,
            ),
            None => (self.config.columnar_dir.clone(), IncludePatterns::all()),
        };

        uploader.upload_dir(&local_dir, &include).await.map(Some)
    }

    /// Run one full pass
    pub async fn run(&self) -> Result<RunSummary> {
        let inputs = self.discover_inputs()?;

        let converted = self.convert_inputs(&inputs)?;
        tracing::info!("Converted {} entities", converted.len());

        let consolidated_rows = self.convert_consolidated(&inputs)?;

        let entities = self.entities(&inputs);
        let deltas = self.compute_deltas(&entities)?;
        let report = render(&deltas);

        let upload = self.upload().await?;

        Ok(RunSummary {
            report,
            consolidated_rows,
            upload,
        })
    }
}

/// Group paths by file stem, keeping the given order within a group
fn group_by_stem(inputs: &[PathBuf]) -> BTreeMap<String, Vec<PathBuf>> {
    let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for path in inputs {
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            groups.entry(stem.to_string()).or_default().push(path.clone());
        }
    }
    groups
}
