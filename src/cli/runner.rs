//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, OutputFormat};
use crate::config::PipelineConfig;
use crate::delta::{entities_in, DeltaComputer};
use crate::error::Result;
use crate::output::{CloudDestination, ColumnarWriter, IncludePatterns, Uploader};
use crate::pipeline::Pipeline;
use crate::report::{render, SyncReport};
use crate::types::{MissingWatermarkPolicy, ParquetCompression};
use crate::watermark::WatermarkStore;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Convert {
                output,
                chunk_size,
                compression,
                inputs,
            } => self.convert(inputs, output, *chunk_size, *compression),
            Commands::Deltas {
                dir,
                watermarks,
                entities,
                seed_empty,
            } => self.deltas(
                dir.as_deref(),
                watermarks.as_deref(),
                entities,
                *seed_empty,
            ),
            Commands::Watermarks { watermarks } => self.watermarks(watermarks.as_deref()),
            Commands::Upload {
                local,
                remote,
                include,
                concurrency,
            } => self.upload(local, remote, include, *concurrency).await,
            Commands::Run => self.run_pipeline().await,
            Commands::Settings => self.settings(),
        }
    }

    /// Load the config file, or defaults when none is given
    fn load_config(&self) -> Result<PipelineConfig> {
        match &self.cli.config {
            Some(path) => PipelineConfig::from_file(path),
            None => Ok(PipelineConfig::default()),
        }
    }

    /// Convert inputs into one Parquet file
    fn convert(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        chunk_size: Option<usize>,
        compression: Option<ParquetCompression>,
    ) -> Result<()> {
        let config = self.load_config()?;
        let writer = ColumnarWriter::new()
            .with_chunk_size(chunk_size.unwrap_or(config.chunk_size))
            .with_format(config.input_format)
            .with_csv_delimiter(config.csv_delimiter_byte())
            .with_compression(compression.unwrap_or(config.compression));

        let outcome = writer.convert(inputs, output)?;

        self.output_message(&json!({
            "type": "CONVERSION",
            "conversion": {
                "path": outcome.path,
                "created": outcome.created,
                "rows": outcome.rows_written,
                "chunks": outcome.chunks_written
            }
        }));
        Ok(())
    }

    /// Compute deltas and print the report
    fn deltas(
        &self,
        dir: Option<&Path>,
        watermarks: Option<&Path>,
        entities: &[String],
        seed_empty: bool,
    ) -> Result<()> {
        let config = self.load_config()?;
        let dir = dir.unwrap_or(&config.columnar_dir);
        let watermarks = watermarks.unwrap_or(&config.watermark_path);
        let entities = delta_entities(entities, &config.entities, dir)?;
        let policy = if seed_empty {
            MissingWatermarkPolicy::SeedEmpty
        } else {
            config.missing_watermarks
        };

        let delta = DeltaComputer::new(config.timestamp_column.clone())
            .with_missing_watermarks(policy)
            .compute_deltas(&entities, dir, watermarks)?;

        self.output_report(&render(&delta));
        Ok(())
    }

    /// Print the watermark document
    fn watermarks(&self, path: Option<&Path>) -> Result<()> {
        let config = self.load_config()?;
        let path = path.unwrap_or(&config.watermark_path);
        let watermarks = WatermarkStore::new(path).load()?;

        self.output_message(&json!({
            "type": "WATERMARKS",
            "watermarks": watermarks
        }));
        Ok(())
    }

    /// Upload a directory
    async fn upload(
        &self,
        local: &Path,
        remote: &str,
        include: &[String],
        concurrency: usize,
    ) -> Result<()> {
        let destination = CloudDestination::parse(remote)?;
        let uploader = Uploader::new(destination).with_concurrency(concurrency);
        let include = IncludePatterns::new(include)?;

        let summary = uploader.upload_dir(local, &include).await?;

        self.output_message(&json!({
            "type": "UPLOAD",
            "upload": summary
        }));
        Ok(())
    }

    /// Run the full pipeline
    async fn run_pipeline(&self) -> Result<()> {
        let pipeline = Pipeline::new(self.load_config()?)?;
        let summary = pipeline.run().await?;

        match self.cli.format {
            OutputFormat::Json => self.output_message(&json!({
                "type": "RUN",
                "run": summary
            })),
            OutputFormat::Pretty => {
                self.output_report(&summary.report);
                if let Some(rows) = summary.consolidated_rows {
                    println!("\n# Total New Articles\n\nThe consolidated file contains a total of {rows} articles.");
                }
                if let Some(upload) = &summary.upload {
                    println!(
                        "\nUploaded {} files, skipped {}",
                        upload.uploaded.len(),
                        upload.skipped.len()
                    );
                }
            }
        }
        Ok(())
    }

    /// Print scraper settings
    fn settings(&self) -> Result<()> {
        let config = self.load_config()?;
        self.output_message(&json!({
            "type": "SETTINGS",
            "settings": config.scraper_settings()
        }));
        Ok(())
    }

    /// Output a sync report
    fn output_report(&self, report: &SyncReport) {
        match self.cli.format {
            OutputFormat::Json => self.output_message(&json!({
                "type": "REPORT",
                "report": report,
                "total": report.total()
            })),
            OutputFormat::Pretty => print!("{}", report.to_markdown()),
        }
    }

    /// Output a message
    fn output_message(&self, msg: &Value) {
        match self.cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(msg).unwrap_or_default());
            }
            OutputFormat::Pretty => {
                println!("{}", serde_json::to_string_pretty(msg).unwrap_or_default());
            }
        }
    }
}

/// Entities for `deltas`: the requested set, the configured set, or every
/// columnar file in `dir`
fn delta_entities(requested: &[String], configured: &[String], dir: &Path) -> Result<Vec<String>> {
    if !requested.is_empty() {
        return Ok(requested.to_vec());
    }
    if !configured.is_empty() {
        return Ok(configured.to_vec());
    }
    let discovered = entities_in(dir)?;
    tracing::info!(
        "No entities given, using {} columnar files in {}",
        discovered.len(),
        dir.display()
    );
    Ok(discovered)
}
