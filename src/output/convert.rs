//! Streaming row-to-columnar conversion
//!
//! Reads CSV or JSON Lines inputs in fixed-size chunks and appends each chunk
//! to a single Parquet file as its own row group. The schema of the first
//! non-empty chunk is fixed for the rest of the call.

use super::writer::{ParquetWriter, ParquetWriterConfig};
use crate::error::{Error, Result};
use crate::types::{InputFormat, ParquetCompression, DEFAULT_CHUNK_SIZE};
use arrow::csv::reader::Format;
use arrow::datatypes::{Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::json::reader::infer_json_schema_from_seekable;
use arrow::record_batch::RecordBatch;
use std::fs::{self, File};
use std::io::{BufReader, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Suffix of the in-progress file written next to the destination
const PARTIAL_SUFFIX: &str = "partial";

/// Result of one conversion call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionOutcome {
    /// Destination path (returned even when nothing was written)
    pub path: PathBuf,
    /// Rows written across all inputs
    pub rows_written: usize,
    /// Chunks written, one row group each
    pub chunks_written: usize,
    /// Whether the destination file was created
    pub created: bool,
}

/// Converts row-oriented inputs into one Parquet file
#[derive(Debug, Clone)]
pub struct ColumnarWriter {
    chunk_size: usize,
    format: Option<InputFormat>,
    csv_delimiter: u8,
    writer_config: ParquetWriterConfig,
}

impl Default for ColumnarWriter {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            format: None,
            csv_delimiter: b',',
            writer_config: ParquetWriterConfig::default(),
        }
    }
}

impl ColumnarWriter {
    /// Create a writer with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of rows per chunk (and per row group)
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Force an input format instead of detecting it from the extension
    #[must_use]
    pub fn with_format(mut self, format: Option<InputFormat>) -> Self {
        self.format = format;
        self
    }

    /// Set the CSV field delimiter
    #[must_use]
    pub fn with_csv_delimiter(mut self, delimiter: u8) -> Self {
        self.csv_delimiter = delimiter;
        self
    }

    /// Set the compression codec of the written file
    #[must_use]
    pub fn with_compression(mut self, compression: ParquetCompression) -> Self {
        self.writer_config = self.writer_config.with_compression(compression);
        self
    }

    /// Get the chunk size
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Stream `inputs` in order into the Parquet file at `output`
    ///
    /// If no input yields a row, no file is created. On any failure the
    /// in-progress file is removed and the destination is left as it was.
    pub fn convert<P: AsRef<Path>>(
        &self,
        inputs: &[P],
        output: impl AsRef<Path>,
    ) -> Result<ConversionOutcome> {
        let output = output.as_ref();
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let partial = partial_path(output)?;
        let mut sink = ChunkSink::new(&partial, self.chunk_size, &self.writer_config);

        let written = inputs
            .iter()
            .try_for_each(|input| self.append_input(input.as_ref(), &mut sink))
            .and_then(|()| sink.finish());

        let (rows_written, chunks_written) = match written {
            Ok(Some(counts)) => counts,
            Ok(None) => {
                tracing::info!(
                    "No rows in {} inputs, {} not created",
                    inputs.len(),
                    output.display()
                );
                return Ok(ConversionOutcome {
                    path: output.to_path_buf(),
                    rows_written: 0,
                    chunks_written: 0,
                    created: false,
                });
            }
            Err(e) => {
                remove_partial(&partial);
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(&partial, output) {
            remove_partial(&partial);
            return Err(Error::output(format!(
                "Failed to move {} to {}: {e}",
                partial.display(),
                output.display()
            )));
        }

        tracing::info!(
            "Wrote {rows_written} rows in {chunks_written} chunks from {} inputs to {}",
            inputs.len(),
            output.display()
        );
        Ok(ConversionOutcome {
            path: output.to_path_buf(),
            rows_written,
            chunks_written,
            created: true,
        })
    }

    fn append_input(&self, input: &Path, sink: &mut ChunkSink<'_>) -> Result<()> {
        let format = self
            .format
            .or_else(|| InputFormat::from_path(input))
            .ok_or_else(|| {
                Error::unsupported_input(input, "unknown extension, expected csv or jsonl")
            })?;

        let file = File::open(input).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::not_found(input),
            _ => Error::Io(e),
        })?;

        tracing::debug!("Reading {} as {format}", input.display());
        match format {
            InputFormat::Csv => self.append_csv(input, file, sink),
            InputFormat::Jsonl => self.append_jsonl(file, sink),
        }
    }

    fn append_csv(&self, input: &Path, mut file: File, sink: &mut ChunkSink<'_>) -> Result<()> {
        let format = Format::default()
            .with_header(true)
            .with_delimiter(self.csv_delimiter);

        let schema = match sink.schema() {
            Some(active) => {
                let (header, _) = format.infer_schema(&mut file, Some(0))?;
                if header.fields().is_empty() {
                    return Ok(());
                }
                check_header(input, active, &header)?;
                active.clone()
            }
            None => {
                let (inferred, _) = format.infer_schema(&mut file, Some(self.chunk_size))?;
                if inferred.fields().is_empty() {
                    return Ok(());
                }
                Arc::new(inferred)
            }
        };
        file.rewind()?;

        let reader = arrow::csv::ReaderBuilder::new(schema)
            .with_format(format)
            .with_batch_size(self.chunk_size)
            .build(file)?;
        sink.drain(reader)
    }

    fn append_jsonl(&self, file: File, sink: &mut ChunkSink<'_>) -> Result<()> {
        let mut reader = BufReader::new(file);

        let schema = match sink.schema() {
            Some(active) => active.clone(),
            None => {
                let (inferred, _) =
                    infer_json_schema_from_seekable(&mut reader, Some(self.chunk_size))?;
                if inferred.fields().is_empty() {
                    return Ok(());
                }
                Arc::new(inferred)
            }
        };

        let reader = arrow::json::ReaderBuilder::new(schema)
            .with_batch_size(self.chunk_size)
            .build(reader)?;
        sink.drain(reader)
    }
}

/// Convert inputs with default settings, returning the destination path
pub fn convert<P: AsRef<Path>>(inputs: &[P], output: impl AsRef<Path>) -> Result<PathBuf> {
    ColumnarWriter::default()
        .convert(inputs, output)
        .map(|outcome| outcome.path)
}

/// Lazily opened destination for chunks
struct ChunkSink<'a> {
    path: &'a Path,
    config: ParquetWriterConfig,
    writer: Option<ParquetWriter>,
    schema: Option<SchemaRef>,
}

impl<'a> ChunkSink<'a> {
    fn new(path: &'a Path, chunk_size: usize, config: &ParquetWriterConfig) -> Self {
        Self {
            path,
            config: config.with_row_group_size(chunk_size),
            writer: None,
            schema: None,
        }
    }

    /// Schema fixed by the first written chunk
    fn schema(&self) -> Option<&SchemaRef> {
        self.schema.as_ref()
    }

    fn drain<I>(&mut self, batches: I) -> Result<()>
    where
        I: Iterator<Item = std::result::Result<RecordBatch, ArrowError>>,
    {
        for batch in batches {
            self.write(&batch?)?;
        }
        Ok(())
    }

    fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        if batch.num_rows() == 0 {
            return Ok(());
        }

        if self.writer.is_none() {
            let schema = batch.schema();
            self.writer = Some(ParquetWriter::new(self.path, &schema, &self.config)?);
            tracing::debug!(
                "Opened {} with {} columns",
                self.path.display(),
                schema.fields().len()
            );
            self.schema = Some(schema);
        }

        if let Some(writer) = self.writer.as_mut() {
            writer.write_row_group(batch)?;
            tracing::debug!(
                "Chunk {}: {} rows",
                writer.row_groups(),
                batch.num_rows()
            );
        }
        Ok(())
    }

    /// Finalize the file; `None` if nothing was written
    fn finish(self) -> Result<Option<(usize, usize)>> {
        match self.writer {
            Some(writer) => {
                let chunks = writer.row_groups();
                let rows = writer.close()?;
                Ok(Some((rows, chunks)))
            }
            None => Ok(None),
        }
    }
}

fn check_header(input: &Path, active: &Schema, header: &Schema) -> Result<()> {
    let expected: Vec<&str> = active.fields().iter().map(|f| f.name().as_str()).collect();
    let found: Vec<&str> = header.fields().iter().map(|f| f.name().as_str()).collect();
    if expected == found {
        return Ok(());
    }
    Err(Error::schema_mismatch(
        input,
        format!(
            "expected columns [{}], found [{}]",
            expected.join(", "),
            found.join(", ")
        ),
    ))
}

fn partial_path(output: &Path) -> Result<PathBuf> {
    let name = output
        .file_name()
        .ok_or_else(|| Error::output(format!("Invalid output path {}", output.display())))?;
    let mut partial = name.to_os_string();
    partial.push(".");
    partial.push(PARTIAL_SUFFIX);
    Ok(output.with_file_name(partial))
}

fn remove_partial(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove {}: {e}", path.display());
        }
    }
}
