//! Parquet file writer
//!
//! Wraps the Arrow Parquet writer so every chunk handed to it becomes its own
//! row group, and reads back the footer to count rows.

use crate::error::{Error, Result};
use crate::types::{ParquetCompression, DEFAULT_CHUNK_SIZE};
use arrow::datatypes::Schema;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// Row group and codec settings for written files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParquetWriterConfig {
    compression: ParquetCompression,
    row_group_size: usize,
}

impl Default for ParquetWriterConfig {
    fn default() -> Self {
        Self {
            compression: ParquetCompression::default(),
            row_group_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl ParquetWriterConfig {
    /// Set the compression codec
    #[must_use]
    pub fn with_compression(mut self, compression: ParquetCompression) -> Self {
        self.compression = compression;
        self
    }

    /// Set the maximum rows per row group
    #[must_use]
    pub fn with_row_group_size(mut self, size: usize) -> Self {
        self.row_group_size = size;
        self
    }

    /// Get the compression codec
    pub fn compression(&self) -> ParquetCompression {
        self.compression
    }

    /// Get the maximum rows per row group
    pub fn row_group_size(&self) -> usize {
        self.row_group_size
    }

    fn properties(&self) -> WriterProperties {
        WriterProperties::builder()
            .set_compression(self.compression.codec())
            .set_max_row_group_size(self.row_group_size.max(1))
            .build()
    }
}

/// Parquet file writer with a schema fixed at creation
pub struct ParquetWriter {
    /// Arrow writer
    writer: ArrowWriter<File>,
    /// Number of rows written
    rows_written: usize,
    /// Number of row groups flushed
    row_groups: usize,
}

impl ParquetWriter {
    /// Create a new Parquet writer
    pub fn new(
        path: impl AsRef<Path>,
        schema: &Schema,
        config: &ParquetWriterConfig,
    ) -> Result<Self> {
        let file = File::create(path.as_ref()).map_err(|e| Error::Output {
            message: format!("Failed to create {}: {e}", path.as_ref().display()),
        })?;

        let props = config.properties();
        let writer =
            ArrowWriter::try_new(file, Arc::new(schema.clone()), Some(props)).map_err(|e| {
                Error::Output {
                    message: format!("Failed to create Parquet writer: {e}"),
                }
            })?;

        Ok(Self {
            writer,
            rows_written: 0,
            row_groups: 0,
        })
    }

    /// Write a RecordBatch, buffering it into the current row group
    pub fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        self.writer.write(batch).map_err(|e| Error::Output {
            message: format!("Failed to write batch: {e}"),
        })?;

        self.rows_written += batch.num_rows();
        Ok(())
    }

    /// Write a RecordBatch and close it off as its own row group
    pub fn write_row_group(&mut self, batch: &RecordBatch) -> Result<()> {
        self.write(batch)?;
        self.writer.flush().map_err(|e| Error::Output {
            message: format!("Failed to flush row group: {e}"),
        })?;
        self.row_groups += 1;
        Ok(())
    }

    /// Get the number of rows written so far
    #[must_use]
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Get the number of row groups flushed explicitly
    #[must_use]
    pub fn row_groups(&self) -> usize {
        self.row_groups
    }

    /// Close the writer and finalize the file
    pub fn close(self) -> Result<usize> {
        let rows = self.rows_written;
        self.writer.close().map_err(|e| Error::Output {
            message: format!("Failed to close Parquet writer: {e}"),
        })?;
        Ok(rows)
    }
}

/// Count the rows of a Parquet file from its footer
pub fn count_rows(path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::not_found(path),
        _ => Error::Io(e),
    })?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let rows = builder.metadata().file_metadata().num_rows();
    usize::try_from(rows).map_err(|_| Error::output(format!("Invalid row count {rows}")))
}

/// Read every row of a Parquet file into memory
///
/// Only meant for small files (reports, verification).
pub fn read_batches(path: impl AsRef<Path>) -> Result<Vec<RecordBatch>> {
    let file = File::open(path.as_ref())?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    let mut batches = Vec::new();
    for batch in reader {
        batches.push(batch?);
    }
    Ok(batches)
}
