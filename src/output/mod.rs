//! Output module
//!
//! Handles columnar conversion, Parquet file writing and uploads.
//!
//! # Overview
//!
//! This module provides utilities for:
//! - Streaming CSV and JSON Lines inputs into one Parquet file
//! - Writing and counting Parquet files
//! - Cloud storage destinations (S3, R2, GCS, Azure, local)
//! - Size-aware directory uploads

mod cloud;
mod convert;
mod upload;
mod writer;

pub use cloud::CloudDestination;
pub use convert::{convert, ColumnarWriter, ConversionOutcome};
pub use upload::{IncludePatterns, UploadSummary, Uploader, DEFAULT_UPLOAD_CONCURRENCY};
pub use writer::{count_rows, read_batches, ParquetWriter, ParquetWriterConfig};
