//! # ETL Pipeline
//!
//! Incremental ingest of per-entity record streams into Parquet, with a
//! per-entity watermark recording the newest record already seen.
//!
//! ## Features
//!
//! - **Columnar Conversion**: Stream CSV / JSON Lines into Parquet in fixed-size chunks
//! - **Watermarks**: Durable `{entity -> last seen timestamp}` document, rewritten atomically
//! - **Incremental Deltas**: Count records strictly newer than each watermark
//! - **Sync Reports**: Per-entity counts as Markdown or JSON
//! - **Uploads**: Size-aware directory sync to S3, R2, GCS, Azure or a local path
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use etl_pipeline::{compute_deltas, convert, report, Result};
//!
//! fn main() -> Result<()> {
//!     convert(&["data/outputs/AAA.csv"], "data/s3/news/AAA.parquet")?;
//!
//!     let delta = compute_deltas(["AAA"], "data/s3/news", "data/s3/watermarks.json")?;
//!     print!("{}", report::render(&delta).to_markdown());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! raw inputs ──► ColumnarWriter ──► <entity>.parquet + consolidated.parquet
//!                                          │
//!                   watermarks.json ──► DeltaComputer ──► DeltaReport ──► SyncReport
//!                          ▲                 │
//!                          └──── save ───────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
// Allow common clippy pedantic lints
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::unused_self)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types for the pipeline
pub mod error;

/// Common types and naming conventions
pub mod types;

/// Pipeline configuration
pub mod config;

/// Watermark document
pub mod watermark;

/// Incremental delta computation
pub mod delta;

/// Sync reports
pub mod report;

/// Parquet conversion, writing and uploads
pub mod output;

/// One full pipeline pass
pub mod pipeline;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use delta::{compute_deltas, DeltaComputer, DeltaReport};
pub use output::{convert, ColumnarWriter, ConversionOutcome};
pub use pipeline::{Pipeline, RunSummary};
pub use watermark::{Watermark, WatermarkStore, Watermarks};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
