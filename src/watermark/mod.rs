//! Watermark store
//!
//! Tracks, per entity, the newest event timestamp already accounted for.
//! The document is the single source of truth for "what has been seen" and
//! is rewritten whole on every run.
//!
//! # Overview
//!
//! - `Watermark` - One timestamp, with an epoch sentinel for "never seen"
//! - `Watermarks` - The entity → watermark document
//! - `WatermarkStore` - File-backed load/save with atomic replacement

mod store;
mod types;

pub use store::{load, save, DocumentFormat, WatermarkStore, LEGACY_DATE_COLUMN};
pub use types::{parse_timestamp, Watermark, Watermarks, WATERMARK_FORMAT};
