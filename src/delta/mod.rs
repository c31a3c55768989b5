//! Incremental delta computer
//!
//! Given each entity's watermark and its columnar file, counts the records
//! newer than the watermark and advances the watermark. Comparison is
//! strictly greater-than, so re-running over unchanged data reports zero.

mod computer;
mod report;

pub use computer::{
    compute_deltas, entities_in, DeltaComputer, EntityDelta, DEFAULT_TIMESTAMP_COLUMN,
};
pub use report::DeltaReport;

#[cfg(test)]
mod tests;
