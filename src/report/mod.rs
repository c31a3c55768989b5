//! Sync reporting
//!
//! Turns a delta report into rows an operator can read, as a Markdown table
//! or as JSON.

use crate::delta::DeltaReport;
use serde::Serialize;
use std::fmt::Write as _;

/// One row of the sync report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    /// Entity identifier
    pub entity: String,
    /// Records newer than the previous watermark
    pub new_count: usize,
}

/// Per-entity new-record counts for one run, in entity order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    rows: Vec<ReportRow>,
}

impl SyncReport {
    /// Get the rows
    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    /// Whether the report has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Total new records across entities
    pub fn total(&self) -> usize {
        self.rows.iter().map(|r| r.new_count).sum()
    }

    /// Render as a Markdown table
    pub fn to_markdown(&self) -> String {
        let mut out = String::from("| Symbol | New Articles |\n|:--|--:|\n");
        for row in &self.rows {
            let _ = writeln!(out, "| {} | {} |", row.entity, row.new_count);
        }
        out
    }
}

/// Build the report for a delta run
pub fn render(delta: &DeltaReport) -> SyncReport {
    SyncReport {
        rows: delta
            .iter()
            .map(|(entity, new_count)| ReportRow {
                entity: entity.to_string(),
                new_count,
            })
            .collect(),
    }
}
