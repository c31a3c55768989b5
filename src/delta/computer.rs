//! Incremental delta computation
//!
//! For each entity, counts the records in `<entity>.parquet` that are
//! strictly newer than the entity's watermark and advances the watermark to
//! the newest of them. The watermark document is saved once, after every
//! entity has been processed.

use super::report::DeltaReport;
use crate::error::{Error, Result};
use crate::types::{entity_path, MissingWatermarkPolicy, COLUMNAR_EXTENSION};
use crate::watermark::{parse_timestamp, Watermark, WatermarkStore, Watermarks};
use arrow::array::{Array, ArrowPrimitiveType, AsArray, PrimitiveArray};
use arrow::datatypes::{
    DataType, Date32Type, Date64Type, TimeUnit, TimestampMicrosecondType,
    TimestampMillisecondType, TimestampNanosecondType, TimestampSecondType,
};
use chrono::{NaiveDateTime, SubsecRound};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ProjectionMask;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::path::Path;

/// Default event-time column
pub const DEFAULT_TIMESTAMP_COLUMN: &str = "date";

/// Rows per batch when scanning the timestamp column
const SCAN_BATCH_SIZE: usize = 65_536;

/// Fractional digits kept from scanned timestamps, matching the document format
const WATERMARK_SUBSEC_DIGITS: u16 = 3;

/// Outcome of scanning one entity's columnar file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntityDelta {
    /// Records strictly newer than the watermark
    pub new_records: usize,
    /// Newest timestamp among those records
    pub newest: Option<NaiveDateTime>,
}

/// Computes per-entity deltas against a watermark document
#[derive(Debug, Clone)]
pub struct DeltaComputer {
    /// Event-time column in every entity file
    timestamp_column: String,
    /// Behavior when the watermark document is missing
    missing_watermarks: MissingWatermarkPolicy,
}

impl Default for DeltaComputer {
    fn default() -> Self {
        Self {
            timestamp_column: DEFAULT_TIMESTAMP_COLUMN.to_string(),
            missing_watermarks: MissingWatermarkPolicy::default(),
        }
    }
}

impl DeltaComputer {
    /// Create a computer reading the given timestamp column
    pub fn new(timestamp_column: impl Into<String>) -> Self {
        Self {
            timestamp_column: timestamp_column.into(),
            ..Self::default()
        }
    }

    /// Set the policy for a missing watermark document
    #[must_use]
    pub fn with_missing_watermarks(mut self, policy: MissingWatermarkPolicy) -> Self {
        self.missing_watermarks = policy;
        self
    }

    /// Get the timestamp column name
    pub fn timestamp_column(&self) -> &str {
        &self.timestamp_column
    }

    /// Compute deltas and rewrite the watermark document
    ///
    /// The document is loaded once and saved once. If any entity fails, the
    /// error propagates before the save and the previous document stays
    /// intact.
    pub fn compute_deltas<I, S>(
        &self,
        entities: I,
        columnar_dir: impl AsRef<Path>,
        watermark_path: impl AsRef<Path>,
    ) -> Result<DeltaReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let store = WatermarkStore::new(watermark_path);
        let mut watermarks = store.load_or(self.missing_watermarks)?;

        let report = self.apply(entities, columnar_dir, &mut watermarks)?;

        store.save(&watermarks)?;
        tracing::info!(
            "Computed deltas for {} entities ({} new records), watermarks saved to {}",
            report.len(),
            report.total(),
            store.path().display()
        );
        Ok(report)
    }

    /// Compute deltas against an in-memory document without persisting it
    ///
    /// Entities are processed in sorted order; entities of the document that
    /// are not in `entities` are left unchanged.
    pub fn apply<I, S>(
        &self,
        entities: I,
        columnar_dir: impl AsRef<Path>,
        watermarks: &mut Watermarks,
    ) -> Result<DeltaReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let columnar_dir = columnar_dir.as_ref();
        let entities: BTreeSet<String> = entities
            .into_iter()
            .map(|e| e.as_ref().to_string())
            .collect();

        let mut report = DeltaReport::new();
        for entity in entities {
            let last_seen = watermarks.get(&entity);
            let path = entity_path(columnar_dir, &entity);

            if !path.exists() {
                tracing::warn!(
                    "No columnar file for {entity} at {}, resetting watermark",
                    path.display()
                );
                watermarks.reset(entity.as_str());
                report.insert(entity, 0);
                continue;
            }

            let delta = self.entity_delta(&path, last_seen)?;
            if let Some(newest) = delta.newest {
                watermarks.set(entity.as_str(), Watermark::new(newest));
            }

            tracing::debug!(
                "{entity}: {} new records after {last_seen}",
                delta.new_records
            );
            report.insert(entity, delta.new_records);
        }

        Ok(report)
    }

    /// Count records in one columnar file newer than `last_seen`
    pub fn entity_delta(&self, path: &Path, last_seen: Watermark) -> Result<EntityDelta> {
        let file = File::open(path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

        let idx = builder
            .schema()
            .index_of(&self.timestamp_column)
            .map_err(|_| Error::column(path, &self.timestamp_column, "column not found"))?;
        let mask = ProjectionMask::roots(builder.parquet_schema(), [idx]);
        let reader = builder
            .with_projection(mask)
            .with_batch_size(SCAN_BATCH_SIZE)
            .build()?;

        let threshold = last_seen.timestamp();
        let mut delta = EntityDelta::default();
        for batch in reader {
            let batch = batch?;
            for_each_timestamp(batch.column(0).as_ref(), |ts| {
                if ts > threshold {
                    delta.new_records += 1;
                    delta.newest = Some(delta.newest.map_or(ts, |n| n.max(ts)));
                }
            })
            .map_err(|e| Error::column(path, &self.timestamp_column, e.to_string()))?;
        }

        Ok(delta)
    }
}

/// Compute deltas with the default timestamp column and missing-document policy
pub fn compute_deltas<I, S>(
    entities: I,
    columnar_dir: impl AsRef<Path>,
    watermark_path: impl AsRef<Path>,
) -> Result<DeltaReport>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    DeltaComputer::default().compute_deltas(entities, columnar_dir, watermark_path)
}

/// Entities with a columnar file in `columnar_dir`, sorted
///
/// A missing directory yields no entities.
pub fn entities_in(columnar_dir: impl AsRef<Path>) -> Result<Vec<String>> {
    let columnar_dir = columnar_dir.as_ref();
    let entries = match fs::read_dir(columnar_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("Columnar directory {} does not exist", columnar_dir.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(Error::Io(e)),
    };

    let mut entities = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_columnar = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(COLUMNAR_EXTENSION));
        if !path.is_file() || !is_columnar {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            entities.push(stem.to_string());
        }
    }
    entities.sort();
    Ok(entities)
}

/// Visit every non-null value of a temporal or text column as a naive UTC timestamp
///
/// Values are truncated to millisecond precision so a persisted watermark
/// compares equal to the record it was taken from.
fn for_each_timestamp(array: &dyn Array, mut visit: impl FnMut(NaiveDateTime)) -> Result<()> {
    let mut f = |ts: NaiveDateTime| visit(ts.trunc_subsecs(WATERMARK_SUBSEC_DIGITS));
    match array.data_type() {
        DataType::Timestamp(TimeUnit::Second, _) => {
            visit_temporal::<TimestampSecondType>(array, &mut f);
        }
        DataType::Timestamp(TimeUnit::Millisecond, _) => {
            visit_temporal::<TimestampMillisecondType>(array, &mut f);
        }
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            visit_temporal::<TimestampMicrosecondType>(array, &mut f);
        }
        DataType::Timestamp(TimeUnit::Nanosecond, _) => {
            visit_temporal::<TimestampNanosecondType>(array, &mut f);
        }
        DataType::Date32 => visit_temporal::<Date32Type>(array, &mut f),
        DataType::Date64 => visit_temporal::<Date64Type>(array, &mut f),
        DataType::Utf8 => {
            let values = array.as_string::<i32>();
            for value in values.iter().flatten() {
                f(parse_timestamp(value.trim())?);
            }
        }
        DataType::LargeUtf8 => {
            let values = array.as_string::<i64>();
            for value in values.iter().flatten() {
                f(parse_timestamp(value.trim())?);
            }
        }
        other => {
            return Err(Error::Other(format!(
                "unsupported timestamp type {other}"
            )))
        }
    }
    Ok(())
}

fn visit_temporal<T>(array: &dyn Array, f: &mut impl FnMut(NaiveDateTime))
where
    T: ArrowPrimitiveType + arrow::datatypes::ArrowTemporalType,
    i64: From<T::Native>,
{
    let values: &PrimitiveArray<T> = array.as_primitive::<T>();
    for i in 0..values.len() {
        if values.is_valid(i) {
            if let Some(ts) = values.value_as_datetime(i) {
                f(ts);
            }
        }
    }
}
