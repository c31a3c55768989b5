//! Tests for delta computation

use super::*;
use crate::error::Error;
use crate::output::{ParquetWriter, ParquetWriterConfig};
use crate::types::MissingWatermarkPolicy;
use crate::watermark::{load, save, Watermark, Watermarks};
use arrow::array::{
    ArrayRef, Date32Array, Int64Array, StringArray, TimestampMicrosecondArray,
    TimestampMillisecondArray, TimestampNanosecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDateTime;
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn millis(s: &str) -> i64 {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .unwrap()
        .and_utc()
        .timestamp_millis()
}

fn micros(s: &str) -> i64 {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .unwrap()
        .and_utc()
        .timestamp_micros()
}

fn wm(s: &str) -> Watermark {
    s.parse().unwrap()
}

fn write_batch_to_parquet(path: impl AsRef<Path>, batch: &RecordBatch) {
    let mut writer =
        ParquetWriter::new(path, batch.schema().as_ref(), &ParquetWriterConfig::default()).unwrap();
    writer.write(batch).unwrap();
    writer.close().unwrap();
}

/// Write `<dir>/<entity>.parquet` with a millisecond `date` column
fn write_entity(dir: &Path, entity: &str, dates: &[Option<&str>]) {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("date", DataType::Timestamp(TimeUnit::Millisecond, None), true),
    ]));
    let ids: ArrayRef = Arc::new(Int64Array::from_iter_values(0..dates.len() as i64));
    let ts: ArrayRef = Arc::new(TimestampMillisecondArray::from(
        dates.iter().map(|d| d.map(millis)).collect::<Vec<_>>(),
    ));
    let batch = RecordBatch::try_new(schema, vec![ids, ts]).unwrap();
    write_batch_to_parquet(dir.join(format!("{entity}.parquet")), &batch);
}

fn write_column(dir: &Path, entity: &str, column: ArrayRef) {
    let schema = Arc::new(Schema::new(vec![Field::new(
        "date",
        column.data_type().clone(),
        true,
    )]));
    let batch = RecordBatch::try_new(schema, vec![column]).unwrap();
    write_batch_to_parquet(dir.join(format!("{entity}.parquet")), &batch);
}

fn seed(path: &Path, entries: &[(&str, &str)]) {
    let watermarks: Watermarks = entries.iter().map(|(e, w)| (*e, wm(w))).collect();
    save(path, &watermarks).unwrap();
}

// ============================================================================
// Core Semantics
// ============================================================================

#[test]
fn test_counts_records_newer_than_watermark() {
    let dir = tempdir().unwrap();
    let doc = dir.path().join("watermarks.json");
    seed(&doc, &[("AAA", "2024-01-01 00:00:00.000")]);
    write_entity(
        dir.path(),
        "AAA",
        &[Some("2024-01-02 00:00:00"), Some("2023-12-31 00:00:00")],
    );

    let report = compute_deltas(["AAA"], dir.path(), &doc).unwrap();

    assert_eq!(report.get("AAA"), Some(1));
    assert_eq!(load(&doc).unwrap().get("AAA"), wm("2024-01-02 00:00:00.000"));
}

#[test]
fn test_record_at_watermark_is_not_new() {
    let dir = tempdir().unwrap();
    let doc = dir.path().join("watermarks.json");
    seed(&doc, &[("AAA", "2024-01-02 00:00:00.000")]);
    write_entity(
        dir.path(),
        "AAA",
        &[Some("2024-01-02 00:00:00"), Some("2024-01-01 12:00:00")],
    );

    let report = compute_deltas(["AAA"], dir.path(), &doc).unwrap();

    assert_eq!(report.get("AAA"), Some(0));
    assert_eq!(load(&doc).unwrap().get("AAA"), wm("2024-01-02 00:00:00.000"));
}

#[test]
fn test_advances_to_max_of_new_records() {
    let dir = tempdir().unwrap();
    let doc = dir.path().join("watermarks.json");
    seed(&doc, &[("AAA", "2024-01-01 00:00:00.000")]);
    write_entity(
        dir.path(),
        "AAA",
        &[
            Some("2024-01-03 00:00:00"),
            Some("2024-01-05 08:30:00"),
            Some("2024-01-04 00:00:00"),
        ],
    );

    let report = compute_deltas(["AAA"], dir.path(), &doc).unwrap();

    assert_eq!(report.get("AAA"), Some(3));
    assert_eq!(load(&doc).unwrap().get("AAA"), wm("2024-01-05 08:30:00.000"));
}

#[test]
fn test_unseen_entity_counts_everything() {
    let dir = tempdir().unwrap();
    let doc = dir.path().join("watermarks.json");
    write_entity(
        dir.path(),
        "NEW",
        &[Some("2001-01-01 00:00:00"), Some("2002-01-01 00:00:00")],
    );

    let report = compute_deltas(["NEW"], dir.path(), &doc).unwrap();

    assert_eq!(report.get("NEW"), Some(2));
    assert_eq!(load(&doc).unwrap().get("NEW"), wm("2002-01-01 00:00:00.000"));
}

#[test]
fn test_null_timestamps_are_ignored() {
    let dir = tempdir().unwrap();
    let doc = dir.path().join("watermarks.json");
    write_entity(dir.path(), "AAA", &[None, Some("2024-01-02 00:00:00"), None]);

    let report = compute_deltas(["AAA"], dir.path(), &doc).unwrap();
    assert_eq!(report.get("AAA"), Some(1));
}

// ============================================================================
// Idempotence & Monotonicity
// ============================================================================

#[test]
fn test_second_run_reports_zero_and_keeps_document() {
    let dir = tempdir().unwrap();
    let doc = dir.path().join("watermarks.json");
    write_entity(
        dir.path(),
        "AAA",
        &[Some("2024-01-02 00:00:00"), Some("2024-01-03 00:00:00")],
    );
    write_entity(dir.path(), "BBB", &[Some("2024-02-01 00:00:00")]);

    let first = compute_deltas(["AAA", "BBB"], dir.path(), &doc).unwrap();
    assert_eq!(first.total(), 3);
    let after_first = std::fs::read(&doc).unwrap();

    let second = compute_deltas(["AAA", "BBB"], dir.path(), &doc).unwrap();
    assert_eq!(second.get("AAA"), Some(0));
    assert_eq!(second.get("BBB"), Some(0));
    assert_eq!(std::fs::read(&doc).unwrap(), after_first);
}

#[test]
fn test_watermark_never_decreases_across_runs() {
    let dir = tempdir().unwrap();
    let doc = dir.path().join("watermarks.json");

    write_entity(dir.path(), "AAA", &[Some("2024-01-05 00:00:00")]);
    compute_deltas(["AAA"], dir.path(), &doc).unwrap();
    let first = load(&doc).unwrap().get("AAA");

    // Late-arriving older records do not move the watermark back
    write_entity(
        dir.path(),
        "AAA",
        &[Some("2024-01-05 00:00:00"), Some("2024-01-01 00:00:00")],
    );
    let report = compute_deltas(["AAA"], dir.path(), &doc).unwrap();
    let second = load(&doc).unwrap().get("AAA");
    assert_eq!(report.get("AAA"), Some(0));
    assert_eq!(second, first);

    write_entity(
        dir.path(),
        "AAA",
        &[
            Some("2024-01-05 00:00:00"),
            Some("2024-01-01 00:00:00"),
            Some("2024-01-09 00:00:00"),
        ],
    );
    let report = compute_deltas(["AAA"], dir.path(), &doc).unwrap();
    let third = load(&doc).unwrap().get("AAA");
    assert_eq!(report.get("AAA"), Some(1));
    assert!(third > second);
}

#[test]
fn test_submillisecond_column_is_idempotent() {
    let dir = tempdir().unwrap();
    let doc = dir.path().join("watermarks.json");
    write_column(
        dir.path(),
        "AAA",
        Arc::new(TimestampMicrosecondArray::from(vec![micros(
            "2024-01-02 00:00:00.123456",
        )])) as ArrayRef,
    );
    write_column(
        dir.path(),
        "BBB",
        Arc::new(TimestampNanosecondArray::from(vec![
            micros("2024-01-03 00:00:00.999999") * 1_000 + 1,
        ])) as ArrayRef,
    );

    let first = compute_deltas(["AAA", "BBB"], dir.path(), &doc).unwrap();
    assert_eq!(first.get("AAA"), Some(1));
    assert_eq!(first.get("BBB"), Some(1));
    assert_eq!(load(&doc).unwrap().get("AAA"), wm("2024-01-02 00:00:00.123"));
    assert_eq!(load(&doc).unwrap().get("BBB"), wm("2024-01-03 00:00:00.999"));

    let second = compute_deltas(["AAA", "BBB"], dir.path(), &doc).unwrap();
    assert_eq!(second.get("AAA"), Some(0));
    assert_eq!(second.get("BBB"), Some(0));
}

#[test]
fn test_submillisecond_strings_are_idempotent() {
    let dir = tempdir().unwrap();
    let doc = dir.path().join("watermarks.json");
    write_column(
        dir.path(),
        "AAA",
        Arc::new(StringArray::from(vec![
            "2024-01-02 00:00:00.123456",
            "2024-01-02T05:30:00.000250+05:30",
        ])) as ArrayRef,
    );

    let first = compute_deltas(["AAA"], dir.path(), &doc).unwrap();
    assert_eq!(first.get("AAA"), Some(2));
    assert_eq!(load(&doc).unwrap().get("AAA"), wm("2024-01-02 00:00:00.123"));

    let second = compute_deltas(["AAA"], dir.path(), &doc).unwrap();
    assert_eq!(second.get("AAA"), Some(0));
}

// ============================================================================
// Missing Inputs
// ============================================================================

#[test]
fn test_missing_file_reports_zero_and_resets() {
    let dir = tempdir().unwrap();
    let doc = dir.path().join("watermarks.json");
    seed(
        &doc,
        &[
            ("AAA", "2024-01-01 00:00:00.000"),
            ("GONE", "2024-03-01 00:00:00.000"),
        ],
    );
    write_entity(dir.path(), "AAA", &[Some("2024-01-02 00:00:00")]);

    let report = compute_deltas(["AAA", "GONE"], dir.path(), &doc).unwrap();

    assert_eq!(report.get("GONE"), Some(0));
    assert_eq!(report.get("AAA"), Some(1));

    let watermarks = load(&doc).unwrap();
    assert!(watermarks.contains("GONE"));
    assert!(watermarks.get("GONE").is_sentinel());
    assert_eq!(watermarks.get("AAA"), wm("2024-01-02 00:00:00.000"));
}

#[test]
fn test_entities_outside_the_set_are_carried_over() {
    let dir = tempdir().unwrap();
    let doc = dir.path().join("watermarks.json");
    seed(&doc, &[("OTHER", "2022-06-01 00:00:00.000")]);
    write_entity(dir.path(), "AAA", &[Some("2024-01-02 00:00:00")]);

    let report = compute_deltas(["AAA"], dir.path(), &doc).unwrap();

    assert_eq!(report.len(), 1);
    let watermarks = load(&doc).unwrap();
    assert_eq!(watermarks.get("OTHER"), wm("2022-06-01 00:00:00.000"));
}

#[test]
fn test_missing_document_with_fail_policy() {
    let dir = tempdir().unwrap();
    let doc = dir.path().join("watermarks.json");
    write_entity(dir.path(), "AAA", &[Some("2024-01-02 00:00:00")]);

    let computer = DeltaComputer::default().with_missing_watermarks(MissingWatermarkPolicy::Fail);
    let err = computer
        .compute_deltas(["AAA"], dir.path(), &doc)
        .unwrap_err();

    assert!(err.is_not_found());
    assert!(!doc.exists());
}

#[test]
fn test_failure_leaves_previous_document_untouched() {
    let dir = tempdir().unwrap();
    let doc = dir.path().join("watermarks.json");
    seed(&doc, &[("AAA", "2024-01-01 00:00:00.000")]);
    let before = std::fs::read(&doc).unwrap();

    write_entity(dir.path(), "AAA", &[Some("2024-01-02 00:00:00")]);
    // BBB has no timestamp column at all
    let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
    let batch = RecordBatch::try_new(
        schema,
        vec![Arc::new(Int64Array::from(vec![1, 2, 3])) as ArrayRef],
    )
    .unwrap();
    write_batch_to_parquet(dir.path().join("BBB.parquet"), &batch);

    let err = compute_deltas(["AAA", "BBB"], dir.path(), &doc).unwrap_err();

    assert!(matches!(err, Error::Column { .. }));
    assert_eq!(std::fs::read(&doc).unwrap(), before);
}

// ============================================================================
// Column Types
// ============================================================================

#[test]
fn test_date32_column() {
    let dir = tempdir().unwrap();
    let doc = dir.path().join("watermarks.json");
    seed(&doc, &[("AAA", "2024-01-01 00:00:00.000")]);
    // 19_724 = 2024-01-02, 19_722 = 2023-12-31
    write_column(
        dir.path(),
        "AAA",
        Arc::new(Date32Array::from(vec![19_724, 19_722])) as ArrayRef,
    );

    let report = compute_deltas(["AAA"], dir.path(), &doc).unwrap();

    assert_eq!(report.get("AAA"), Some(1));
    assert_eq!(load(&doc).unwrap().get("AAA"), wm("2024-01-02 00:00:00.000"));
}

#[test]
fn test_string_column() {
    let dir = tempdir().unwrap();
    let doc = dir.path().join("watermarks.json");
    seed(&doc, &[("AAA", "2024-01-01 00:00:00.000")]);
    write_column(
        dir.path(),
        "AAA",
        Arc::new(StringArray::from(vec![
            Some("2024-01-02T09:15:00"),
            None,
            Some("2023-12-31"),
        ])) as ArrayRef,
    );

    let report = compute_deltas(["AAA"], dir.path(), &doc).unwrap();

    assert_eq!(report.get("AAA"), Some(1));
    assert_eq!(load(&doc).unwrap().get("AAA"), wm("2024-01-02 09:15:00.000"));
}

#[test]
fn test_unparseable_string_is_an_error() {
    let dir = tempdir().unwrap();
    let doc = dir.path().join("watermarks.json");
    write_column(
        dir.path(),
        "AAA",
        Arc::new(StringArray::from(vec!["last tuesday"])) as ArrayRef,
    );

    let err = compute_deltas(["AAA"], dir.path(), &doc).unwrap_err();
    assert!(matches!(err, Error::Column { .. }));
    assert!(!doc.exists());
}

#[test]
fn test_timezone_aware_column_is_normalized_to_utc() {
    let dir = tempdir().unwrap();
    let doc = dir.path().join("watermarks.json");
    let ts = TimestampMillisecondArray::from(vec![millis("2024-01-02 00:00:00")])
        .with_timezone("Asia/Kolkata");
    write_column(dir.path(), "AAA", Arc::new(ts) as ArrayRef);

    compute_deltas(["AAA"], dir.path(), &doc).unwrap();
    assert_eq!(load(&doc).unwrap().get("AAA"), wm("2024-01-02 00:00:00.000"));
}

#[test]
fn test_custom_timestamp_column() {
    let dir = tempdir().unwrap();
    let doc = dir.path().join("watermarks.json");
    let schema = Arc::new(Schema::new(vec![Field::new(
        "date_published",
        DataType::Utf8,
        true,
    )]));
    let batch = RecordBatch::try_new(
        schema,
        vec![Arc::new(StringArray::from(vec!["2024-05-01 10:00:00"])) as ArrayRef],
    )
    .unwrap();
    write_batch_to_parquet(dir.path().join("AAA.parquet"), &batch);

    let report = DeltaComputer::new("date_published")
        .compute_deltas(["AAA"], dir.path(), &doc)
        .unwrap();
    assert_eq!(report.get("AAA"), Some(1));
}

// ============================================================================
// Report
// ============================================================================

#[test]
fn test_report_is_ordered_by_entity() {
    let dir = tempdir().unwrap();
    let doc = dir.path().join("watermarks.json");
    write_entity(dir.path(), "ZZZ", &[Some("2024-01-02 00:00:00")]);
    write_entity(
        dir.path(),
        "AAA",
        &[Some("2024-01-02 00:00:00"), Some("2024-01-03 00:00:00")],
    );

    let report = compute_deltas(["ZZZ", "AAA", "MMM"], dir.path(), &doc).unwrap();
    let rows: Vec<(&str, usize)> = report.iter().collect();
    assert_eq!(rows, vec![("AAA", 2), ("MMM", 0), ("ZZZ", 1)]);
    assert_eq!(report.total(), 3);
}

#[test]
fn test_entities_in_lists_columnar_stems() {
    let dir = tempdir().unwrap();
    write_entity(dir.path(), "TCS", &[Some("2024-01-02 00:00:00")]);
    write_entity(dir.path(), "INFY", &[Some("2024-01-02 00:00:00")]);
    std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
    std::fs::create_dir(dir.path().join("archive.parquet")).unwrap();

    assert_eq!(entities_in(dir.path()).unwrap(), vec!["INFY", "TCS"]);
    assert!(entities_in(dir.path().join("missing")).unwrap().is_empty());
}

#[test]
fn test_empty_entity_set_still_saves_document() {
    let dir = tempdir().unwrap();
    let doc = dir.path().join("watermarks.json");

    let report = compute_deltas(Vec::<String>::new(), dir.path(), &doc).unwrap();
    assert!(report.is_empty());
    assert!(doc.exists());
}
