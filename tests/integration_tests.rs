//! End-to-end tests
//!
//! Raw CSV / JSON Lines → Parquet → deltas against the watermark document →
//! report → upload.

use etl_pipeline::config::{PipelineConfig, UploadConfig};
use etl_pipeline::output::{count_rows, CloudDestination, ColumnarWriter, Uploader};
use etl_pipeline::watermark::{Watermark, WatermarkStore};
use etl_pipeline::{compute_deltas, convert, Pipeline};
use object_store::memory::InMemory;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn write_csv(path: &Path, first_id: usize, rows: usize) {
    let mut content = String::from("id,date,title\n");
    for i in first_id..first_id + rows {
        content.push_str(&format!(
            "{i},2024-01-{:02} 08:00:00,headline {i}\n",
            i % 28 + 1
        ));
    }
    fs::write(path, content).unwrap();
}

fn write_jsonl(path: &Path, dates: &[&str]) {
    let content: String = dates
        .iter()
        .enumerate()
        .map(|(i, date)| format!("{{\"id\": {i}, \"date\": \"{date}\", \"title\": \"t{i}\"}}\n"))
        .collect();
    fs::write(path, content).unwrap();
}

fn watermark(path: &Path, entity: &str) -> String {
    WatermarkStore::new(path)
        .load()
        .unwrap()
        .get(entity)
        .to_string()
}

// ============================================================================
// Conversion Tests
// ============================================================================

#[test]
fn test_two_csv_inputs_are_concatenated() {
    let dir = tempdir().unwrap();
    let first = dir.path().join("AAA.csv");
    let second = dir.path().join("BBB.csv");
    write_csv(&first, 0, 25_000);
    write_csv(&second, 25_000, 5_000);

    let output = dir.path().join("news.parquet");
    let outcome = ColumnarWriter::new()
        .with_chunk_size(20_000)
        .convert(&[&first, &second], &output)
        .unwrap();

    assert_eq!(outcome.rows_written, 30_000);
    assert_eq!(outcome.chunks_written, 3);
    assert_eq!(count_rows(&output).unwrap(), 30_000);
}

#[test]
fn test_empty_input_list_succeeds_without_file() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("news.parquet");

    let inputs: Vec<&Path> = Vec::new();
    let path = convert(&inputs, &output).unwrap();

    assert_eq!(path, output);
    assert!(!output.exists());
}

// ============================================================================
// Delta Tests
// ============================================================================

#[test]
fn test_incremental_runs_over_growing_data() {
    let dir = tempdir().unwrap();
    let raw = dir.path().join("raw");
    let columnar = dir.path().join("news");
    let watermarks = dir.path().join("watermarks.json");
    fs::create_dir_all(&raw).unwrap();

    write_jsonl(
        &raw.join("AAA.jl"),
        &["2024-01-01 09:00:00", "2024-01-02 09:30:00"],
    );
    convert(&[raw.join("AAA.jl")], columnar.join("AAA.parquet")).unwrap();

    let first = compute_deltas(["AAA"], &columnar, &watermarks).unwrap();
    assert_eq!(first.get("AAA"), Some(2));
    assert_eq!(watermark(&watermarks, "AAA"), "2024-01-02 09:30:00.000");

    let unchanged = compute_deltas(["AAA"], &columnar, &watermarks).unwrap();
    assert_eq!(unchanged.get("AAA"), Some(0));
    assert_eq!(watermark(&watermarks, "AAA"), "2024-01-02 09:30:00.000");

    write_jsonl(
        &raw.join("AAA.jl"),
        &[
            "2024-01-01 09:00:00",
            "2024-01-02 09:30:00",
            "2024-01-03 11:15:00",
        ],
    );
    convert(&[raw.join("AAA.jl")], columnar.join("AAA.parquet")).unwrap();

    let grown = compute_deltas(["AAA"], &columnar, &watermarks).unwrap();
    assert_eq!(grown.get("AAA"), Some(1));
    assert_eq!(watermark(&watermarks, "AAA"), "2024-01-03 11:15:00.000");
}

#[test]
fn test_missing_entity_file_reports_zero() {
    let dir = tempdir().unwrap();
    let columnar = dir.path().join("news");
    let watermarks = dir.path().join("watermarks.json");

    let raw = dir.path().join("AAA.csv");
    write_csv(&raw, 0, 3);
    convert(&[&raw], columnar.join("AAA.parquet")).unwrap();

    fs::write(
        &watermarks,
        r#"{"AAA": "2023-01-01 00:00:00.000", "ZZZ": "2024-02-01 00:00:00.000"}"#,
    )
    .unwrap();

    let report = compute_deltas(["AAA", "ZZZ"], &columnar, &watermarks).unwrap();
    assert_eq!(report.get("AAA"), Some(3));
    assert_eq!(report.get("ZZZ"), Some(0));
    assert_eq!(
        watermark(&watermarks, "ZZZ"),
        Watermark::sentinel().to_string()
    );
}

// ============================================================================
// Pipeline Tests
// ============================================================================

#[tokio::test]
async fn test_pipeline_run_with_upload() {
    let dir = tempdir().unwrap();
    let raw = dir.path().join("outputs");
    let s3 = dir.path().join("s3");
    fs::create_dir_all(&raw).unwrap();

    write_csv(&raw.join("AAA.csv"), 0, 4);
    write_jsonl(
        &raw.join("BBB.jl"),
        &["2024-03-01 10:00:00", "2024-03-02 10:00:00"],
    );

    let config = PipelineConfig {
        raw_dir: raw.clone(),
        columnar_dir: s3.join("news"),
        consolidated_path: None,
        watermark_path: s3.join("watermarks.json"),
        upload: Some(UploadConfig {
            destination: "s3://bucket/data".to_string(),
            local_dir: None,
            include: vec!["**/*.parquet".to_string(), "*.json".to_string()],
            concurrency: 2,
        }),
        ..PipelineConfig::default()
    };
    let uploader = Uploader::new(CloudDestination::from_store(
        Arc::new(InMemory::new()),
        "data",
    ));
    let pipeline = Pipeline::new(config).unwrap().with_uploader(uploader.clone());

    let summary = pipeline.run().await.unwrap();

    let counts: Vec<(String, usize)> = summary
        .report
        .rows()
        .iter()
        .map(|r| (r.entity.clone(), r.new_count))
        .collect();
    assert_eq!(
        counts,
        vec![("AAA".to_string(), 4), ("BBB".to_string(), 2)]
    );
    assert_eq!(summary.consolidated_rows, None);

    let upload = summary.upload.unwrap();
    assert_eq!(
        upload.uploaded,
        vec!["news/AAA.parquet", "news/BBB.parquet", "watermarks.json"]
    );

    let destination = uploader.destination();
    assert!(destination
        .size_of("news/AAA.parquet")
        .await
        .unwrap()
        .is_some());

    let again = pipeline.run().await.unwrap();
    assert_eq!(again.report.total(), 0);
}

#[tokio::test]
async fn test_pipeline_consolidated_rows() {
    let dir = tempdir().unwrap();
    let raw = dir.path().join("outputs");
    fs::create_dir_all(&raw).unwrap();
    write_csv(&raw.join("AAA.csv"), 0, 3);
    write_csv(&raw.join("BBB.csv"), 3, 2);

    let config = PipelineConfig {
        raw_dir: raw,
        columnar_dir: dir.path().join("s3/news"),
        consolidated_path: Some(dir.path().join("s3/news.parquet")),
        watermark_path: dir.path().join("s3/watermarks.json"),
        entities: vec!["AAA".to_string(), "BBB".to_string(), "CCC".to_string()],
        ..PipelineConfig::default()
    };
    let summary = Pipeline::new(config).unwrap().run().await.unwrap();

    assert_eq!(summary.consolidated_rows, Some(5));
    assert_eq!(summary.report.total(), 5);
    assert_eq!(summary.report.rows().len(), 3);
    assert!(summary.upload.is_none());
    assert!(dir.path().join("s3/watermarks.json").exists());
}
