//! Integration tests for Arrow IPC execution storage

use arrow::array::{Array, BooleanArray, Float64Array, StringArray, UInt64Array};
use chrono::{TimeZone, Utc};
use etl_trace_monitor::config::StorageConfig;
use etl_trace_monitor::extract::{ExecutionRecord, PlatformType, SystemDescriptor};
use etl_trace_monitor::sink::store::{EXECUTIONS_DIR, read_execution_file};
use etl_trace_monitor::sink::{ArrowExecutionStore, ExecutionStore, RecordId};
use std::path::PathBuf;
use tempfile::TempDir;

fn record(process: &str, error: Option<&str>) -> ExecutionRecord {
    let start = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    ExecutionRecord {
        host_name: "worker-3".into(),
        platform_type: PlatformType::Airflow,
        group_name: "nightly_dag".into(),
        process_name: process.into(),
        script_name: format!("{}.py", process),
        success: error.is_none(),
        error_type: error.map(|_| "RuntimeError".to_string()),
        error_message: error.map(str::to_string),
        start_time: start,
        end_time: start + chrono::Duration::milliseconds(1500),
        duration_seconds: 1.5,
        source: SystemDescriptor::default(),
        target: SystemDescriptor {
            system_type: Some("database".into()),
            system_name: Some("postgresql".into()),
            count: Some(10),
            ..Default::default()
        },
        auto_json: Some(r#"[{"db.statement":"INSERT"}]"#.into()),
    }
}

fn execution_files(dir: &std::path::Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("arrows"))
        .collect();
    files.sort();
    files
}

#[tokio::test]
async fn test_records_round_trip_through_file() {
    let dir = TempDir::new().unwrap();
    let store = ArrowExecutionStore::open(dir.path(), 1024 * 1024).unwrap();

    let ids = store
        .save_batch(vec![record("extract", None), record("load", Some("disk full"))])
        .await
        .unwrap();
    assert_eq!(ids, vec![RecordId(1), RecordId(2)]);

    let path = store.current_file().await.unwrap();
    store.close().await.unwrap();

    let batches = read_execution_file(&path).unwrap();
    assert_eq!(batches.len(), 1);
    let batch = &batches[0];
    assert_eq!(batch.num_rows(), 2);

    let processes = batch
        .column_by_name("process_name")
        .unwrap()
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    assert_eq!(processes.value(0), "extract");
    assert_eq!(processes.value(1), "load");

    let success = batch
        .column_by_name("success")
        .unwrap()
        .as_any()
        .downcast_ref::<BooleanArray>()
        .unwrap();
    assert!(success.value(0));
    assert!(!success.value(1));

    let messages = batch
        .column_by_name("error_message")
        .unwrap()
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    assert!(messages.is_null(0));
    assert_eq!(messages.value(1), "disk full");

    let platforms = batch
        .column_by_name("platform_type")
        .unwrap()
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    assert_eq!(platforms.value(0), "Airflow");

    let durations = batch
        .column_by_name("duration_seconds")
        .unwrap()
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap();
    assert_eq!(durations.value(0), 1.5);

    let ids = batch
        .column_by_name("id")
        .unwrap()
        .as_any()
        .downcast_ref::<UInt64Array>()
        .unwrap();
    assert_eq!(ids.values().to_vec(), vec![1, 2]);
}

#[tokio::test]
async fn test_rotation_when_file_exceeds_max_size() {
    let dir = TempDir::new().unwrap();
    // Every batch overflows a one-byte limit, so each write after the first rotates
    let store = ArrowExecutionStore::open(dir.path(), 1).unwrap();

    for name in ["a", "b", "c"] {
        store.save_batch(vec![record(name, None)]).await.unwrap();
    }
    store.close().await.unwrap();

    let files = execution_files(dir.path());
    assert_eq!(files.len(), 3);

    let total_rows: usize = files
        .iter()
        .flat_map(|f| read_execution_file(f).unwrap())
        .map(|b| b.num_rows())
        .sum();
    assert_eq!(total_rows, 3);
}

#[tokio::test]
async fn test_store_uses_executions_subdirectory() {
    let dir = TempDir::new().unwrap();
    let config = StorageConfig {
        output_dir: dir.path().to_path_buf(),
        ..Default::default()
    };

    let store = ArrowExecutionStore::new(&config).unwrap();
    store.save_batch(vec![record("a", None)]).await.unwrap();
    store.flush().await.unwrap();

    assert_eq!(store.output_dir(), dir.path().join(EXECUTIONS_DIR));
    assert_eq!(execution_files(&dir.path().join(EXECUTIONS_DIR)).len(), 1);
}

#[tokio::test]
async fn test_cleanup_removes_expired_files_but_not_active_one() {
    let dir = TempDir::new().unwrap();
    let store = ArrowExecutionStore::open(dir.path(), 1).unwrap();

    store.save_batch(vec![record("old", None)]).await.unwrap();
    store.save_batch(vec![record("current", None)]).await.unwrap();
    let active = store.current_file().await.unwrap();
    assert_eq!(execution_files(dir.path()).len(), 2);

    // Let both files age past a one-second retention
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    let deleted = store.cleanup(1).await.unwrap();

    assert_eq!(deleted, 1);
    assert_eq!(execution_files(dir.path()), vec![active]);
}

#[tokio::test]
async fn test_cleanup_keeps_recent_files() {
    let dir = TempDir::new().unwrap();
    let store = ArrowExecutionStore::open(dir.path(), 1).unwrap();

    store.save_batch(vec![record("a", None)]).await.unwrap();
    store.save_batch(vec![record("b", None)]).await.unwrap();

    let deleted = store.cleanup(3600).await.unwrap();

    assert_eq!(deleted, 0);
    assert_eq!(execution_files(dir.path()).len(), 2);
}

#[tokio::test]
async fn test_concurrent_writes_get_unique_ids() {
    let dir = TempDir::new().unwrap();
    let store = ArrowExecutionStore::open(dir.path(), 1024 * 1024).unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .save_batch(vec![record(&format!("p{}", i), None); 2])
                .await
                .unwrap()
        }));
    }

    let mut ids: Vec<u64> = Vec::new();
    for handle in handles {
        ids.extend(handle.await.unwrap().into_iter().map(|id| id.0));
    }
    ids.sort_unstable();

    assert_eq!(ids, (1..=16).collect::<Vec<_>>());
}
