//! Producer-side instrumentation feeding the extraction engine
//!
//! Spans are captured with the SDK's in-memory exporter, converted to a trace
//! export and extracted, so these tests cover the attribute contract between
//! both sides.

use etl_trace_monitor::extract::{PlatformType, TraceExport, extract_process_executions};
use etl_trace_monitor::instrument::{
    InstrumentationConfig, SystemInfo, TaskContext, TaskOutput, TaskScope, TelemetryHandle,
};
use opentelemetry::KeyValue;
use opentelemetry::trace::Span as _;
use opentelemetry_sdk::trace::InMemorySpanExporter;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
#[error("row {0} rejected")]
struct RowRejected(u32);

fn handle(exporter: &InMemorySpanExporter) -> TelemetryHandle {
    let config = InstrumentationConfig::new("orders_pipeline")
        .with_platform("Airflow")
        .with_host_name("worker-1");
    TelemetryHandle::with_exporter(config, exporter.clone())
}

fn extract(handle: &TelemetryHandle, exporter: &InMemorySpanExporter) -> TraceExport {
    let spans = exporter.get_finished_spans().unwrap();
    TraceExport::from_span_data(&spans, &handle.resource_attributes())
}

#[test]
fn test_successful_task_becomes_execution_record() {
    let exporter = InMemorySpanExporter::default();
    let handle = handle(&exporter);

    let output = TaskScope::run(
        &handle,
        TaskContext::new("orders", "load_orders").with_script_name("load_orders.py"),
        |scope| {
            scope.set_source(&SystemInfo::s3("raw-bucket", "orders/2024-01-01.csv", Some(120)));
            scope.set_target(&SystemInfo::database(
                "postgresql",
                "db.internal:5432",
                Some("public.orders"),
                Some(118),
            ));

            let mut child = scope.start_child("INSERT orders");
            child.set_attribute(KeyValue::new("db.statement", "INSERT INTO orders VALUES ($1)"));
            child.end();

            Ok::<_, RowRejected>(TaskOutput::from_json(json!([{"id": 1}, {"id": 2}])).unwrap())
        },
    )
    .unwrap();
    assert_eq!(output.process_count(), 2);

    let records = extract_process_executions(&extract(&handle, &exporter));

    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.host_name, "worker-1");
    assert_eq!(record.platform_type, PlatformType::Airflow);
    assert_eq!(record.group_name, "orders");
    assert_eq!(record.process_name, "load_orders");
    assert_eq!(record.script_name, "load_orders.py");
    assert!(record.success);
    assert!(record.duration_seconds >= 0.0);

    assert_eq!(record.source.system_type.as_deref(), Some("s3"));
    assert_eq!(record.source.endpoint.as_deref(), Some("s3://raw-bucket"));
    assert_eq!(record.source.count, Some(120));
    assert_eq!(record.target.system_type.as_deref(), Some("database"));
    assert_eq!(record.target.system_name.as_deref(), Some("postgresql"));
    assert_eq!(record.target.object_name.as_deref(), Some("public.orders"));
    assert_eq!(record.target.count, Some(118));

    let correlated = record.correlated_attributes();
    assert_eq!(correlated.len(), 1);
    assert_eq!(
        correlated[0].get("db.statement"),
        Some(&json!("INSERT INTO orders VALUES ($1)"))
    );
}

#[test]
fn test_failed_task_records_error() {
    let exporter = InMemorySpanExporter::default();
    let handle = handle(&exporter);

    let result = TaskScope::run(&handle, TaskContext::new("orders", "validate"), |_scope| {
        Err::<TaskOutput, _>(RowRejected(7))
    });
    assert!(result.is_err());

    let records = extract_process_executions(&extract(&handle, &exporter));

    assert_eq!(records.len(), 1);
    assert!(!records[0].success);
    assert_eq!(records[0].error_type.as_deref(), Some("RowRejected"));
    assert_eq!(records[0].error_message.as_deref(), Some("row 7 rejected"));
}

#[test]
fn test_panicking_task_is_recorded_as_failure() {
    let exporter = InMemorySpanExporter::default();
    let handle = handle(&exporter);

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _scope = handle.start_task(TaskContext::new("orders", "explode"));
        panic!("unexpected input");
    }));
    assert!(result.is_err());

    let records = extract_process_executions(&extract(&handle, &exporter));

    assert_eq!(records.len(), 1);
    assert!(!records[0].success);
    assert_eq!(records[0].error_type.as_deref(), Some("panic"));
}

#[test]
fn test_separate_tasks_do_not_share_automatic_spans() {
    let exporter = InMemorySpanExporter::default();
    let handle = handle(&exporter);

    {
        let scope = handle.start_task(TaskContext::new("orders", "first"));
        let mut child = scope.start_child("GET");
        child.set_attribute(KeyValue::new("http.url", "https://api.example.com/a"));
        child.end();
    }
    {
        let _scope = handle.start_task(TaskContext::new("orders", "second"));
    }

    let records = extract_process_executions(&extract(&handle, &exporter));

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].process_name, "first");
    assert_eq!(records[0].correlated_attributes().len(), 1);
    assert_eq!(records[1].process_name, "second");
    assert!(records[1].correlated_attributes().is_empty());
    assert!(records[1].auto_json.is_none());
}

#[test]
fn test_manual_fail_without_error() {
    let exporter = InMemorySpanExporter::default();
    let handle = handle(&exporter);

    {
        let mut scope = handle.start_task(TaskContext::new("orders", "reconcile"));
        scope.fail("MismatchError", "3 rows differ");
        assert!(scope.is_failed());
    }

    let records = extract_process_executions(&extract(&handle, &exporter));
    assert_eq!(records[0].error_type.as_deref(), Some("MismatchError"));
    assert_eq!(records[0].error_message.as_deref(), Some("3 rows differ"));
}
