//! ETL Trace Monitor
//!
//! Receives OpenTelemetry traces emitted by instrumented ETL jobs (Airflow
//! tasks, NiFi processors, plain scripts) and rebuilds them into process
//! execution records: one per manually instrumented task span, enriched with
//! the automatic spans recorded in the same trace.
//!
//! # Features
//!
//! - Pure, synchronous extraction engine over OTLP/JSON, protobuf and gRPC requests
//! - OTLP gRPC trace receiver
//! - Arrow IPC execution record storage with rotation and retention
//! - Failure alerts over a JSON webhook
//! - Producer-side task instrumentation with scoped spans
//! - Configurable via YAML, environment variables, or programmatic API
//!
//! # Example
//!
//! ```no_run
//! use etl_trace_monitor::extract_from_json;
//!
//! # fn example(body: &str) -> Result<(), etl_trace_monitor::MonitorError> {
//! for record in extract_from_json(body)? {
//!     println!("{} {} success={}", record.group_name, record.process_name, record.success);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod error;
pub mod extract;
pub mod instrument;
pub mod otlp;
pub mod sink;

// Re-export public API
pub use api::monitor::EtlMonitor;
pub use api::pipeline::{BatchOutcome, ExecutionPipeline};
pub use config::{Config, ConfigBuilder, ConfigLoader, NotificationConfig};
pub use error::{
    ConfigError, ExtractionError, InstrumentationError, MonitorError, ServerError, SinkError,
};
pub use extract::{
    ExecutionRecord, PlatformType, SystemDescriptor, TraceExport, extract_from_json,
    extract_from_protobuf, extract_from_request, extract_process_executions,
};
pub use otlp::EtlTraceServer;
pub use sink::{
    Alert, ArrowExecutionStore, ExecutionStore, FailureNotifier, LogNotifier, RecordId,
    WebhookNotifier,
};

// Initialize tracing subscriber for structured logging
use tracing_subscriber::EnvFilter;

/// Initialize structured logging
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init();
}
