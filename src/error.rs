//! Error types for the ETL trace monitor
//!
//! Per-span anomalies never surface here: they are absorbed inside the
//! extraction engine. Only structural failures, sink failures and
//! configuration/server problems are reported to callers.

use thiserror::Error;

/// Main error type for the ETL trace monitor
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The trace export did not have a resource/scope/span shape
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Storage or notification failures
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Server-related errors
    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    /// Tracer/exporter setup errors on the instrumentation side
    #[error("Instrumentation error: {0}")]
    Instrumentation(#[from] InstrumentationError),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid output directory path
    #[error("Invalid output directory: {0}")]
    InvalidOutputDir(String),

    /// Invalid or conflicting port
    #[error("Invalid port: {0}")]
    InvalidPort(String),

    /// Missing required configuration field
    #[error("Missing required field: {0}")]
    MissingRequiredField(String),

    /// Invalid URL format
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Structural extraction failures
///
/// A tree that is not a valid tree of resources, scopes and spans has no
/// well-defined partial result, so the whole batch is rejected.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// OTLP/JSON document does not match the resource/scope/span shape
    #[error("Malformed trace export: {0}")]
    MalformedTree(String),

    /// Protobuf body could not be decoded as an export request
    #[error("Invalid protobuf export request: {0}")]
    Protobuf(String),
}

/// Storage and notification errors
#[derive(Error, Debug)]
pub enum SinkError {
    /// Persisting execution records failed
    #[error("Storage failed: {0}")]
    Storage(String),

    /// Arrow conversion or IPC write failed
    #[error("Arrow IPC error: {0}")]
    Arrow(String),

    /// Delivering a failure notification failed
    #[error("Notification failed: {0}")]
    Notification(String),
}

/// Server-related errors
#[derive(Error, Debug)]
pub enum ServerError {
    /// Failed to bind server address
    #[error("Failed to bind server address: {0}")]
    BindError(String),

    /// Failed to start server
    #[error("Failed to start server: {0}")]
    StartupError(String),
}

/// Instrumentation-side errors
#[derive(Error, Debug)]
pub enum InstrumentationError {
    /// The OTLP span exporter could not be built
    #[error("Failed to build span exporter: {0}")]
    ExporterBuild(String),

    /// Flushing or shutting down the tracer provider failed
    #[error("Tracer provider shutdown failed: {0}")]
    Shutdown(String),

    /// A task result was neither empty, a record, nor a list of records
    #[error("Invalid task output: {0}")]
    InvalidOutput(String),
}

impl From<anyhow::Error> for SinkError {
    fn from(err: anyhow::Error) -> Self {
        SinkError::Storage(err.to_string())
    }
}
