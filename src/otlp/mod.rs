//! OpenTelemetry Protocol (OTLP) ingestion
//!
//! Provides the gRPC trace receiver feeding the execution pipeline.

pub mod server;

pub use server::{EtlTraceServer, TraceServiceImpl};
