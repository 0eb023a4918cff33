//! Producer-side instrumentation
//!
//! Helpers for ETL jobs written in Rust to emit spans the extraction engine
//! understands: one task span per process run carrying the `etl.*`
//! attributes, plus ordinary child spans that end up correlated with it.

pub mod handle;
pub mod output;
pub mod scope;
pub mod system;

pub use handle::{InstrumentationConfig, TelemetryHandle};
pub use output::{OutputRecord, TaskOutput};
pub use scope::{TaskContext, TaskScope};
pub use system::{SystemInfo, SystemType};
