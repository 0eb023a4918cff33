//! Trace-to-execution-record extraction
//!
//! Turns one decoded trace export into the ordered list of execution records
//! it describes. The engine is pure and synchronous: every call builds its
//! own automatic-span index and shares nothing with other calls, so
//! independent exports can be extracted concurrently.
//!
//! # Passes
//!
//! 1. Walk every span and index the automatic ones by trace identifier.
//! 2. Walk again in resource → scope → span order and build a record for each
//!    manual span, attaching the correlated automatic spans from the index.
//!
//! Per-span problems (undecodable attributes, malformed timestamps, missing
//! identity) degrade or filter that span only. Structural problems are
//! reported by the parsing entry points before any span is looked at.

pub mod attributes;
pub mod classify;
pub mod convert;
pub mod index;
pub mod model;
pub mod record;
pub mod timing;

use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use prost::Message;
use tracing::debug;

use crate::error::ExtractionError;

pub use attributes::{AttributeMap, AttributeValue};
pub use classify::{RESERVED_PREFIX, SpanOrigin};
pub use index::AutoSpanIndex;
pub use model::TraceExport;
pub use record::{ExecutionRecord, PlatformType, SystemDescriptor};
pub use timing::Timing;

use attributes::{decode_attributes, decode_resource_attributes};
use classify::classify;
use record::build_record;

/// Extract execution records from a decoded trace export
pub fn extract_process_executions(export: &TraceExport) -> Vec<ExecutionRecord> {
    let index = AutoSpanIndex::build(export);
    let mut records = Vec::new();

    for resource_spans in &export.resource_spans {
        let resource_attributes = resource_spans
            .resource
            .as_ref()
            .map(|resource| decode_resource_attributes(&resource.attributes))
            .unwrap_or_default();

        for scope_spans in &resource_spans.scope_spans {
            for span in &scope_spans.spans {
                if classify(&decode_attributes(&span.attributes)) != SpanOrigin::Manual {
                    continue;
                }
                if let Some(record) = build_record(span, &resource_attributes, &index) {
                    records.push(record);
                }
            }
        }
    }

    debug!(
        resource_groups = export.resource_spans.len(),
        automatic_spans = index.span_count(),
        records = records.len(),
        "Extracted process executions"
    );

    records
}

/// Parse an OTLP/JSON trace export and extract its records
pub fn extract_from_json(json: &str) -> Result<Vec<ExecutionRecord>, ExtractionError> {
    let export: TraceExport = serde_json::from_str(json)
        .map_err(|e| ExtractionError::MalformedTree(e.to_string()))?;
    Ok(extract_process_executions(&export))
}

/// Extract records from a gRPC export request
pub fn extract_from_request(request: &ExportTraceServiceRequest) -> Vec<ExecutionRecord> {
    extract_process_executions(&TraceExport::from(request))
}

/// Decode a protobuf-encoded export request body and extract its records
pub fn extract_from_protobuf(body: &[u8]) -> Result<Vec<ExecutionRecord>, ExtractionError> {
    let request = ExportTraceServiceRequest::decode(body)
        .map_err(|e| ExtractionError::Protobuf(e.to_string()))?;
    Ok(extract_from_request(&request))
}
