//! Build the wire tree from the gRPC request types and from SDK span data
//!
//! Trace identifiers are rendered as lowercase hex. Value kinds the decoder
//! does not understand (bytes, arrays, key-value lists) are carried as
//! untagged values so they are dropped during decoding, the same way unknown
//! OTLP/JSON tags are.

use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::KeyValue as ProtoKeyValue;
use opentelemetry_proto::tonic::common::v1::any_value::Value as ProtoValue;
use opentelemetry_proto::tonic::trace::v1::Span as ProtoSpan;
use opentelemetry_sdk::trace::SpanData;
use std::fmt::Write as _;
use std::time::{SystemTime, UNIX_EPOCH};

use super::model::{
    AnyValue, InstrumentationScope, KeyValue, Resource, ResourceSpans, ScopeSpans, Span, Status,
    StatusCode, TraceExport,
};

impl From<&ExportTraceServiceRequest> for TraceExport {
    fn from(request: &ExportTraceServiceRequest) -> Self {
        let resource_spans = request
            .resource_spans
            .iter()
            .map(|rs| ResourceSpans {
                resource: rs.resource.as_ref().map(|resource| Resource {
                    attributes: convert_proto_attributes(&resource.attributes),
                }),
                scope_spans: rs
                    .scope_spans
                    .iter()
                    .map(|ss| ScopeSpans {
                        scope: ss.scope.as_ref().map(|scope| InstrumentationScope {
                            name: scope.name.clone(),
                            version: scope.version.clone(),
                        }),
                        spans: ss.spans.iter().map(convert_proto_span).collect(),
                    })
                    .collect(),
            })
            .collect();

        TraceExport { resource_spans }
    }
}

fn convert_proto_span(span: &ProtoSpan) -> Span {
    Span {
        trace_id: hex_id(&span.trace_id),
        span_id: hex_id(&span.span_id),
        name: span.name.clone(),
        start_time_unix_nano: span.start_time_unix_nano,
        end_time_unix_nano: span.end_time_unix_nano,
        attributes: convert_proto_attributes(&span.attributes),
        status: span.status.as_ref().map(|status| Status {
            code: StatusCode::from_i32(status.code),
            message: status.message.clone(),
        }),
    }
}

fn convert_proto_attributes(attributes: &[ProtoKeyValue]) -> Vec<KeyValue> {
    attributes
        .iter()
        .map(|kv| {
            let value = match kv.value.as_ref().and_then(|v| v.value.as_ref()) {
                Some(ProtoValue::StringValue(s)) => AnyValue::string(s.clone()),
                Some(ProtoValue::IntValue(i)) => AnyValue::int(*i),
                Some(ProtoValue::BoolValue(b)) => AnyValue::bool(*b),
                Some(ProtoValue::DoubleValue(d)) => AnyValue::double(*d),
                _ => AnyValue::default(),
            };
            KeyValue::new(kv.key.clone(), value)
        })
        .collect()
}

/// Lowercase hex for binary identifiers; all-zero or empty ids become empty
fn hex_id(bytes: &[u8]) -> String {
    if bytes.iter().all(|&b| b == 0) {
        return String::new();
    }
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{:02x}", b);
        out
    })
}

impl TraceExport {
    /// Build a single-resource export from SDK span data
    ///
    /// Spans are grouped by instrumentation scope in order of first appearance.
    pub fn from_span_data(spans: &[SpanData], resource: &[opentelemetry::KeyValue]) -> Self {
        let mut scope_spans: Vec<ScopeSpans> = Vec::new();

        for data in spans {
            let scope_name = data.instrumentation_scope.name();
            let position = scope_spans
                .iter()
                .position(|ss| ss.scope.as_ref().is_some_and(|s| s.name == scope_name));
            let group = match position {
                Some(i) => &mut scope_spans[i],
                None => {
                    scope_spans.push(ScopeSpans {
                        scope: Some(InstrumentationScope {
                            name: scope_name.to_string(),
                            version: data
                                .instrumentation_scope
                                .version()
                                .unwrap_or_default()
                                .to_string(),
                        }),
                        spans: Vec::new(),
                    });
                    let last = scope_spans.len() - 1;
                    &mut scope_spans[last]
                }
            };
            group.spans.push(convert_span_data(data));
        }

        TraceExport {
            resource_spans: vec![ResourceSpans {
                resource: Some(Resource {
                    attributes: convert_sdk_attributes(resource),
                }),
                scope_spans,
            }],
        }
    }
}

fn convert_span_data(data: &SpanData) -> Span {
    use opentelemetry::trace::Status as SdkStatus;

    let trace_id = data.span_context.trace_id();
    let status = match &data.status {
        SdkStatus::Unset => None,
        SdkStatus::Ok => Some(Status {
            code: StatusCode::Ok,
            message: String::new(),
        }),
        SdkStatus::Error { description } => Some(Status {
            code: StatusCode::Error,
            message: description.to_string(),
        }),
    };

    Span {
        trace_id: hex_id(&trace_id.to_bytes()),
        span_id: hex_id(&data.span_context.span_id().to_bytes()),
        name: data.name.to_string(),
        start_time_unix_nano: system_time_nanos(data.start_time),
        end_time_unix_nano: system_time_nanos(data.end_time),
        attributes: convert_sdk_attributes(&data.attributes),
        status,
    }
}

fn convert_sdk_attributes(attributes: &[opentelemetry::KeyValue]) -> Vec<KeyValue> {
    attributes
        .iter()
        .map(|kv| {
            let value = match &kv.value {
                opentelemetry::Value::String(s) => AnyValue::string(s.as_str()),
                opentelemetry::Value::I64(i) => AnyValue::int(*i),
                opentelemetry::Value::Bool(b) => AnyValue::bool(*b),
                opentelemetry::Value::F64(d) => AnyValue::double(*d),
                _ => AnyValue::default(),
            };
            KeyValue::new(kv.key.as_str(), value)
        })
        .collect()
}

fn system_time_nanos(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry_proto::tonic::common::v1::AnyValue as ProtoAnyValue;
    use opentelemetry_proto::tonic::resource::v1::Resource as ProtoResource;
    use opentelemetry_proto::tonic::trace::v1::{
        ResourceSpans as ProtoResourceSpans, ScopeSpans as ProtoScopeSpans,
        Status as ProtoStatus,
    };

    fn proto_kv(key: &str, value: ProtoValue) -> ProtoKeyValue {
        ProtoKeyValue {
            key: key.to_string(),
            value: Some(ProtoAnyValue { value: Some(value) }),
        }
    }

    #[test]
    fn test_proto_request_conversion() {
        let request = ExportTraceServiceRequest {
            resource_spans: vec![ProtoResourceSpans {
                resource: Some(ProtoResource {
                    attributes: vec![proto_kv(
                        "host.name",
                        ProtoValue::StringValue("h1".into()),
                    )],
                    ..Default::default()
                }),
                scope_spans: vec![ProtoScopeSpans {
                    spans: vec![ProtoSpan {
                        trace_id: vec![0xab; 16],
                        span_id: vec![1; 8],
                        name: "load".into(),
                        start_time_unix_nano: 10,
                        end_time_unix_nano: 20,
                        attributes: vec![
                            proto_kv("etl.source_count", ProtoValue::IntValue(5)),
                            proto_kv("blob", ProtoValue::BytesValue(vec![1, 2])),
                        ],
                        status: Some(ProtoStatus {
                            message: "bad".into(),
                            code: 2,
                        }),
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
                ..Default::default()
            }],
        };

        let export = TraceExport::from(&request);
        let span = &export.resource_spans[0].scope_spans[0].spans[0];
        assert_eq!(span.trace_id, "ab".repeat(16));
        assert_eq!(span.start_time_unix_nano, 10);
        assert_eq!(span.attributes[0].value, AnyValue::int(5));
        assert_eq!(span.attributes[1].value, AnyValue::default());
        assert_eq!(span.status.as_ref().unwrap().code, StatusCode::Error);
    }

    #[test]
    fn test_zero_trace_id_becomes_empty() {
        assert_eq!(hex_id(&[0; 16]), "");
        assert_eq!(hex_id(&[]), "");
        assert_eq!(hex_id(&[0x01, 0xff]), "01ff");
    }
}
