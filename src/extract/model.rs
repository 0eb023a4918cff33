//! Wire-format trace tree
//!
//! Mirrors the OTLP export shape (resource → scope → span) as it arrives from
//! the collector once the transport layer has decoded it. Field names follow
//! the OTLP/JSON mapping so an exported JSON document deserializes directly;
//! the gRPC path builds the same tree in [`crate::extract::convert`].
//!
//! Value payloads are kept loosely typed on purpose: `intValue` is a string in
//! OTLP/JSON, and unknown value kinds must be dropped by the decoder rather
//! than rejected while parsing. The same holds below the span level: a
//! malformed attribute, timestamp or status degrades to "absent" instead of
//! failing the whole export. Only the tree shape itself is enforced.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

/// A full trace export: one or more resource groups
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceExport {
    /// Resource groups, in source order
    #[serde(default)]
    pub resource_spans: Vec<ResourceSpans>,
}

/// Spans emitted by one process (resource)
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpans {
    /// Resource description, including `host.name`
    #[serde(default)]
    pub resource: Option<Resource>,
    /// Scope groups, in source order
    #[serde(default)]
    pub scope_spans: Vec<ScopeSpans>,
}

/// Resource attribute set
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    #[serde(default, deserialize_with = "attributes_from_json")]
    pub attributes: Vec<KeyValue>,
}

/// Spans emitted by one instrumentation scope
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeSpans {
    #[serde(default)]
    pub scope: Option<InstrumentationScope>,
    /// Spans, in source order
    #[serde(default)]
    pub spans: Vec<Span>,
}

/// Instrumentation library that produced a scope group
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentationScope {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// Immutable wire span
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    /// Opaque trace identifier; empty when the exporter sent none
    #[serde(default)]
    pub trace_id: String,
    #[serde(default)]
    pub span_id: String,
    #[serde(default)]
    pub name: String,
    /// Nanoseconds since the Unix epoch
    #[serde(default, deserialize_with = "nanos_from_json")]
    pub start_time_unix_nano: u64,
    /// Nanoseconds since the Unix epoch
    #[serde(default, deserialize_with = "nanos_from_json")]
    pub end_time_unix_nano: u64,
    #[serde(default, deserialize_with = "attributes_from_json")]
    pub attributes: Vec<KeyValue>,
    /// Absent status means OK
    #[serde(default, deserialize_with = "status_from_json")]
    pub status: Option<Status>,
}

/// Span status
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    #[serde(default)]
    pub code: StatusCode,
    #[serde(default)]
    pub message: String,
}

/// Span status code
///
/// OTLP/JSON producers emit either the enum number or its proto name
/// (`STATUS_CODE_ERROR`), so both forms are accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum StatusCode {
    /// Not set by the producer; counted as a success just like `Ok`
    #[default]
    Unset,
    Ok,
    Error,
}

impl StatusCode {
    /// Map the proto enum number; unknown numbers are treated as unset
    pub fn from_i32(code: i32) -> Self {
        match code {
            1 => StatusCode::Ok,
            2 => StatusCode::Error,
            _ => StatusCode::Unset,
        }
    }
}

impl<'de> Deserialize<'de> for StatusCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Value::deserialize(deserializer)?;
        let code = match &raw {
            Value::Number(n) => n
                .as_i64()
                .map(|n| StatusCode::from_i32(n as i32))
                .unwrap_or_default(),
            Value::String(s) => match s.to_ascii_uppercase().as_str() {
                "STATUS_CODE_OK" | "OK" => StatusCode::Ok,
                "STATUS_CODE_ERROR" | "ERROR" => StatusCode::Error,
                _ => StatusCode::Unset,
            },
            Value::Null => StatusCode::Unset,
            other => {
                debug!(code = %other, "Ignoring status code of unexpected shape");
                StatusCode::Unset
            }
        };
        Ok(code)
    }
}

/// Attribute key with a tagged value
///
/// A `value` that is not a tag object (null, a bare scalar) parses as an
/// empty value, which the decoder then drops.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KeyValue {
    pub key: String,
    pub value: AnyValue,
}

impl<'de> Deserialize<'de> for KeyValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Value::Object(mut fields) = Value::deserialize(deserializer)? else {
            return Ok(KeyValue::default());
        };

        let key = match fields.remove("key") {
            Some(Value::String(key)) => key,
            _ => String::new(),
        };
        let value = fields
            .remove("value")
            .filter(Value::is_object)
            .and_then(|raw| serde_json::from_value(raw).ok())
            .unwrap_or_default();

        Ok(KeyValue { key, value })
    }
}

/// Tagged attribute value
///
/// At most one tag is normally set. Tags this engine does not understand
/// (`arrayValue`, `kvlistValue`, `bytesValue`, future kinds) are ignored while
/// parsing, leaving every field empty.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnyValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub int_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bool_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub double_value: Option<Value>,
}

impl AnyValue {
    /// String-tagged value
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            string_value: Some(Value::String(value.into())),
            ..Default::default()
        }
    }

    /// Integer-tagged value, encoded the way OTLP/JSON does (decimal string)
    pub fn int(value: i64) -> Self {
        Self {
            int_value: Some(Value::String(value.to_string())),
            ..Default::default()
        }
    }

    /// Boolean-tagged value
    pub fn bool(value: bool) -> Self {
        Self {
            bool_value: Some(Value::Bool(value)),
            ..Default::default()
        }
    }

    /// Double-tagged value; non-finite numbers use their OTLP/JSON names
    pub fn double(value: f64) -> Self {
        let encoded = serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_string()));
        Self {
            double_value: Some(encoded),
            ..Default::default()
        }
    }
}

impl KeyValue {
    /// Convenience constructor
    pub fn new(key: impl Into<String>, value: AnyValue) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

// OTLP/JSON encodes 64-bit integers as strings; older exporters use numbers.
// Anything else (negative, fractional, garbage) reads as absent.
fn nanos_from_json<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    let nanos = match &raw {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        Value::Null => Some(0),
        _ => None,
    };
    Ok(nanos.unwrap_or_else(|| {
        debug!(timestamp = %raw, "Ignoring unparseable span timestamp");
        0
    }))
}

fn status_from_json<'de, D>(deserializer: D) -> Result<Option<Status>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    if !raw.is_object() {
        if !raw.is_null() {
            debug!(status = %raw, "Ignoring span status of unexpected shape");
        }
        return Ok(None);
    }
    Ok(serde_json::from_value(raw).ok())
}

// Entries without a key carry nothing to look up and are skipped; a list that
// is not an array reads as empty.
fn attributes_from_json<'de, D>(deserializer: D) -> Result<Vec<KeyValue>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Array(entries) = Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };

    Ok(entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<KeyValue>(entry).ok())
        .filter(|kv| !kv.key.is_empty())
        .collect())
}
