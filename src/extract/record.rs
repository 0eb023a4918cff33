//! Execution records and the builder that assembles them from manual spans

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

use super::attributes::{AttributeMap, AttributeValue, decode_attributes};
use super::index::AutoSpanIndex;
use super::model::{Span, StatusCode};
use super::timing::resolve_timing;

/// Required identity attribute; spans without it produce no record
pub const PROCESS_NAME_KEY: &str = "etl.process_name";
pub const GROUP_NAME_KEY: &str = "etl.group_name";
pub const SCRIPT_NAME_KEY: &str = "etl.script_name";
pub const PLATFORM_KEY: &str = "etl.platform";
pub const ERROR_MESSAGE_KEY: &str = "etl.error_message";
pub const ERROR_TYPE_KEY: &str = "etl.error_type";
pub const PROCESS_COUNT_KEY: &str = "etl.process_count";
const LEGACY_ERROR_KEY: &str = "etl.error";

/// Resource attribute naming the emitting host
pub const HOST_NAME_KEY: &str = "host.name";
/// Sentinel for identity fields nobody reported
pub const UNKNOWN: &str = "unknown";

const CODE_FILEPATH_KEYS: [&str; 2] = ["code.filepath", "code.file.path"];

/// Orchestration platform a process ran on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformType {
    Airflow,
    NiFi,
    /// A platform name reported verbatim by the span
    Other(String),
}

impl PlatformType {
    /// Interpret an explicit platform attribute value
    pub fn from_attribute(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "airflow" => PlatformType::Airflow,
            "nifi" => PlatformType::NiFi,
            _ => PlatformType::Other(value.to_string()),
        }
    }

    /// Guess the platform from naming conventions
    ///
    /// Airflow task spans carry the operator name and DAG groups are usually
    /// named after the DAG; everything else is assumed to be NiFi.
    pub fn infer(span_name: &str, group_name: &str) -> Self {
        if span_name.to_lowercase().contains("airflow") || group_name.to_lowercase().contains("dag")
        {
            PlatformType::Airflow
        } else {
            PlatformType::NiFi
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PlatformType::Airflow => "Airflow",
            PlatformType::NiFi => "NiFi",
            PlatformType::Other(name) => name,
        }
    }
}

impl fmt::Display for PlatformType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for PlatformType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PlatformType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(PlatformType::from_attribute(&name))
    }
}

/// Source or target system touched by a process
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemDescriptor {
    pub system_type: Option<String>,
    pub system_name: Option<String>,
    pub endpoint: Option<String>,
    pub object_name: Option<String>,
    pub count: Option<i64>,
}

impl SystemDescriptor {
    /// True when the span carried none of the descriptor attributes
    pub fn is_empty(&self) -> bool {
        self.system_type.is_none()
            && self.system_name.is_none()
            && self.endpoint.is_none()
            && self.object_name.is_none()
            && self.count.is_none()
    }

    /// Read `etl.<side>_system_type`, `etl.<side>_system_name`, ... verbatim
    fn from_attributes(attributes: &AttributeMap, side: &str) -> Self {
        let text = |field: &str| {
            attributes
                .get(&format!("etl.{}_{}", side, field))
                .map(|v| v.to_string())
        };
        let count_key = format!("etl.{}_count", side);

        Self {
            system_type: text("system_type"),
            system_name: text("system_name"),
            endpoint: text("endpoint"),
            object_name: text("object_name"),
            count: attributes
                .get(&count_key)
                .and_then(|value| coerce_count(&count_key, value)),
        }
    }
}

/// One reconstructed ETL process run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub host_name: String,
    pub platform_type: PlatformType,
    pub group_name: String,
    pub process_name: String,
    pub script_name: String,
    pub success: bool,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
    pub source: SystemDescriptor,
    pub target: SystemDescriptor,
    /// JSON array of the attribute maps of correlated automatic spans
    pub auto_json: Option<String>,
}

impl ExecutionRecord {
    /// Correlated automatic-span attribute maps, decoded from `auto_json`
    pub fn correlated_attributes(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.auto_json
            .as_deref()
            .and_then(|json| serde_json::from_str(json).ok())
            .unwrap_or_default()
    }
}

/// Build the execution record for one manual span
///
/// Returns `None` when the span lacks `etl.process_name`; that is a filtering
/// rule, not an error.
pub fn build_record(
    span: &Span,
    resource_attributes: &BTreeMap<String, String>,
    index: &AutoSpanIndex<'_>,
) -> Option<ExecutionRecord> {
    let attributes = decode_attributes(&span.attributes);

    let Some(process_name) = attributes.get(PROCESS_NAME_KEY).map(|v| v.to_string()) else {
        debug!(
            span_name = %span.name,
            "Span has no {} attribute, skipping",
            PROCESS_NAME_KEY
        );
        return None;
    };

    let host_name = resource_attributes
        .get(HOST_NAME_KEY)
        .cloned()
        .unwrap_or_else(|| UNKNOWN.to_string());

    let timing = resolve_timing(span, &attributes);

    let success = span
        .status
        .as_ref()
        .is_none_or(|status| status.code != StatusCode::Error);

    let group_name = attributes
        .get(GROUP_NAME_KEY)
        .map(|v| v.to_string())
        .unwrap_or_else(|| UNKNOWN.to_string());

    let platform_type = match attributes.get(PLATFORM_KEY) {
        Some(value) => PlatformType::from_attribute(&value.to_string()),
        None => PlatformType::infer(&span.name, &group_name),
    };

    let script_name = resolve_script_name(span, &attributes);

    let (error_type, error_message) = if success {
        (None, None)
    } else {
        let message = attributes
            .get(ERROR_MESSAGE_KEY)
            .or_else(|| attributes.get(LEGACY_ERROR_KEY))
            .map(|v| v.to_string())
            .or_else(|| {
                span.status
                    .as_ref()
                    .map(|s| s.message.clone())
                    .filter(|m| !m.is_empty())
            });
        (attributes.get(ERROR_TYPE_KEY).map(|v| v.to_string()), message)
    };

    let auto_json = correlate(span, index);

    Some(ExecutionRecord {
        host_name,
        platform_type,
        group_name,
        process_name,
        script_name,
        success,
        error_type,
        error_message,
        start_time: timing.start,
        end_time: timing.end,
        duration_seconds: timing.duration_seconds,
        source: SystemDescriptor::from_attributes(&attributes, "source"),
        target: SystemDescriptor::from_attributes(&attributes, "target"),
        auto_json,
    })
}

fn resolve_script_name(span: &Span, attributes: &AttributeMap) -> String {
    if let Some(script) = attributes.get(SCRIPT_NAME_KEY) {
        return script.to_string();
    }
    CODE_FILEPATH_KEYS
        .iter()
        .find_map(|key| attributes.get(*key).and_then(|v| v.as_str()))
        .and_then(|path| Path::new(path).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| span.name.clone())
}

fn correlate(span: &Span, index: &AutoSpanIndex<'_>) -> Option<String> {
    let matched = index.lookup(&span.trace_id)?;
    let maps: Vec<&AttributeMap> = matched.iter().map(|auto| &auto.attributes).collect();
    match serde_json::to_string(&maps) {
        Ok(json) => Some(json),
        Err(e) => {
            warn!(
                trace_id = %span.trace_id,
                error = %e,
                "Failed to serialize correlated automatic spans"
            );
            None
        }
    }
}

fn coerce_count(key: &str, value: &AttributeValue) -> Option<i64> {
    let count = match value {
        AttributeValue::Int(i) => Some(*i),
        AttributeValue::String(s) => s.trim().parse::<i64>().ok(),
        AttributeValue::Double(d) if d.fract() == 0.0 && d.is_finite() => Some(*d as i64),
        _ => None,
    };
    if count.is_none() {
        debug!(key = %key, value = %value, "Ignoring non-numeric record count");
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::model::{AnyValue, KeyValue, Status, TraceExport};

    fn manual_span(extra: Vec<KeyValue>) -> Span {
        let mut attributes = vec![KeyValue::new(PROCESS_NAME_KEY, AnyValue::string("load"))];
        attributes.extend(extra);
        Span {
            trace_id: "t1".into(),
            name: "load_task".into(),
            start_time_unix_nano: 1_000_000_000,
            end_time_unix_nano: 2_000_000_000,
            attributes,
            ..Default::default()
        }
    }

    fn build(span: &Span) -> Option<ExecutionRecord> {
        let empty = TraceExport::default();
        let index = AutoSpanIndex::build(&empty);
        build_record(span, &BTreeMap::new(), &index)
    }

    #[test]
    fn test_defaults_for_missing_identity() {
        let record = build(&manual_span(vec![])).unwrap();
        assert_eq!(record.host_name, UNKNOWN);
        assert_eq!(record.group_name, UNKNOWN);
        assert_eq!(record.script_name, "load_task");
        assert_eq!(record.platform_type, PlatformType::NiFi);
        assert!(record.success);
        assert!(record.auto_json.is_none());
        assert!(record.source.is_empty());
    }

    #[test]
    fn test_platform_heuristics() {
        let dag_group = manual_span(vec![KeyValue::new(
            GROUP_NAME_KEY,
            AnyValue::string("daily_DAG_load"),
        )]);
        assert_eq!(build(&dag_group).unwrap().platform_type, PlatformType::Airflow);

        let mut airflow_name = manual_span(vec![]);
        airflow_name.name = "AirflowTask".into();
        assert_eq!(build(&airflow_name).unwrap().platform_type, PlatformType::Airflow);

        let explicit = manual_span(vec![KeyValue::new(PLATFORM_KEY, AnyValue::string("AirFlow"))]);
        assert_eq!(build(&explicit).unwrap().platform_type, PlatformType::Airflow);

        let custom = manual_span(vec![KeyValue::new(PLATFORM_KEY, AnyValue::string("Dagster"))]);
        assert_eq!(
            build(&custom).unwrap().platform_type,
            PlatformType::Other("Dagster".into())
        );
    }

    #[test]
    fn test_script_name_from_code_filepath() {
        let span = manual_span(vec![KeyValue::new(
            "code.filepath",
            AnyValue::string("/opt/etl/scripts/extract.py"),
        )]);
        assert_eq!(build(&span).unwrap().script_name, "extract.py");
    }

    #[test]
    fn test_error_fields_only_on_failure() {
        let errors = vec![
            KeyValue::new(ERROR_TYPE_KEY, AnyValue::string("ValueError")),
            KeyValue::new(LEGACY_ERROR_KEY, AnyValue::string("boom")),
        ];

        let ok = build(&manual_span(errors.clone())).unwrap();
        assert!(ok.success);
        assert!(ok.error_type.is_none());
        assert!(ok.error_message.is_none());

        let mut failed_span = manual_span(errors);
        failed_span.status = Some(Status {
            code: StatusCode::Error,
            message: "ignored".into(),
        });
        let failed = build(&failed_span).unwrap();
        assert!(!failed.success);
        assert_eq!(failed.error_type.as_deref(), Some("ValueError"));
        assert_eq!(failed.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_status_message_used_when_no_error_attribute() {
        let mut span = manual_span(vec![]);
        span.status = Some(Status {
            code: StatusCode::Error,
            message: "connection refused".into(),
        });
        let record = build(&span).unwrap();
        assert_eq!(record.error_message.as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_unset_status_counts_as_success() {
        let mut span = manual_span(vec![]);
        span.status = Some(Status::default());
        assert!(build(&span).unwrap().success);
    }

    #[test]
    fn test_descriptor_fields_and_count_coercion() {
        let span = manual_span(vec![
            KeyValue::new("etl.source_system_type", AnyValue::string("database")),
            KeyValue::new("etl.source_system_name", AnyValue::string("mysql")),
            KeyValue::new("etl.source_count", AnyValue::int(10)),
            KeyValue::new("etl.target_object_name", AnyValue::string("out.csv")),
            KeyValue::new("etl.target_count", AnyValue::string(" 42 ")),
        ]);
        let record = build(&span).unwrap();
        assert_eq!(record.source.system_type.as_deref(), Some("database"));
        assert_eq!(record.source.system_name.as_deref(), Some("mysql"));
        assert_eq!(record.source.count, Some(10));
        assert!(record.source.endpoint.is_none());
        assert_eq!(record.target.object_name.as_deref(), Some("out.csv"));
        assert_eq!(record.target.count, Some(42));
    }

    #[test]
    fn test_non_numeric_count_is_dropped() {
        let span = manual_span(vec![KeyValue::new("etl.target_count", AnyValue::string("many"))]);
        assert_eq!(build(&span).unwrap().target.count, None);
    }

    #[test]
    fn test_platform_round_trips_through_serde() {
        let json = serde_json::to_string(&PlatformType::NiFi).unwrap();
        assert_eq!(json, "\"NiFi\"");
        let back: PlatformType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, PlatformType::NiFi);
    }
}
