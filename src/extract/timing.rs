//! Start/end resolution for execution records
//!
//! Instrumented task code writes its own wall-clock start and end as ISO-8601
//! string attributes. Those take precedence over the span's native
//! timestamps, which come from the tracer clock and can be skewed. The native
//! timestamps are the fallback whenever the strings are missing or malformed,
//! so resolution never leaves a gap.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tracing::warn;

use super::attributes::AttributeMap;
use super::model::Span;

/// Attribute carrying the task start instant
pub const START_TIME_KEY: &str = "etl.start_time";
/// Attribute carrying the task end instant
pub const END_TIME_KEY: &str = "etl.end_time";

const LEGACY_START_TIME_KEY: &str = "start_time";
const LEGACY_END_TIME_KEY: &str = "end_time";

/// Where the resolved instants came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingSource {
    /// Explicit ISO-8601 string attributes
    Attributes,
    /// The span's native nanosecond timestamps
    SpanTimestamps,
}

/// Resolved timing of one span
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// `end - start` in seconds; negative values are reported, not clamped
    pub duration_seconds: f64,
    pub source: TimingSource,
}

/// Resolve start, end and duration for a span
pub fn resolve_timing(span: &Span, attributes: &AttributeMap) -> Timing {
    let (start, end, source) = match explicit_instants(span, attributes) {
        Some((start, end)) => (start, end, TimingSource::Attributes),
        None => (
            instant_from_nanos(span.start_time_unix_nano),
            instant_from_nanos(span.end_time_unix_nano),
            TimingSource::SpanTimestamps,
        ),
    };

    let duration_seconds = seconds_between(start, end);
    if duration_seconds < 0.0 {
        warn!(
            span_name = %span.name,
            trace_id = %span.trace_id,
            duration_seconds,
            "Span ends before it starts"
        );
    }

    Timing {
        start,
        end,
        duration_seconds,
        source,
    }
}

/// Parse an ISO-8601 instant
///
/// Accepts RFC 3339 with an offset, or a naive local date-time
/// (`2024-01-01T00:00:00`, optional fraction, `T` or space separator) which is
/// read as UTC. Minute precision (`2024-01-01T00:00`) and a bare date
/// (midnight) are accepted too.
pub fn parse_instant(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
    .or_else(|| {
        NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
    })
    .map(|naive| naive.and_utc())
}

pub fn instant_from_nanos(nanos: u64) -> DateTime<Utc> {
    let secs = (nanos / 1_000_000_000) as i64;
    let subsec = (nanos % 1_000_000_000) as u32;
    DateTime::from_timestamp(secs, subsec).unwrap_or_default()
}

fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let delta = end - start;
    match delta.num_nanoseconds() {
        Some(nanos) => nanos as f64 / 1e9,
        None => delta.num_milliseconds() as f64 / 1e3,
    }
}

fn explicit_instants(
    span: &Span,
    attributes: &AttributeMap,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let lookup = |primary: &str, legacy: &str| {
        attributes
            .get(primary)
            .or_else(|| attributes.get(legacy))
            .and_then(|v| v.as_str())
    };

    let start_text = lookup(START_TIME_KEY, LEGACY_START_TIME_KEY)?;
    let end_text = lookup(END_TIME_KEY, LEGACY_END_TIME_KEY)?;

    match (parse_instant(start_text), parse_instant(end_text)) {
        (Some(start), Some(end)) => Some((start, end)),
        _ => {
            warn!(
                span_name = %span.name,
                start_time = %start_text,
                end_time = %end_text,
                "Malformed timing attributes, using span timestamps"
            );
            None
        }
    }
}
