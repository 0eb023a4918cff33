//! Manual vs automatic span classification

use super::attributes::AttributeMap;

/// Key prefix reserved for attributes written by ETL task instrumentation
pub const RESERVED_PREFIX: &str = "etl.";

/// Origin of a span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanOrigin {
    /// Explicitly emitted by ETL task code
    Manual,
    /// Emitted transparently by client-library auto-instrumentation
    Automatic,
}

/// Classify a span by its decoded attributes
pub fn classify(attributes: &AttributeMap) -> SpanOrigin {
    if attributes.keys().any(|key| key.starts_with(RESERVED_PREFIX)) {
        SpanOrigin::Manual
    } else {
        SpanOrigin::Automatic
    }
}
