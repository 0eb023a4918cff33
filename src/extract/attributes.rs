//! Attribute decoding
//!
//! Turns tagged wire values into native values. Decoding is total: a value
//! either decodes or is dropped, and a dropped value never stops the
//! surrounding span from being processed.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use super::model::{AnyValue, KeyValue};

/// Decoded attributes of one span, keyed by attribute name
pub type AttributeMap = BTreeMap<String, AttributeValue>;

/// A decoded native attribute value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Int(i64),
    Bool(bool),
    Double(f64),
}

impl AttributeValue {
    /// Borrow the value if it is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(s) => f.write_str(s),
            AttributeValue::Int(i) => write!(f, "{}", i),
            AttributeValue::Bool(b) => write!(f, "{}", b),
            AttributeValue::Double(d) => write!(f, "{}", d),
        }
    }
}

/// Why a value could not be decoded
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeFailure {
    /// No recognized tag was present
    Unrecognized,
    /// A recognized tag carried a payload that does not parse as its type
    Invalid(String),
}

/// Decode a single tagged value
///
/// Tags are checked in the order string, integer, boolean, double.
pub fn decode_value(value: &AnyValue) -> Result<AttributeValue, DecodeFailure> {
    if let Some(raw) = &value.string_value {
        return match raw {
            Value::String(s) => Ok(AttributeValue::String(s.clone())),
            other => Err(DecodeFailure::Invalid(format!("stringValue {}", other))),
        };
    }

    if let Some(raw) = &value.int_value {
        let parsed = match raw {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        return parsed
            .map(AttributeValue::Int)
            .ok_or_else(|| DecodeFailure::Invalid(format!("intValue {}", raw)));
    }

    if let Some(raw) = &value.bool_value {
        let parsed = match raw {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.trim().parse::<bool>().ok(),
            _ => None,
        };
        return parsed
            .map(AttributeValue::Bool)
            .ok_or_else(|| DecodeFailure::Invalid(format!("boolValue {}", raw)));
    }

    if let Some(raw) = &value.double_value {
        let parsed = match raw {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        return parsed
            .map(AttributeValue::Double)
            .ok_or_else(|| DecodeFailure::Invalid(format!("doubleValue {}", raw)));
    }

    Err(DecodeFailure::Unrecognized)
}

/// Decode an attribute list, dropping everything that does not decode
///
/// When a key repeats, the last decodable occurrence wins.
pub fn decode_attributes(attributes: &[KeyValue]) -> AttributeMap {
    let mut decoded = AttributeMap::new();
    for kv in attributes {
        match decode_value(&kv.value) {
            Ok(value) => {
                decoded.insert(kv.key.clone(), value);
            }
            Err(DecodeFailure::Unrecognized) => {
                debug!(key = %kv.key, "Dropping attribute with unrecognized value type");
            }
            Err(DecodeFailure::Invalid(reason)) => {
                debug!(key = %kv.key, reason = %reason, "Dropping attribute that failed to decode");
            }
        }
    }
    decoded
}

/// Decode resource attributes, keeping only string values
pub fn decode_resource_attributes(attributes: &[KeyValue]) -> BTreeMap<String, String> {
    attributes
        .iter()
        .filter_map(|kv| match decode_value(&kv.value) {
            Ok(AttributeValue::String(s)) => Some((kv.key.clone(), s)),
            _ => None,
        })
        .collect()
}
