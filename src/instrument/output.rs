//! Task results as recorded on the task span

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::InstrumentationError;

/// One output record of a task
pub type OutputRecord = Map<String, Value>;

/// What a task produced
///
/// Loosely shaped results are normalised once, by [`TaskOutput::from_json`];
/// everything downstream only sees these two cases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum TaskOutput {
    #[default]
    Empty,
    Records(Vec<OutputRecord>),
}

impl TaskOutput {
    /// Wrap a list of records; an empty list is `Empty`
    pub fn from_records(records: Vec<OutputRecord>) -> Self {
        if records.is_empty() {
            TaskOutput::Empty
        } else {
            TaskOutput::Records(records)
        }
    }

    /// Validate a JSON result
    ///
    /// `null` and `[]` are empty, an object is a single record and an array
    /// of objects is a list of records. Anything else is rejected.
    pub fn from_json(value: Value) -> Result<Self, InstrumentationError> {
        match value {
            Value::Null => Ok(TaskOutput::Empty),
            Value::Object(record) => Ok(TaskOutput::Records(vec![record])),
            Value::Array(items) => {
                let records = items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| match item {
                        Value::Object(record) => Ok(record),
                        other => Err(InstrumentationError::InvalidOutput(format!(
                            "element {} is {}, expected an object",
                            i,
                            json_kind(&other)
                        ))),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::from_records(records))
            }
            other => Err(InstrumentationError::InvalidOutput(format!(
                "expected null, an object or an array of objects, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn as_records(&self) -> &[OutputRecord] {
        match self {
            TaskOutput::Empty => &[],
            TaskOutput::Records(records) => records,
        }
    }

    /// Number of records processed
    pub fn process_count(&self) -> usize {
        self.as_records().len()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
