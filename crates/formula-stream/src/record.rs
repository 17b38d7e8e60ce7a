use crate::error::{StreamError, StreamResult};
use crate::value::Value;
use std::collections::HashMap;

/// A row's worth of named values, used to shuttle data into [`crate::Schema::append`] and
/// between link columns and their output table.
///
/// Names are matched case-insensitively.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    values: HashMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.values.insert(normalize_name(name), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(&normalize_name(name))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Builds a record from a JSON object such as `{"A": 5, "B": null}`.
    pub fn from_json(json: &str) -> StreamResult<Self> {
        let parsed: serde_json::Value =
            serde_json::from_str(json).map_err(|err| StreamError::Config(err.to_string()))?;
        Self::from_json_value(&parsed)
    }

    pub fn from_json_value(json: &serde_json::Value) -> StreamResult<Self> {
        let serde_json::Value::Object(map) = json else {
            return Err(StreamError::Config(format!(
                "record must be a JSON object, got {json}"
            )));
        };
        let mut record = Record::new();
        for (name, value) in map {
            record.set(name, Value::from(value));
        }
        Ok(record)
    }
}

impl<K: AsRef<str>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (name, value) in iter {
            record.set(name.as_ref(), value);
        }
        record
    }
}

pub(crate) fn normalize_name(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}
