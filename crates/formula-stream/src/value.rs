use crate::error::{StreamError, StreamResult};
use ordered_float::OrderedFloat;
use std::fmt;

/// A single cell value.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    /// The null / absent value.
    #[default]
    Blank,
    Number(f64),
    Text(String),
    Boolean(bool),
    /// Row id in an entity table, as produced by link columns.
    Row(usize),
}

impl Value {
    pub fn is_blank(&self) -> bool {
        matches!(self, Value::Blank)
    }

    /// Interprets the value as a row id for a path step.
    ///
    /// Returns `Ok(None)` for `Blank` so that nulls propagate along a path.
    pub fn as_row(&self) -> StreamResult<Option<usize>> {
        match self {
            Value::Blank => Ok(None),
            Value::Row(row) => Ok(Some(*row)),
            Value::Number(n) if n.is_finite() && *n >= 0.0 && n.fract() == 0.0 => {
                Ok(Some(*n as usize))
            }
            other => Err(StreamError::Evaluate(format!(
                "value {other} cannot be used as a row reference"
            ))),
        }
    }

    /// Numeric view used by arithmetic. `Blank` becomes NaN.
    pub fn to_number(&self) -> StreamResult<f64> {
        match self {
            Value::Blank => Ok(f64::NAN),
            Value::Number(n) => Ok(*n),
            Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) => Err(StreamError::Evaluate(format!(
                "cannot convert text {s:?} to a number"
            ))),
            Value::Row(row) => Err(StreamError::Evaluate(format!(
                "cannot use row reference #{row} as a number"
            ))),
        }
    }

    pub fn truthy(&self) -> StreamResult<bool> {
        match self {
            Value::Boolean(b) => Ok(*b),
            Value::Number(n) => Ok(*n != 0.0 && !n.is_nan()),
            Value::Blank => Ok(false),
            other => Err(StreamError::Evaluate(format!(
                "cannot convert {other} to a boolean"
            ))),
        }
    }

    pub(crate) fn key(&self) -> ValueKey {
        match self {
            Value::Blank => ValueKey::Blank,
            Value::Number(n) => ValueKey::Number(OrderedFloat(*n)),
            Value::Text(s) => ValueKey::Text(s.clone()),
            Value::Boolean(b) => ValueKey::Boolean(*b),
            Value::Row(r) => ValueKey::Row(*r),
        }
    }
}

/// Hashable mirror of [`Value`] used to index link targets.
///
/// NaN compares equal to NaN here, so two rows that both carry NaN are considered the same tuple.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum ValueKey {
    Blank,
    Number(OrderedFloat<f64>),
    Text(String),
    Boolean(bool),
    Row(usize),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Blank => f.write_str("null"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Row(r) => write!(f, "#{r}"),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Blank, Into::into)
    }
}

impl From<&serde_json::Value> for Value {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Blank,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => n.as_f64().map_or(Value::Blank, Value::Number),
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }
}
