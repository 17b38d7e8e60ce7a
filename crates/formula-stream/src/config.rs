//! Serialized element definitions accepted by [`crate::Schema`].
//!
//! ```json
//! {"name": "Total", "input": "Groups", "output": "Double", "kind": "accu",
//!  "default": 0, "accumulate": "[out] + [Amount]",
//!  "accumulate_table": "Facts", "group_path": "Group"}
//! ```
use crate::column::{ColumnDefinition, ColumnKind, LinkMember};
use crate::error::{StreamError, StreamResult};
use crate::translate::OUTPUT_TERM;
use crate::value::Value;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,
    /// Row count above which the oldest rows are evicted; absent or `-1` means unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rows: Option<i64>,
}

impl TableConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_rows: None,
        }
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = i64::try_from(max_rows).ok();
        self
    }

    pub fn from_json(json: &str) -> StreamResult<Self> {
        serde_json::from_str(json).map_err(|err| StreamError::Config(err.to_string()))
    }

    pub(crate) fn row_limit(&self) -> Result<Option<usize>, String> {
        match self.max_rows {
            None | Some(-1) => Ok(None),
            Some(n) => usize::try_from(n)
                .map(Some)
                .map_err(|_| format!("invalid max_rows {n} for table {}", self.name)),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    /// Table whose rows the column is defined on.
    pub input: String,
    /// Value domain: a primitive table name such as `Double`, or an entity table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default)]
    pub kind: ColumnKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accumulate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalize: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accumulate_table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<LinkMember>,
}

pub(crate) const DEFAULT_OUTPUT: &str = "Double";

impl ColumnConfig {
    /// A free column populated by appends.
    pub fn free(input: &str, name: &str, output: &str) -> Self {
        Self {
            name: name.to_string(),
            input: input.to_string(),
            output: Some(output.to_string()),
            ..Self::default()
        }
    }

    pub fn calc(input: &str, name: &str, formula: &str) -> Self {
        Self {
            name: name.to_string(),
            input: input.to_string(),
            kind: ColumnKind::Calc,
            formula: Some(formula.to_string()),
            ..Self::default()
        }
    }

    pub fn accu(
        input: &str,
        name: &str,
        accumulate_table: &str,
        group_path: &str,
        accumulate: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            input: input.to_string(),
            kind: ColumnKind::Accu,
            accumulate: Some(accumulate.to_string()),
            accumulate_table: Some(accumulate_table.to_string()),
            group_path: Some(group_path.to_string()),
            ..Self::default()
        }
    }

    pub fn link(input: &str, name: &str, output: &str, members: &[(&str, &str)]) -> Self {
        Self {
            name: name.to_string(),
            input: input.to_string(),
            output: Some(output.to_string()),
            kind: ColumnKind::Link,
            links: members
                .iter()
                .map(|(column, formula)| LinkMember {
                    column: column.to_string(),
                    formula: formula.to_string(),
                })
                .collect(),
            ..Self::default()
        }
    }

    pub fn with_output(mut self, output: &str) -> Self {
        self.output = Some(output.to_string());
        self
    }

    pub fn with_default(mut self, value: impl Into<serde_json::Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_init(mut self, formula: &str) -> Self {
        self.init = Some(formula.to_string());
        self
    }

    pub fn with_finalize(mut self, formula: &str) -> Self {
        self.finalize = Some(formula.to_string());
        self
    }

    pub fn from_json(json: &str) -> StreamResult<Self> {
        serde_json::from_str(json).map_err(|err| StreamError::Config(err.to_string()))
    }

    pub(crate) fn output_name(&self) -> &str {
        self.output.as_deref().unwrap_or(DEFAULT_OUTPUT)
    }

    pub(crate) fn default_value(&self) -> Value {
        self.default.as_ref().map(Value::from).unwrap_or_default()
    }

    /// Builds a fresh formula definition, or `None` for a free column.
    pub(crate) fn definition(&self) -> Result<Option<ColumnDefinition>, String> {
        let required = |field: &Option<String>, what: &str| {
            field
                .clone()
                .ok_or_else(|| {
                    format!(
                        "{} column {} requires {what}",
                        kind_name(self.kind),
                        self.name
                    )
                })
        };
        let definition = match self.kind {
            ColumnKind::Free => return Ok(None),
            ColumnKind::Calc => ColumnDefinition::Calc {
                formula: self.formula.clone().unwrap_or_default(),
            },
            ColumnKind::Accu => ColumnDefinition::Accu {
                init: self.init.clone(),
                accumulate: required(&self.accumulate, "an accumulate formula")?,
                finalize: self.finalize.clone(),
                accumulate_table: required(&self.accumulate_table, "an accumulate table")?,
                group_path: required(&self.group_path, "a group path")?,
            },
            ColumnKind::Link => {
                if self.links.is_empty() {
                    return Err(format!("link column {} requires link members", self.name));
                }
                if self.output.is_none() {
                    return Err(format!("link column {} requires an output table", self.name));
                }
                ColumnDefinition::Link {
                    members: self.links.clone(),
                }
            }
        };
        Ok(Some(definition))
    }
}

fn kind_name(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::Free => "free",
        ColumnKind::Calc => "calc",
        ColumnKind::Accu => "accu",
        ColumnKind::Link => "link",
    }
}

/// Checks that `name` can be used for a table or column.
pub(crate) fn validate_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("name must not be empty".into());
    }
    if name.trim() != name {
        return Err(format!("name {name:?} has leading or trailing whitespace"));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| matches!(c, '[' | ']' | '.' | '"') || c.is_control())
    {
        return Err(format!("name {name:?} contains invalid character {bad:?}"));
    }
    Ok(())
}

pub(crate) fn validate_column_name(name: &str) -> Result<(), String> {
    validate_name(name)?;
    if name.eq_ignore_ascii_case(OUTPUT_TERM) {
        return Err(format!("{name:?} is reserved"));
    }
    Ok(())
}
