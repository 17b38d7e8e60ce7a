use crate::error::{StreamError, StreamResult};
use crate::evaluator::Evaluator;
use crate::range::Range;
use crate::table::TableId;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnId(pub(crate) usize);

impl ColumnId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// Populated only by appends.
    #[default]
    Free,
    Calc,
    Accu,
    Link,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkMember {
    /// Column of the link's output table that receives the value.
    pub column: String,
    pub formula: String,
}

/// Formula definition of a derived column.
///
/// Definitions are never edited in place; updating a column installs a new definition and
/// discards the evaluator translated from the old one.
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnDefinition {
    Calc {
        /// Empty means every dirty row receives the column's default value.
        formula: String,
    },
    Accu {
        /// Evaluated per row of the input table; defaults to the column's default value.
        init: Option<String>,
        /// Evaluated per row of `accumulate_table`, relative to that table.
        accumulate: String,
        /// Evaluated per row of the input table after accumulation.
        finalize: Option<String>,
        accumulate_table: String,
        /// Path from `accumulate_table` to rows of the column's input table.
        group_path: String,
    },
    Link {
        members: Vec<LinkMember>,
    },
}

impl ColumnDefinition {
    pub fn kind(&self) -> ColumnKind {
        match self {
            ColumnDefinition::Calc { .. } => ColumnKind::Calc,
            ColumnDefinition::Accu { .. } => ColumnKind::Accu,
            ColumnDefinition::Link { .. } => ColumnKind::Link,
        }
    }
}

/// Growable value storage aligned with the owning table's row ids.
///
/// Holds exactly the rows `[offset, offset + len)`, which the schema keeps equal to the table's
/// stored range. Retired rows are physically dropped from the front.
#[derive(Clone, Debug, Default)]
pub(crate) struct ColumnData {
    offset: usize,
    values: VecDeque<Value>,
}

impl ColumnData {
    pub(crate) fn starting_at(offset: usize, len: usize) -> Self {
        Self {
            offset,
            values: std::iter::repeat(Value::Blank).take(len).collect(),
        }
    }

    pub(crate) fn range(&self) -> Range {
        Range::new(self.offset, self.offset + self.values.len())
    }

    pub(crate) fn get(&self, row: usize) -> Option<&Value> {
        let idx = row.checked_sub(self.offset)?;
        self.values.get(idx)
    }

    pub(crate) fn set(&mut self, row: usize, value: Value) -> bool {
        let Some(slot) = row
            .checked_sub(self.offset)
            .and_then(|idx| self.values.get_mut(idx))
        else {
            return false;
        };
        *slot = value;
        true
    }

    pub(crate) fn push(&mut self, value: Value) {
        self.values.push_back(value);
    }

    /// Frees storage for every row before `row`.
    pub(crate) fn retire_before(&mut self, row: usize) {
        let count = row.saturating_sub(self.offset).min(self.values.len());
        self.values.drain(..count);
        self.offset = self.offset.max(row);
    }
}

/// A named function from the rows of its input table to values of its output domain.
#[derive(Debug)]
pub struct Column {
    id: ColumnId,
    name: String,
    input: TableId,
    output: TableId,
    default_value: Value,
    definition: Option<ColumnDefinition>,
    pub(crate) data: ColumnData,
    pub(crate) evaluator: Option<Evaluator>,
    pub(crate) translate_error: Option<StreamError>,
    pub(crate) evaluate_error: Option<StreamError>,
    /// Next evaluation must scan every valid row instead of only the new ones.
    pub(crate) needs_full_scan: bool,
}

impl Column {
    pub(crate) fn new(
        id: ColumnId,
        name: impl Into<String>,
        input: TableId,
        output: TableId,
        data: ColumnData,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            input,
            output,
            default_value: Value::Blank,
            definition: None,
            data,
            evaluator: None,
            translate_error: None,
            evaluate_error: None,
            needs_full_scan: true,
        }
    }

    pub fn id(&self) -> ColumnId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn input(&self) -> TableId {
        self.input
    }

    pub fn output(&self) -> TableId {
        self.output
    }

    pub(crate) fn set_output(&mut self, output: TableId) {
        self.output = output;
    }

    pub fn default_value(&self) -> &Value {
        &self.default_value
    }

    pub(crate) fn set_default_value(&mut self, value: Value) {
        self.default_value = value;
    }

    pub fn kind(&self) -> ColumnKind {
        self.definition
            .as_ref()
            .map_or(ColumnKind::Free, ColumnDefinition::kind)
    }

    pub fn definition(&self) -> Option<&ColumnDefinition> {
        self.definition.as_ref()
    }

    pub fn is_derived(&self) -> bool {
        self.definition.is_some()
    }

    /// Installs a fresh definition; the column will be re-translated and fully re-scanned.
    pub(crate) fn set_definition(&mut self, definition: Option<ColumnDefinition>) {
        self.definition = definition;
        self.invalidate();
    }

    /// Drops the translated evaluator so the next cycle translates the definition again.
    pub(crate) fn invalidate(&mut self) {
        self.evaluator = None;
        self.translate_error = None;
        self.evaluate_error = None;
        self.needs_full_scan = true;
    }

    pub fn translate_error(&self) -> Option<&StreamError> {
        self.translate_error.as_ref()
    }

    pub fn evaluate_error(&self) -> Option<&StreamError> {
        self.evaluate_error.as_ref()
    }

    /// Stored value at `row`, failing with [`StreamError::OutOfRange`] outside the stored rows.
    pub fn value(&self, row: usize) -> StreamResult<&Value> {
        self.data.get(row).ok_or_else(|| self.out_of_range(row))
    }

    pub(crate) fn set_value(&mut self, row: usize, value: Value) -> StreamResult<()> {
        if self.data.set(row, value) {
            Ok(())
        } else {
            Err(self.out_of_range(row))
        }
    }

    fn out_of_range(&self, row: usize) -> StreamError {
        StreamError::OutOfRange {
            column: self.name.clone(),
            row,
            valid: self.data.range(),
        }
    }
}
