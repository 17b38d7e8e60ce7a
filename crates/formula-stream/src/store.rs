use crate::column::{Column, ColumnData, ColumnId};
use crate::error::{StreamError, StreamResult};
use crate::range::Range;
use crate::record::{normalize_name, Record};
use crate::table::{Table, TableId};
use crate::value::Value;

/// Index-based arena owning every table and column of a schema.
///
/// Removed elements leave a `None` hole so ids are never reused.
#[derive(Debug, Default)]
pub(crate) struct Store {
    tables: Vec<Option<Table>>,
    columns: Vec<Option<Column>>,
}

impl Store {
    pub(crate) fn table(&self, id: TableId) -> Option<&Table> {
        self.tables.get(id.0)?.as_ref()
    }

    pub(crate) fn table_mut(&mut self, id: TableId) -> Option<&mut Table> {
        self.tables.get_mut(id.0)?.as_mut()
    }

    pub(crate) fn column(&self, id: ColumnId) -> Option<&Column> {
        self.columns.get(id.0)?.as_ref()
    }

    pub(crate) fn column_mut(&mut self, id: ColumnId) -> Option<&mut Column> {
        self.columns.get_mut(id.0)?.as_mut()
    }

    pub(crate) fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter().flatten()
    }

    pub(crate) fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().flatten()
    }

    pub(crate) fn columns_mut(&mut self) -> impl Iterator<Item = &mut Column> {
        self.columns.iter_mut().flatten()
    }

    pub(crate) fn require_table(&self, id: TableId) -> StreamResult<&Table> {
        self.table(id)
            .ok_or_else(|| StreamError::UnknownTable(id.to_string()))
    }

    pub(crate) fn require_column(&self, id: ColumnId) -> StreamResult<&Column> {
        self.column(id).ok_or_else(|| StreamError::UnknownColumn {
            table: String::new(),
            column: id.to_string(),
        })
    }

    pub(crate) fn find_table(&self, name: &str) -> Option<TableId> {
        let name = normalize_name(name);
        self.tables()
            .find(|t| normalize_name(t.name()) == name)
            .map(Table::id)
    }

    pub(crate) fn find_column(&self, table: TableId, name: &str) -> Option<ColumnId> {
        let name = normalize_name(name);
        self.table(table)?
            .columns()
            .iter()
            .copied()
            .find(|&id| self.column(id).is_some_and(|c| normalize_name(c.name()) == name))
    }

    pub(crate) fn add_table(&mut self, build: impl FnOnce(TableId) -> Table) -> TableId {
        let id = TableId(self.tables.len());
        self.tables.push(Some(build(id)));
        id
    }

    pub(crate) fn add_column(
        &mut self,
        name: &str,
        input: TableId,
        output: TableId,
    ) -> StreamResult<ColumnId> {
        let id = ColumnId(self.columns.len());
        let table = self
            .table_mut(input)
            .ok_or_else(|| StreamError::UnknownTable(input.to_string()))?;
        let stored = table.stored_range();
        table.columns.push(id);
        let data = ColumnData::starting_at(stored.start, stored.len());
        self.columns
            .push(Some(Column::new(id, name, input, output, data)));
        Ok(id)
    }

    pub(crate) fn remove_column(&mut self, id: ColumnId) -> Option<Column> {
        let column = self.columns.get_mut(id.0)?.take()?;
        if let Some(table) = self.table_mut(column.input()) {
            table.columns.retain(|&c| c != id);
        }
        Some(column)
    }

    pub(crate) fn remove_table(&mut self, id: TableId) -> Option<Table> {
        self.tables.get_mut(id.0)?.take()
    }

    /// Appends one row, reading each column's value from `record` by name.
    ///
    /// Derived columns receive `Blank` until they are evaluated.
    pub(crate) fn append(&mut self, table: TableId, record: &Record) -> StreamResult<usize> {
        let t = self
            .table_mut(table)
            .ok_or_else(|| StreamError::UnknownTable(table.to_string()))?;
        if t.is_primitive() {
            return Err(StreamError::Evaluate(format!(
                "cannot append to primitive table {}",
                t.name()
            )));
        }
        let row = t.push_row();
        let columns = t.columns.clone();
        for id in columns {
            if let Some(column) = self.column_mut(id) {
                let value = if column.is_derived() {
                    Value::Blank
                } else {
                    record.get(column.name()).cloned().unwrap_or_default()
                };
                column.data.push(value);
            }
        }
        Ok(row)
    }

    pub(crate) fn value(&self, column: ColumnId, row: usize) -> StreamResult<&Value> {
        self.require_column(column)?.value(row)
    }

    pub(crate) fn set_value(
        &mut self,
        column: ColumnId,
        row: usize,
        value: Value,
    ) -> StreamResult<()> {
        self.column_mut(column)
            .ok_or_else(|| StreamError::UnknownColumn {
                table: String::new(),
                column: column.to_string(),
            })?
            .set_value(row, value)
    }

    /// Promotes every table's new rows to clean and frees storage of deleted rows.
    pub(crate) fn finish_cycle(&mut self) {
        let mut retired: Vec<(Vec<ColumnId>, Range)> = Vec::new();
        for table in self.tables.iter_mut().flatten() {
            table.promote_new();
            let range = table.retire_deleted();
            debug_assert!(table.ranges_are_consistent(), "inconsistent ranges in {}", table.name());
            if !range.is_empty() {
                retired.push((table.columns.clone(), range));
            }
        }
        for (columns, range) in retired {
            log::trace!("retiring rows {range}");
            for id in columns {
                if let Some(column) = self.column_mut(id) {
                    column.data.retire_before(range.end);
                }
            }
        }
    }
}
