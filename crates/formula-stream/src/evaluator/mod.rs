//! Column evaluators: the translated, executable form of a [`ColumnDefinition`].
mod accu;
mod calc;
mod link;

pub use self::accu::AccuEvaluator;
pub use self::calc::CalcEvaluator;
pub use self::link::LinkEvaluator;

use crate::column::{ColumnDefinition, ColumnId};
use crate::error::{StreamError, StreamResult};
use crate::expr::ExpressionBackend;
use crate::range::Range;
use crate::store::Store;
use crate::table::TableId;
use crate::value::Value;

#[derive(Debug)]
pub enum Evaluator {
    Calc(CalcEvaluator),
    Accu(AccuEvaluator),
    Link(LinkEvaluator),
}

impl Evaluator {
    /// Translates `column`'s definition against the current schema.
    pub(crate) fn translate(
        store: &Store,
        column: ColumnId,
        definition: &ColumnDefinition,
        backend: &dyn ExpressionBackend,
    ) -> StreamResult<Self> {
        let target = TargetColumn::describe(store, column)?;
        let evaluator = match definition {
            ColumnDefinition::Calc { formula } => {
                Evaluator::Calc(CalcEvaluator::translate(store, &target, formula, backend)?)
            }
            ColumnDefinition::Accu {
                init,
                accumulate,
                finalize,
                accumulate_table,
                group_path,
            } => Evaluator::Accu(AccuEvaluator::translate(
                store,
                &target,
                init.as_deref(),
                accumulate,
                finalize.as_deref(),
                accumulate_table,
                group_path,
                backend,
            )?),
            ColumnDefinition::Link { members } => {
                Evaluator::Link(LinkEvaluator::translate(store, &target, members, backend)?)
            }
        };
        Ok(evaluator)
    }

    /// Columns this evaluator reads, sorted and without the column itself.
    pub fn dependencies(&self) -> &[ColumnId] {
        match self {
            Evaluator::Calc(e) => &e.dependencies,
            Evaluator::Accu(e) => &e.dependencies,
            Evaluator::Link(e) => &e.dependencies,
        }
    }

    /// Entity table this evaluator appends to, if any.
    pub fn appends_to(&self) -> Option<TableId> {
        match self {
            Evaluator::Link(e) => Some(e.output),
            _ => None,
        }
    }

    /// Table this evaluator scans besides its own input table, if any.
    pub fn scans_table(&self) -> Option<TableId> {
        match self {
            Evaluator::Accu(e) => Some(e.reads_table()),
            _ => None,
        }
    }

    /// Recomputes the column, returning the number of rows written.
    ///
    /// The first failure aborts the scan; rows written before it are kept.
    pub(crate) fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> StreamResult<usize> {
        match self {
            Evaluator::Calc(e) => e.evaluate(ctx),
            Evaluator::Accu(e) => e.evaluate(ctx),
            Evaluator::Link(e) => e.evaluate(ctx),
        }
    }
}

/// Identity of the column being translated.
pub(crate) struct TargetColumn {
    pub(crate) id: ColumnId,
    pub(crate) input: TableId,
    pub(crate) output: TableId,
    pub(crate) default_value: Value,
}

impl TargetColumn {
    fn describe(store: &Store, id: ColumnId) -> StreamResult<Self> {
        let column = store.require_column(id)?;
        Ok(Self {
            id,
            input: column.input(),
            output: column.output(),
            default_value: column.default_value().clone(),
        })
    }
}

/// Sorts, dedups and drops the self-reference.
pub(crate) fn finish_dependencies(
    mut columns: Vec<ColumnId>,
    this: ColumnId,
) -> Vec<ColumnId> {
    columns.retain(|&c| c != this);
    columns.sort_unstable();
    columns.dedup();
    columns
}

/// Scoped access to the store for the column currently being evaluated.
///
/// Reads go anywhere (and fail outside stored rows); writes only reach the scheduled column.
pub(crate) struct EvalContext<'a> {
    store: &'a mut Store,
    column: ColumnId,
    input: TableId,
    full: bool,
}

impl<'a> EvalContext<'a> {
    pub(crate) fn new(store: &'a mut Store, column: ColumnId, full: bool) -> StreamResult<Self> {
        let input = store.require_column(column)?.input();
        Ok(Self {
            store,
            column,
            input,
            full,
        })
    }

    pub(crate) fn input(&self) -> TableId {
        self.input
    }

    pub(crate) fn store(&self) -> &Store {
        self.store
    }

    /// Rows to recompute: the input table's new rows, or every valid row on a full pass.
    pub(crate) fn scan_range(&self) -> StreamResult<Range> {
        let table = self.store.require_table(self.input)?;
        Ok(if self.full {
            table.row_range()
        } else {
            table.new_range()
        })
    }

    pub(crate) fn valid_rows(&self, table: TableId) -> StreamResult<Range> {
        Ok(self.store.require_table(table)?.row_range())
    }

    pub(crate) fn current(&self, row: usize) -> StreamResult<Value> {
        self.store.value(self.column, row).cloned()
    }

    pub(crate) fn write(&mut self, row: usize, value: Value) -> StreamResult<()> {
        self.store.set_value(self.column, row, value)
    }

    pub(crate) fn append(&mut self, table: TableId, record: &crate::Record) -> StreamResult<usize> {
        if table == self.input {
            return Err(StreamError::Evaluate(
                "a column cannot append rows to its own input table".into(),
            ));
        }
        self.store.append(table, record)
    }
}
