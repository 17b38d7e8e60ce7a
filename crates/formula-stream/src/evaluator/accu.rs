use super::{finish_dependencies, EvalContext, TargetColumn};
use crate::column::ColumnId;
use crate::error::{StreamError, StreamResult};
use crate::expr::ExpressionBackend;
use crate::path::{ColumnPath, QualifiedName};
use crate::store::Store;
use crate::table::TableId;
use crate::translate::{translate, Translation};
use crate::value::Value;

/// Group-by aggregation of a separate table into the column's rows.
///
/// Every cycle re-initializes all valid rows of the input table and re-scans every valid row of
/// the accumulation table; the result never depends on which rows are new.
#[derive(Debug)]
pub struct AccuEvaluator {
    init: Option<Translation>,
    accumulate: Translation,
    finalize: Option<Translation>,
    accumulate_table: TableId,
    group_path: ColumnPath,
    default_value: Value,
    pub(super) dependencies: Vec<ColumnId>,
}

impl AccuEvaluator {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn translate(
        store: &Store,
        target: &TargetColumn,
        init: Option<&str>,
        accumulate: &str,
        finalize: Option<&str>,
        accumulate_table: &str,
        group_path: &str,
        backend: &dyn ExpressionBackend,
    ) -> StreamResult<Self> {
        fn non_empty(formula: Option<&str>) -> Option<&str> {
            formula.filter(|f| !f.trim().is_empty())
        }

        let init = non_empty(init)
            .map(|f| translate(f, store, target.input, backend))
            .transpose()?;
        let accumulate_id = store.find_table(accumulate_table).ok_or_else(|| {
            let table = store
                .table(target.input)
                .map(|t| t.name().to_string())
                .unwrap_or_default();
            StreamError::Bind {
                table,
                path: accumulate_table.to_string(),
            }
        })?;

        let group_name = QualifiedName::parse(group_path)?;
        let group_path = group_name.resolve(store, accumulate_id)?;
        if group_path.output() != target.input {
            return Err(StreamError::Bind {
                table: accumulate_table.to_string(),
                path: format!("{group_name} (does not lead to the column's table)"),
            });
        }

        let accumulate = translate(accumulate, store, accumulate_id, backend)?;
        let finalize = non_empty(finalize)
            .map(|f| translate(f, store, target.input, backend))
            .transpose()?;

        let dependencies = init
            .iter()
            .chain(std::iter::once(&accumulate))
            .chain(finalize.iter())
            .flat_map(Translation::dependencies)
            .chain(group_path.columns().iter().copied())
            .collect();

        Ok(Self {
            init,
            accumulate,
            finalize,
            accumulate_table: accumulate_id,
            group_path,
            default_value: target.default_value.clone(),
            dependencies: finish_dependencies(dependencies, target.id),
        })
    }

    /// Table whose rows are folded into the groups.
    pub fn reads_table(&self) -> TableId {
        self.accumulate_table
    }

    pub(super) fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> StreamResult<usize> {
        let main = ctx.valid_rows(ctx.input())?;
        let mut params = Vec::new();

        for row in main.rows() {
            let value = match self.init.as_mut() {
                Some(init) => {
                    init.read_params(ctx.store(), row, &mut params)?;
                    init.evaluate(&params, &Value::Blank)?
                }
                None => self.default_value.clone(),
            };
            ctx.write(row, value)?;
        }

        let facts = ctx.valid_rows(self.accumulate_table)?;
        let mut skipped = 0usize;
        for fact in facts.rows() {
            let group = self.group_path.read(ctx.store(), fact)?.as_row()?;
            let Some(group) = group.filter(|g| main.contains(*g)) else {
                skipped += 1;
                continue;
            };
            self.accumulate
                .read_params(ctx.store(), fact, &mut params)?;
            let current = ctx.current(group)?;
            let value = self.accumulate.evaluate(&params, &current)?;
            ctx.write(group, value)?;
        }
        if skipped > 0 {
            log::debug!("accumulation skipped {skipped} rows without a valid group");
        }

        if let Some(finalize) = self.finalize.as_mut() {
            for row in main.rows() {
                finalize.read_params(ctx.store(), row, &mut params)?;
                let current = ctx.current(row)?;
                let value = finalize.evaluate(&params, &current)?;
                ctx.write(row, value)?;
            }
        }
        Ok(main.len())
    }
}
