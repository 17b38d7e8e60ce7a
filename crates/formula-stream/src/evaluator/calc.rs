use super::{finish_dependencies, EvalContext, TargetColumn};
use crate::column::ColumnId;
use crate::error::StreamResult;
use crate::expr::ExpressionBackend;
use crate::store::Store;
use crate::translate::{translate, Translation};
use crate::value::Value;

/// One formula evaluated per row of the column's own table.
#[derive(Debug)]
pub struct CalcEvaluator {
    /// `None` for an empty formula: rows receive `default_value`.
    formula: Option<Translation>,
    default_value: Value,
    pub(super) dependencies: Vec<ColumnId>,
}

impl CalcEvaluator {
    pub(super) fn translate(
        store: &Store,
        target: &TargetColumn,
        formula: &str,
        backend: &dyn ExpressionBackend,
    ) -> StreamResult<Self> {
        let formula = if formula.trim().is_empty() {
            None
        } else {
            Some(translate(formula, store, target.input, backend)?)
        };
        let dependencies = formula
            .iter()
            .flat_map(Translation::dependencies)
            .collect();
        Ok(Self {
            formula,
            default_value: target.default_value.clone(),
            dependencies: finish_dependencies(dependencies, target.id),
        })
    }

    pub(super) fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> StreamResult<usize> {
        let range = ctx.scan_range()?;
        let Some(formula) = self.formula.as_mut() else {
            for row in range.rows() {
                ctx.write(row, self.default_value.clone())?;
            }
            return Ok(range.len());
        };

        let mut params = Vec::with_capacity(formula.params().len());
        for row in range.rows() {
            formula.read_params(ctx.store(), row, &mut params)?;
            let current = if formula.uses_output() {
                ctx.current(row)?
            } else {
                Value::Blank
            };
            let value = formula.evaluate(&params, &current)?;
            ctx.write(row, value)?;
        }
        Ok(range.len())
    }
}
