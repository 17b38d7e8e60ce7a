use super::{finish_dependencies, EvalContext, TargetColumn};
use crate::column::{ColumnId, LinkMember};
use crate::error::{StreamError, StreamResult};
use crate::expr::ExpressionBackend;
use crate::record::Record;
use crate::store::Store;
use crate::table::TableId;
use crate::translate::{translate, Translation};
use crate::value::{Value, ValueKey};
use std::collections::HashMap;

/// Finds or appends a row of the output table whose member columns equal the computed values.
#[derive(Debug)]
pub struct LinkEvaluator {
    members: Vec<Member>,
    pub(super) output: TableId,
    pub(super) dependencies: Vec<ColumnId>,
}

#[derive(Debug)]
struct Member {
    name: String,
    target: ColumnId,
    formula: Translation,
}

impl LinkEvaluator {
    pub(super) fn translate(
        store: &Store,
        target: &TargetColumn,
        members: &[LinkMember],
        backend: &dyn ExpressionBackend,
    ) -> StreamResult<Self> {
        let output = store.require_table(target.output)?;
        if output.is_primitive() {
            return Err(StreamError::Build(format!(
                "link output {} must be an entity table",
                output.name()
            )));
        }
        if members.is_empty() {
            return Err(StreamError::Build("link column has no members".into()));
        }

        let mut translated = Vec::with_capacity(members.len());
        for member in members {
            let unresolved = || StreamError::Bind {
                table: output.name().to_string(),
                path: member.column.clone(),
            };
            let column = store
                .find_column(target.output, &member.column)
                .ok_or_else(unresolved)?;
            // Members are populated by the link itself, so they must be free columns.
            if store.require_column(column)?.is_derived() {
                return Err(unresolved());
            }
            translated.push(Member {
                name: store.require_column(column)?.name().to_string(),
                target: column,
                formula: translate(&member.formula, store, target.input, backend)?,
            });
        }

        let dependencies = translated
            .iter()
            .flat_map(|m| m.formula.dependencies().chain(std::iter::once(m.target)))
            .collect();
        Ok(Self {
            members: translated,
            output: target.output,
            dependencies: finish_dependencies(dependencies, target.id),
        })
    }

    /// Tuple index over the valid rows of the output table.
    fn index(&self, ctx: &EvalContext<'_>) -> StreamResult<HashMap<Vec<ValueKey>, usize>> {
        let rows = ctx.valid_rows(self.output)?;
        let mut index = HashMap::with_capacity(rows.len());
        for row in rows.rows() {
            let key = self
                .members
                .iter()
                .map(|m| ctx.store().value(m.target, row).map(Value::key))
                .collect::<StreamResult<Vec<_>>>()?;
            index.entry(key).or_insert(row);
        }
        Ok(index)
    }

    pub(super) fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> StreamResult<usize> {
        let range = ctx.scan_range()?;
        if range.is_empty() {
            return Ok(0);
        }
        let mut index = self.index(ctx)?;
        let mut appended = 0usize;
        let mut params = Vec::new();
        let mut values = Vec::with_capacity(self.members.len());

        for row in range.rows() {
            values.clear();
            for member in &mut self.members {
                member.formula.read_params(ctx.store(), row, &mut params)?;
                values.push(member.formula.evaluate(&params, &Value::Blank)?);
            }

            let key: Vec<ValueKey> = values.iter().map(Value::key).collect();
            let linked = match index.get(&key) {
                Some(&existing) => existing,
                None => {
                    let record: Record = self
                        .members
                        .iter()
                        .zip(values.drain(..))
                        .map(|(m, v)| (m.name.as_str(), v))
                        .collect();
                    let new_row = ctx.append(self.output, &record)?;
                    appended += 1;
                    index.insert(key, new_row);
                    new_row
                }
            };
            ctx.write(row, Value::Row(linked))?;
        }
        if appended > 0 {
            log::debug!("link appended {appended} rows to {}", self.output);
        }
        Ok(range.len())
    }
}
