use crate::column::{Column, ColumnDefinition, ColumnId};
use crate::config::{validate_column_name, validate_name, ColumnConfig, TableConfig};
use crate::error::{StreamError, StreamResult};
use crate::evaluator::{EvalContext, Evaluator};
use crate::expr::{ExpressionBackend, NativeBackend};
use crate::graph::{DependencyGraph, Schedule};
use crate::record::Record;
use crate::store::Store;
use crate::table::{PrimitiveType, Table, TableId};
use crate::value::Value;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeSet, HashSet};

/// When [`Schema::auto_evaluate`] forces a full re-evaluation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AutoEvaluate {
    /// Minimum time between evaluations; `None` disables auto-evaluation.
    pub dwell: Option<Duration>,
}

impl AutoEvaluate {
    pub fn every(dwell: Duration) -> Self {
        Self { dwell: Some(dwell) }
    }
}

/// Outcome of one evaluate cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EvaluateReport {
    /// Columns whose scan completed.
    pub evaluated: Vec<ColumnId>,
    /// Columns whose scan stopped at an evaluation error.
    pub failed: Vec<ColumnId>,
    /// Derived columns that were not run: excluded from the schedule, or downstream of a
    /// column that failed earlier in the cycle.
    pub skipped: Vec<ColumnId>,
}

impl EvaluateReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// Tables, columns and the machinery that keeps derived columns up to date.
///
/// Rows are appended between evaluate cycles. Each cycle translates pending formulas, runs the
/// layered schedule over the dirty rows, then promotes new rows to clean and retires evicted
/// rows.
#[derive(Debug)]
pub struct Schema {
    store: Store,
    backend: Box<dyn ExpressionBackend>,
    /// Cached until a formula, column or table changes.
    graph: Option<DependencyGraph>,
    auto: AutoEvaluate,
    last_evaluated: Option<DateTime<Utc>>,
    appends_since_evaluate: usize,
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}

impl Schema {
    pub fn new() -> Self {
        Self::with_backend(NativeBackend)
    }

    pub fn with_backend(backend: impl ExpressionBackend + 'static) -> Self {
        let mut store = Store::default();
        for ty in PrimitiveType::ALL {
            store.add_table(|id| Table::primitive(id, ty));
        }
        Self {
            store,
            backend: Box::new(backend),
            graph: None,
            auto: AutoEvaluate::default(),
            last_evaluated: None,
            appends_since_evaluate: 0,
        }
    }

    // ---- tables ----

    pub fn create_table(&mut self, config: &TableConfig) -> StreamResult<TableId> {
        validate_name(&config.name).map_err(StreamError::CreateElement)?;
        if self.store.find_table(&config.name).is_some() {
            return Err(StreamError::CreateElement(format!(
                "table {} already exists",
                config.name
            )));
        }
        let max_rows = config.row_limit().map_err(StreamError::CreateElement)?;
        let id = self
            .store
            .add_table(|id| Table::new(id, config.name.as_str(), max_rows));
        log::debug!("created table {} ({id})", config.name);
        Ok(id)
    }

    pub fn create_table_json(&mut self, json: &str) -> StreamResult<TableId> {
        self.create_table(&TableConfig::from_json(json)?)
    }

    /// Renames a table or changes its row limit. Lowering the limit evicts rows immediately;
    /// their storage is freed at the end of the next cycle.
    pub fn update_table(&mut self, id: TableId, config: &TableConfig) -> StreamResult<()> {
        let table = self
            .store
            .table(id)
            .ok_or_else(|| StreamError::UpdateElement(format!("unknown table {id}")))?;
        if table.is_primitive() {
            return Err(StreamError::UpdateElement(format!(
                "primitive table {} cannot be updated",
                table.name()
            )));
        }
        validate_name(&config.name).map_err(StreamError::UpdateElement)?;
        if self.store.find_table(&config.name).is_some_and(|other| other != id) {
            return Err(StreamError::UpdateElement(format!(
                "table {} already exists",
                config.name
            )));
        }
        let max_rows = config.row_limit().map_err(StreamError::UpdateElement)?;
        let old_name = table.name().to_string();

        if let Some(table) = self.store.table_mut(id) {
            table.set_name(config.name.as_str());
            table.set_max_rows(max_rows);
        }
        if old_name != config.name {
            // Accumulations name their fact table directly instead of through a column path.
            let stale: Vec<ColumnId> = self
                .store
                .columns()
                .filter(|c| accumulates_from(c, &old_name))
                .map(Column::id)
                .collect();
            for column in stale {
                self.invalidate(column);
            }
        }
        self.graph = None;
        Ok(())
    }

    pub fn update_table_json(&mut self, id: TableId, json: &str) -> StreamResult<()> {
        self.update_table(id, &TableConfig::from_json(json)?)
    }

    /// Removes a table together with every column defined on it or producing its rows.
    pub fn delete_table(&mut self, id: TableId) -> StreamResult<()> {
        let table = self
            .store
            .table(id)
            .ok_or_else(|| StreamError::DeleteElement(format!("unknown table {id}")))?;
        if table.is_primitive() {
            return Err(StreamError::DeleteElement(format!(
                "primitive table {} cannot be deleted",
                table.name()
            )));
        }
        let name = table.name().to_string();
        let doomed: Vec<ColumnId> = self
            .store
            .columns()
            .filter(|c| c.input() == id || c.output() == id)
            .map(Column::id)
            .collect();
        self.remove_columns(&doomed);

        let stale: Vec<ColumnId> = self
            .store
            .columns()
            .filter(|c| accumulates_from(c, &name))
            .map(Column::id)
            .collect();
        for column in stale {
            self.invalidate(column);
        }
        self.store.remove_table(id);
        log::debug!("deleted table {name} and {} columns", doomed.len());
        Ok(())
    }

    pub fn table_id(&self, name: &str) -> Option<TableId> {
        self.store.find_table(name)
    }

    pub fn table(&self, id: TableId) -> Option<&Table> {
        self.store.table(id)
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.store.tables()
    }

    pub fn primitive_table(&self, ty: PrimitiveType) -> TableId {
        // Registered first, in declaration order, and never deleted.
        let index = PrimitiveType::ALL
            .iter()
            .position(|&p| p == ty)
            .unwrap_or_default();
        TableId(index)
    }

    // ---- columns ----

    pub fn create_column(&mut self, config: &ColumnConfig) -> StreamResult<ColumnId> {
        let input = self.store.find_table(&config.input).ok_or_else(|| {
            StreamError::CreateElement(format!("unknown input table {}", config.input))
        })?;
        if self.store.require_table(input)?.is_primitive() {
            return Err(StreamError::CreateElement(format!(
                "primitive table {} cannot own columns",
                config.input
            )));
        }
        validate_column_name(&config.name).map_err(StreamError::CreateElement)?;
        if self.store.find_column(input, &config.name).is_some() {
            return Err(StreamError::CreateElement(format!(
                "column {}.{} already exists",
                config.input, config.name
            )));
        }
        let output = self
            .output_table(config)
            .map_err(StreamError::CreateElement)?;
        let definition = config.definition().map_err(StreamError::CreateElement)?;

        let id = self.store.add_column(&config.name, input, output)?;
        if let Some(column) = self.store.column_mut(id) {
            column.set_default_value(config.default_value());
            column.set_definition(definition);
        }
        self.graph = None;
        log::debug!("created {:?} column {}.{} ({id})", config.kind, config.input, config.name);
        Ok(id)
    }

    pub fn create_column_json(&mut self, json: &str) -> StreamResult<ColumnId> {
        self.create_column(&ColumnConfig::from_json(json)?)
    }

    /// Replaces a column's name, output, default and definition.
    ///
    /// The column keeps its input table and its stored values; its evaluator and the evaluators
    /// of every column reading it are translated again on the next cycle.
    pub fn update_column(&mut self, id: ColumnId, config: &ColumnConfig) -> StreamResult<()> {
        let column = self
            .store
            .column(id)
            .ok_or_else(|| StreamError::UpdateElement(format!("unknown column {id}")))?;
        let input = column.input();
        if self.store.find_table(&config.input) != Some(input) {
            return Err(StreamError::UpdateElement(format!(
                "column {} cannot move to table {}",
                column.name(),
                config.input
            )));
        }
        validate_column_name(&config.name).map_err(StreamError::UpdateElement)?;
        if self
            .store
            .find_column(input, &config.name)
            .is_some_and(|other| other != id)
        {
            return Err(StreamError::UpdateElement(format!(
                "column {}.{} already exists",
                config.input, config.name
            )));
        }
        let output = self
            .output_table(config)
            .map_err(StreamError::UpdateElement)?;
        let definition = config.definition().map_err(StreamError::UpdateElement)?;

        self.invalidate_dependents(&[id]);
        if let Some(column) = self.store.column_mut(id) {
            column.set_name(config.name.as_str());
            column.set_output(output);
            column.set_default_value(config.default_value());
            column.set_definition(definition);
        }
        self.graph = None;
        Ok(())
    }

    pub fn update_column_json(&mut self, id: ColumnId, json: &str) -> StreamResult<()> {
        self.update_column(id, &ColumnConfig::from_json(json)?)
    }

    pub fn delete_column(&mut self, id: ColumnId) -> StreamResult<()> {
        if self.store.column(id).is_none() {
            return Err(StreamError::DeleteElement(format!("unknown column {id}")));
        }
        self.remove_columns(&[id]);
        Ok(())
    }

    pub fn column_id(&self, table: TableId, name: &str) -> Option<ColumnId> {
        self.store.find_column(table, name)
    }

    pub fn column(&self, id: ColumnId) -> Option<&Column> {
        self.store.column(id)
    }

    pub fn translate_error(&self, column: ColumnId) -> Option<&StreamError> {
        self.store.column(column)?.translate_error()
    }

    pub fn evaluate_error(&self, column: ColumnId) -> Option<&StreamError> {
        self.store.column(column)?.evaluate_error()
    }

    fn output_table(&self, config: &ColumnConfig) -> Result<TableId, String> {
        let name = config.output_name();
        self.store
            .find_table(name)
            .ok_or_else(|| format!("unknown output table {name}"))
    }

    fn remove_columns(&mut self, ids: &[ColumnId]) {
        self.invalidate_dependents(ids);
        for &id in ids {
            if let Some(column) = self.store.remove_column(id) {
                log::debug!("deleted column {} ({id})", column.name());
            }
        }
        self.graph = None;
    }

    /// Drops the evaluators of every translated column that reads one of `ids`.
    fn invalidate_dependents(&mut self, ids: &[ColumnId]) {
        let graph = self
            .graph
            .take()
            .unwrap_or_else(|| DependencyGraph::build(&self.store));
        let dependents: BTreeSet<ColumnId> = ids
            .iter()
            .flat_map(|&id| graph.dependents(id).iter().copied())
            .filter(|d| !ids.contains(d))
            .collect();
        for column in dependents {
            self.invalidate(column);
        }
    }

    fn invalidate(&mut self, id: ColumnId) {
        if let Some(column) = self.store.column_mut(id) {
            log::debug!("invalidated column {}", column.name());
            column.invalidate();
        }
        self.graph = None;
    }

    // ---- data ----

    /// Appends one row; columns missing from `record` receive `Blank`.
    pub fn append(&mut self, table: TableId, record: &Record) -> StreamResult<usize> {
        let row = self.store.append(table, record)?;
        self.appends_since_evaluate += 1;
        Ok(row)
    }

    pub fn append_json(&mut self, table: TableId, json: &str) -> StreamResult<usize> {
        self.append(table, &Record::from_json(json)?)
    }

    pub fn value(&self, column: ColumnId, row: usize) -> StreamResult<&Value> {
        self.store.value(column, row)
    }

    /// Values of every valid row of the column's table, oldest first.
    pub fn column_values(&self, column: ColumnId) -> StreamResult<Vec<Value>> {
        let input = self.store.require_column(column)?.input();
        let rows = self.store.require_table(input)?.row_range();
        rows.rows()
            .map(|row| self.store.value(column, row).cloned())
            .collect()
    }

    // ---- evaluation ----

    /// Translates every derived column lacking an evaluator and returns the dependency graph.
    pub fn translate(&mut self) -> &DependencyGraph {
        let pending: Vec<ColumnId> = self
            .store
            .columns()
            .filter(|c| c.is_derived() && c.evaluator.is_none())
            .map(Column::id)
            .collect();
        let mut changed = false;
        for id in pending {
            changed |= self.translate_column(id);
        }
        if changed {
            self.graph = None;
        }
        let store = &self.store;
        self.graph.get_or_insert_with(|| DependencyGraph::build(store))
    }

    fn translate_column(&mut self, id: ColumnId) -> bool {
        let Some(definition) = self
            .store
            .column(id)
            .and_then(Column::definition)
            .cloned()
        else {
            return false;
        };
        let result = Evaluator::translate(&self.store, id, &definition, self.backend.as_ref());
        let Some(column) = self.store.column_mut(id) else {
            return false;
        };
        match result {
            Ok(evaluator) => {
                log::debug!(
                    "translated column {}: depends on {:?}",
                    column.name(),
                    evaluator.dependencies()
                );
                column.evaluator = Some(evaluator);
                column.translate_error = None;
                column.needs_full_scan = true;
                true
            }
            Err(err) => {
                if column.translate_error.as_ref() != Some(&err) {
                    log::warn!("cannot translate column {}: {err}", column.name());
                }
                column.translate_error = Some(err);
                false
            }
        }
    }

    /// The plan the next cycle would execute.
    pub fn schedule(&mut self) -> Schedule {
        self.translate().schedule()
    }

    pub fn dependencies(&mut self, column: ColumnId) -> Vec<ColumnId> {
        self.translate().dependencies(column).to_vec()
    }

    pub fn evaluate(&mut self) -> EvaluateReport {
        self.evaluate_at(Utc::now())
    }

    /// Runs one cycle and stamps it with `now`.
    pub fn evaluate_at(&mut self, now: DateTime<Utc>) -> EvaluateReport {
        let report = self.run_cycle();
        self.last_evaluated = Some(now);
        self.appends_since_evaluate = 0;
        report
    }

    /// Treats every valid row as dirty for one cycle.
    pub fn evaluate_full(&mut self) -> EvaluateReport {
        self.mark_all_dirty();
        self.evaluate()
    }

    pub fn set_auto_evaluate(&mut self, policy: AutoEvaluate) {
        self.auto = policy;
    }

    pub fn auto_evaluate_policy(&self) -> AutoEvaluate {
        self.auto
    }

    pub fn last_evaluated(&self) -> Option<DateTime<Utc>> {
        self.last_evaluated
    }

    /// Runs a full re-evaluation if the dwell has elapsed and rows were appended meanwhile.
    pub fn auto_evaluate(&mut self, now: DateTime<Utc>) -> bool {
        let Some(dwell) = self.auto.dwell else {
            return false;
        };
        if self.appends_since_evaluate == 0 {
            return false;
        }
        if self.last_evaluated.is_some_and(|last| now - last < dwell) {
            return false;
        }
        self.mark_all_dirty();
        let report = self.evaluate_at(now);
        log::debug!("auto-evaluated {} columns", report.evaluated.len());
        true
    }

    fn mark_all_dirty(&mut self) {
        for column in self.store.columns_mut().filter(|c| c.is_derived()) {
            column.needs_full_scan = true;
        }
    }

    fn run_cycle(&mut self) -> EvaluateReport {
        let schedule = self.schedule();
        for (i, layer) in schedule.layers().iter().enumerate() {
            log::debug!("layer {i}: {layer:?}");
        }

        let mut report = EvaluateReport::default();
        // Columns whose values are unreliable this cycle.
        let mut halted: HashSet<ColumnId> = HashSet::new();
        // Columns whose old rows may have changed this cycle.
        let mut rewritten: HashSet<ColumnId> = HashSet::new();

        for &id in schedule.layers().iter().flatten() {
            let deps = self
                .graph
                .as_ref()
                .map(|g| g.dependencies(id).to_vec())
                .unwrap_or_default();
            if deps.iter().any(|d| halted.contains(d)) {
                halted.insert(id);
                report.skipped.push(id);
                self.mark_dirty(id);
                continue;
            }
            let upstream_rewritten = deps.iter().any(|d| rewritten.contains(d));
            match self.evaluate_column(id, upstream_rewritten) {
                Ok(true) => {
                    rewritten.insert(id);
                    report.evaluated.push(id);
                }
                Ok(false) => report.evaluated.push(id),
                Err(_) => {
                    halted.insert(id);
                    report.failed.push(id);
                }
            }
        }
        for &id in schedule.excluded() {
            report.skipped.push(id);
            self.mark_dirty(id);
        }

        self.store.finish_cycle();
        log::info!(
            "evaluate cycle: {} evaluated, {} failed, {} skipped",
            report.evaluated.len(),
            report.failed.len(),
            report.skipped.len()
        );
        report
    }

    fn mark_dirty(&mut self, id: ColumnId) {
        if let Some(column) = self.store.column_mut(id) {
            column.needs_full_scan = true;
        }
    }

    /// Runs one column's evaluator. Returns whether rows outside the new range were written.
    fn evaluate_column(&mut self, id: ColumnId, force_full: bool) -> StreamResult<bool> {
        let column = self
            .store
            .column_mut(id)
            .ok_or_else(|| StreamError::Evaluate(format!("unknown column {id}")))?;
        let Some(mut evaluator) = column.evaluator.take() else {
            return Ok(false);
        };
        let full = force_full || column.needs_full_scan;
        let rewrites_all = full || matches!(evaluator, Evaluator::Accu(_));
        let name = column.name().to_string();

        let result = EvalContext::new(&mut self.store, id, full).and_then(|mut ctx| {
            let range = ctx.scan_range()?;
            log::trace!("scanning {name} over {range} (full: {full})");
            evaluator.evaluate(&mut ctx)
        });

        let column = self
            .store
            .column_mut(id)
            .ok_or_else(|| StreamError::Evaluate(format!("unknown column {id}")))?;
        column.evaluator = Some(evaluator);
        match result {
            Ok(rows) => {
                log::trace!("{name}: {rows} rows written");
                column.evaluate_error = None;
                column.needs_full_scan = false;
                Ok(rewrites_all)
            }
            Err(err) => {
                log::warn!("cannot evaluate column {name}: {err}");
                column.evaluate_error = Some(err.clone());
                column.needs_full_scan = true;
                Err(err)
            }
        }
    }
}

fn accumulates_from(column: &Column, table: &str) -> bool {
    matches!(
        column.definition(),
        Some(ColumnDefinition::Accu { accumulate_table, .. })
            if accumulate_table.eq_ignore_ascii_case(table)
    )
}
