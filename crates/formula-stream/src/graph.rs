//! Column dependency graph and the layered evaluation schedule built from it.
use crate::column::ColumnId;
use crate::store::Store;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// "Reads from" edges between derived columns and the columns they depend on.
///
/// Built once per translation pass from the translated evaluators and reused until a formula,
/// column, or table changes.
#[derive(Clone, Debug, Default)]
pub struct DependencyGraph {
    /// Every derived column, mapped to its dependencies. Columns without a translated
    /// evaluator have no entry here and are listed in `blocked` instead.
    dependencies: BTreeMap<ColumnId, Vec<ColumnId>>,
    dependents: HashMap<ColumnId, Vec<ColumnId>>,
    /// Derived columns that carry a translate error (or were never translated).
    blocked: BTreeSet<ColumnId>,
}

impl DependencyGraph {
    pub(crate) fn build(store: &Store) -> Self {
        let mut graph = DependencyGraph::default();

        // Rows appended by a link column are new rows of its output table, so every derived
        // column of that table, and every accumulation folding that table, runs after the link.
        let mut appenders: HashMap<_, Vec<ColumnId>> = HashMap::new();
        for column in store.columns() {
            if let Some(table) = column.evaluator.as_ref().and_then(|e| e.appends_to()) {
                appenders.entry(table).or_default().push(column.id());
            }
        }

        for column in store.columns().filter(|c| c.is_derived()) {
            let id = column.id();
            let Some(evaluator) = column.evaluator.as_ref() else {
                graph.blocked.insert(id);
                continue;
            };
            let mut deps = evaluator.dependencies().to_vec();
            let scanned = std::iter::once(column.input()).chain(evaluator.scans_table());
            for table in scanned {
                if let Some(links) = appenders.get(&table) {
                    deps.extend(links.iter().copied().filter(|&l| l != id));
                }
            }
            deps.sort_unstable();
            deps.dedup();
            for &dep in &deps {
                graph.dependents.entry(dep).or_default().push(id);
            }
            graph.dependencies.insert(id, deps);
        }
        graph
    }

    pub fn dependencies(&self, column: ColumnId) -> &[ColumnId] {
        self.dependencies.get(&column).map_or(&[], Vec::as_slice)
    }

    pub fn dependents(&self, column: ColumnId) -> &[ColumnId] {
        self.dependents.get(&column).map_or(&[], Vec::as_slice)
    }

    fn is_derived(&self, column: ColumnId) -> bool {
        self.dependencies.contains_key(&column) || self.blocked.contains(&column)
    }

    /// Breadth-first layering.
    ///
    /// Layer 0 holds derived columns whose dependencies are all free columns; layer `k + 1`
    /// holds columns whose dependencies are free or already in layers `0..=k`. Columns that are
    /// blocked, depend on a blocked column, or sit on or behind a cycle never enter a layer and
    /// are reported as excluded.
    pub fn schedule(&self) -> Schedule {
        let mut scheduled: BTreeSet<ColumnId> = BTreeSet::new();
        let mut layers: Vec<Vec<ColumnId>> = Vec::new();

        loop {
            let layer: Vec<ColumnId> = self
                .dependencies
                .iter()
                .filter(|(id, _)| !scheduled.contains(*id))
                .filter(|(_, deps)| {
                    deps.iter().all(|dep| {
                        !self.blocked.contains(dep)
                            && (!self.is_derived(*dep) || scheduled.contains(dep))
                    })
                })
                .map(|(id, _)| *id)
                .collect();
            if layer.is_empty() {
                break;
            }
            scheduled.extend(layer.iter().copied());
            layers.push(layer);
        }

        let excluded = self
            .dependencies
            .keys()
            .copied()
            .filter(|id| !scheduled.contains(id))
            .chain(self.blocked.iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        Schedule { layers, excluded }
    }
}

/// Evaluation order for one cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Schedule {
    layers: Vec<Vec<ColumnId>>,
    excluded: Vec<ColumnId>,
}

impl Schedule {
    /// Columns within one layer do not depend on each other.
    pub fn layers(&self) -> &[Vec<ColumnId>] {
        &self.layers
    }

    /// Derived columns that will not be evaluated this cycle.
    pub fn excluded(&self) -> &[ColumnId] {
        &self.excluded
    }

    /// Index of the layer containing `column`.
    pub fn layer_of(&self, column: ColumnId) -> Option<usize> {
        self.layers.iter().position(|layer| layer.contains(&column))
    }

    pub fn is_scheduled(&self, column: ColumnId) -> bool {
        self.layer_of(column).is_some()
    }
}
