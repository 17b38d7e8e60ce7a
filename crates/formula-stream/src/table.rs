use crate::column::ColumnId;
use crate::range::Range;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub(crate) usize);

impl TableId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Built-in value domains. Primitive tables own no rows and terminate column paths.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Double,
    Integer,
    String,
    Boolean,
    Object,
}

impl PrimitiveType {
    pub const ALL: [PrimitiveType; 5] = [
        PrimitiveType::Double,
        PrimitiveType::Integer,
        PrimitiveType::String,
        PrimitiveType::Boolean,
        PrimitiveType::Object,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PrimitiveType::Double => "Double",
            PrimitiveType::Integer => "Integer",
            PrimitiveType::String => "String",
            PrimitiveType::Boolean => "Boolean",
            PrimitiveType::Object => "Object",
        }
    }
}

/// An append-only row space shared by a set of columns.
///
/// Rows are partitioned into three contiguous ranges:
///
/// ```text
/// del_range.start <= del_range.end == row_range.start
/// row_range.start <= new_range.start <= new_range.end == row_range.end
/// ```
///
/// `del_range` holds evicted rows that are still physically stored, `row_range` holds all valid
/// rows (clean followed by new), and `new_range` holds rows appended since the last evaluation.
#[derive(Clone, Debug)]
pub struct Table {
    id: TableId,
    name: String,
    primitive: Option<PrimitiveType>,
    pub(crate) columns: Vec<ColumnId>,
    max_rows: Option<usize>,
    del_range: Range,
    row_range: Range,
    new_range: Range,
}

impl Table {
    pub(crate) fn new(id: TableId, name: impl Into<String>, max_rows: Option<usize>) -> Self {
        Self {
            id,
            name: name.into(),
            primitive: None,
            columns: Vec::new(),
            max_rows,
            del_range: Range::default(),
            row_range: Range::default(),
            new_range: Range::default(),
        }
    }

    pub(crate) fn primitive(id: TableId, primitive: PrimitiveType) -> Self {
        let mut table = Self::new(id, primitive.name(), None);
        table.primitive = Some(primitive);
        table
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn primitive_type(&self) -> Option<PrimitiveType> {
        self.primitive
    }

    pub fn is_primitive(&self) -> bool {
        self.primitive.is_some()
    }

    pub fn columns(&self) -> &[ColumnId] {
        &self.columns
    }

    pub fn max_rows(&self) -> Option<usize> {
        self.max_rows
    }

    /// Evicted rows that have not been retired yet.
    pub fn del_range(&self) -> Range {
        self.del_range
    }

    /// All currently valid rows (clean and new).
    pub fn row_range(&self) -> Range {
        self.row_range
    }

    /// Rows appended since the last evaluation cycle.
    pub fn new_range(&self) -> Range {
        self.new_range
    }

    /// Rows that have been evaluated at least once.
    pub fn clean_range(&self) -> Range {
        Range::new(self.row_range.start, self.new_range.start)
    }

    /// Rows whose storage is still readable: deleted-but-not-retired plus valid rows.
    pub fn stored_range(&self) -> Range {
        Range::new(self.del_range.start, self.row_range.end)
    }

    pub fn row_count(&self) -> usize {
        self.row_range.len()
    }

    /// Reserves the next row id. Column storage is grown by the schema.
    pub(crate) fn push_row(&mut self) -> usize {
        let row = self.row_range.end;
        self.new_range = self.new_range.extend_end(1);
        self.row_range = self.row_range.extend_end(1);
        self.evict_excess();
        row
    }

    pub(crate) fn set_max_rows(&mut self, max_rows: Option<usize>) {
        self.max_rows = max_rows;
        self.evict_excess();
    }

    fn evict_excess(&mut self) {
        let Some(max_rows) = self.max_rows else {
            return;
        };
        let excess = self.row_range.len().saturating_sub(max_rows);
        if excess == 0 {
            return;
        }
        let boundary = self.row_range.start + excess;
        self.del_range = Range::new(self.del_range.start, boundary);
        self.row_range = self.row_range.trim_start(boundary);
        self.new_range = self.new_range.trim_start(boundary);
    }

    /// Marks all new rows as clean.
    pub(crate) fn promote_new(&mut self) {
        self.new_range = Range::empty_at(self.new_range.end);
    }

    /// Drops the deleted range, returning the rows whose storage must be freed.
    pub(crate) fn retire_deleted(&mut self) -> Range {
        let retired = self.del_range;
        self.del_range = Range::empty_at(retired.end);
        self.row_range = self.row_range.trim_start(retired.end);
        retired
    }

    pub(crate) fn ranges_are_consistent(&self) -> bool {
        self.del_range.start <= self.del_range.end
            && self.del_range.end == self.row_range.start
            && self.row_range.start <= self.new_range.start
            && self.new_range.start <= self.new_range.end
            && self.new_range.end == self.row_range.end
    }
}
