//! Qualified names and the column paths they resolve to.
use crate::column::ColumnId;
use crate::error::{StreamError, StreamResult};
use crate::store::Store;
use crate::table::TableId;
use crate::value::Value;
use std::fmt;

/// An ordered list of name segments such as `Orders.Customer.Name` or `[Orders].[Unit Price]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    segments: Vec<String>,
}

impl QualifiedName {
    pub fn new(segments: Vec<String>) -> Self {
        Self { segments }
    }

    /// Parses dotted text where every segment is either a bare name or a `[bracketed name]`.
    ///
    /// Inside brackets `]]` stands for a literal `]` and dots carry no meaning.
    pub fn parse(text: &str) -> StreamResult<Self> {
        let mut segments = Vec::new();
        let mut chars = text.trim().chars().peekable();
        if chars.peek().is_none() {
            return Err(StreamError::Parse("empty path".into()));
        }
        loop {
            while chars.next_if(|c| c.is_whitespace()).is_some() {}
            let segment = if chars.next_if_eq(&'[').is_some() {
                let mut out = String::new();
                loop {
                    match chars.next() {
                        None => {
                            return Err(StreamError::Parse(format!(
                                "unterminated bracket in path {text:?}"
                            )))
                        }
                        Some(']') => {
                            if chars.next_if_eq(&']').is_some() {
                                out.push(']');
                                continue;
                            }
                            break;
                        }
                        Some(c) => out.push(c),
                    }
                }
                out
            } else {
                let mut out = String::new();
                while let Some(c) = chars.next_if(|c| *c != '.') {
                    if c == '[' || c == ']' {
                        return Err(StreamError::Parse(format!(
                            "unexpected {c:?} in path {text:?}"
                        )));
                    }
                    out.push(c);
                }
                out
            };
            let segment = segment.trim().to_string();
            if segment.is_empty() {
                return Err(StreamError::Parse(format!("empty segment in path {text:?}")));
            }
            segments.push(segment);

            while chars.next_if(|c| c.is_whitespace()).is_some() {}
            match chars.next() {
                None => break,
                Some('.') => continue,
                Some(other) => {
                    return Err(StreamError::Parse(format!(
                        "expected '.' between path segments, found {other:?} in {text:?}"
                    )))
                }
            }
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Resolves the name to a chain of columns starting at `table`.
    pub(crate) fn resolve(&self, store: &Store, table: TableId) -> StreamResult<ColumnPath> {
        let table_name = store
            .table(table)
            .map(|t| t.name().to_string())
            .unwrap_or_else(|| table.to_string());
        let unresolved = || StreamError::Bind {
            table: table_name.clone(),
            path: self.to_string(),
        };

        let mut columns = Vec::with_capacity(self.segments.len());
        let mut current = table;
        for segment in &self.segments {
            let current_table = store.table(current).ok_or_else(unresolved)?;
            if current_table.is_primitive() {
                return Err(unresolved());
            }
            let column = store.find_column(current, segment).ok_or_else(unresolved)?;
            columns.push(column);
            current = store.require_column(column)?.output();
        }
        if columns.is_empty() {
            return Err(unresolved());
        }
        Ok(ColumnPath {
            columns,
            output: current,
        })
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, segment) in self.segments.iter().enumerate() {
            if idx > 0 {
                f.write_str(".")?;
            }
            write!(f, "[{}]", segment.replace(']', "]]"))?;
        }
        Ok(())
    }
}

/// A resolved chain of columns `[c1, .., cn]` with `c(i+1).input == c(i).output`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnPath {
    columns: Vec<ColumnId>,
    output: TableId,
}

impl ColumnPath {
    pub fn columns(&self) -> &[ColumnId] {
        &self.columns
    }

    /// Output domain of the last column.
    pub fn output(&self) -> TableId {
        self.output
    }

    /// Follows the path from `row` of the starting table.
    ///
    /// A `Blank` anywhere along the way yields `Blank`.
    pub(crate) fn read(&self, store: &Store, row: usize) -> StreamResult<Value> {
        let mut row = row;
        let (last, hops) = self
            .columns
            .split_last()
            .ok_or_else(|| StreamError::Evaluate("empty column path".into()))?;
        for &column in hops {
            match store.value(column, row)?.as_row()? {
                Some(next) => row = next,
                None => return Ok(Value::Blank),
            }
        }
        store.value(*last, row).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segments(text: &str) -> Vec<String> {
        QualifiedName::parse(text).unwrap().segments().to_vec()
    }

    #[test]
    fn parses_bare_and_bracketed_segments() {
        assert_eq!(segments("a"), vec!["a"]);
        assert_eq!(segments("a.b.c"), vec!["a", "b", "c"]);
        assert_eq!(segments("[Unit Price]"), vec!["Unit Price"]);
        assert_eq!(segments("[x.y] . b"), vec!["x.y", "b"]);
        assert_eq!(segments("[a]]b]"), vec!["a]b"]);
    }

    #[test]
    fn rejects_malformed_paths() {
        for text in ["", "a..b", "[a", "a.", "[a] b", "a[b]"] {
            assert!(
                matches!(QualifiedName::parse(text), Err(StreamError::Parse(_))),
                "expected parse error for {text:?}"
            );
        }
    }

    #[test]
    fn display_brackets_every_segment() {
        let name = QualifiedName::parse("Group.[Unit]]s]").unwrap();
        assert_eq!(name.to_string(), "[Group].[Unit]]s]");
    }
}
