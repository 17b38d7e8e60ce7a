//! Formula translation: parse → bind → build.
//!
//! A formula is ordinary expression text in which column paths appear as bracketed names, for
//! example `[Price] * [Order].[Customer].[Discount]`. Translation
//!
//! 1. **parses** the text for path references (adjacent bracketed names joined by `.` form one
//!    multi-segment path, and the single name `[out]` denotes the column's current value),
//! 2. **binds** every path to a chain of columns starting at the formula's table, and
//! 3. **builds** an executable expression by replacing every reference with a generated variable
//!    and compiling the result with an [`ExpressionBackend`].
//!
//! A formula that is nothing but one reference skips the backend entirely and evaluates to that
//! reference's value, which also lets text and row values flow through unchanged.
use crate::column::ColumnId;
use crate::error::{StreamError, StreamResult};
use crate::expr::{CompiledExpression, ExpressionBackend};
use crate::path::{ColumnPath, QualifiedName};
use crate::record::normalize_name;
use crate::store::Store;
use crate::table::TableId;
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::ops::Range as Span;

/// Reserved path name for the value currently stored in the column being computed.
pub const OUTPUT_TERM: &str = "out";

const OUTPUT_VARIABLE: &str = "__out";

/// Where a reference reads its value from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    /// Index into the formula's parameter list.
    Ordinary(usize),
    CurrentOutput,
}

impl Slot {
    fn variable(self) -> String {
        match self {
            Slot::Ordinary(idx) => format!("__p{idx}"),
            Slot::CurrentOutput => OUTPUT_VARIABLE.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PathReference {
    pub name: QualifiedName,
    /// Byte span of the reference in the formula text, brackets included.
    pub span: Span<usize>,
    pub slot: Slot,
}

/// Result of the parse phase.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedFormula {
    text: String,
    references: Vec<PathReference>,
    /// Distinct ordinary paths, indexed by [`Slot::Ordinary`].
    paths: Vec<QualifiedName>,
}

impl ParsedFormula {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn references(&self) -> &[PathReference] {
        &self.references
    }

    pub fn paths(&self) -> &[QualifiedName] {
        &self.paths
    }

    pub fn uses_output(&self) -> bool {
        self.references
            .iter()
            .any(|r| r.slot == Slot::CurrentOutput)
    }

    /// The slot of a formula consisting of exactly one reference and nothing else.
    fn identity_slot(&self) -> Option<Slot> {
        let [only] = self.references.as_slice() else {
            return None;
        };
        let trimmed = self.text.trim();
        (&self.text[only.span.clone()] == trimmed).then_some(only.slot)
    }
}

/// Scans formula text for bracketed path references.
pub fn parse_formula(text: &str) -> StreamResult<ParsedFormula> {
    let mut references = Vec::new();
    let mut paths: Vec<QualifiedName> = Vec::new();
    let mut path_index: HashMap<Vec<String>, usize> = HashMap::new();

    let bytes = text.as_bytes();
    let mut pos = 0;
    while pos < bytes.len() {
        match bytes[pos] {
            b'"' => pos = skip_string(text, pos)?,
            b'[' => {
                let start = pos;
                let mut segments = Vec::new();
                loop {
                    let (segment, end) = read_bracket(text, pos)?;
                    segments.push(segment);
                    pos = end;
                    match continuation(bytes, pos) {
                        Some(next) => pos = next,
                        None => break,
                    }
                }

                let slot = if segments.len() == 1 && segments[0].eq_ignore_ascii_case(OUTPUT_TERM)
                {
                    Slot::CurrentOutput
                } else {
                    let key: Vec<String> = segments.iter().map(|s| normalize_name(s)).collect();
                    let idx = *path_index.entry(key).or_insert_with(|| {
                        paths.push(QualifiedName::new(segments.clone()));
                        paths.len() - 1
                    });
                    Slot::Ordinary(idx)
                };
                references.push(PathReference {
                    name: QualifiedName::new(segments),
                    span: start..pos,
                    slot,
                });
            }
            _ => pos += 1,
        }
    }

    Ok(ParsedFormula {
        text: text.to_string(),
        references,
        paths,
    })
}

/// Returns the byte offset just past the string literal starting at `start`.
fn skip_string(text: &str, start: usize) -> StreamResult<usize> {
    let bytes = text.as_bytes();
    let mut pos = start + 1;
    while pos < bytes.len() {
        if bytes[pos] == b'"' {
            if bytes.get(pos + 1) == Some(&b'"') {
                pos += 2;
                continue;
            }
            return Ok(pos + 1);
        }
        pos += 1;
    }
    Err(StreamError::Parse(format!(
        "unterminated string in formula {text:?}"
    )))
}

/// Reads `[name]` starting at `start`, returning the name and the offset past the `]`.
fn read_bracket(text: &str, start: usize) -> StreamResult<(String, usize)> {
    let bytes = text.as_bytes();
    let mut pos = start + 1;
    let mut name = String::new();
    let mut chunk_start = pos;
    while pos < bytes.len() {
        if bytes[pos] == b']' {
            name.push_str(&text[chunk_start..pos]);
            if bytes.get(pos + 1) == Some(&b']') {
                name.push(']');
                pos += 2;
                chunk_start = pos;
                continue;
            }
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(StreamError::Parse(format!(
                    "empty column reference in formula {text:?}"
                )));
            }
            return Ok((name, pos + 1));
        }
        pos += 1;
    }
    Err(StreamError::Parse(format!(
        "unterminated column reference in formula {text:?}"
    )))
}

/// If the next bracketed name continues the current path (`] . [`), returns its offset.
fn continuation(bytes: &[u8], pos: usize) -> Option<usize> {
    let skip_ws = |mut p: usize| {
        while p < bytes.len() && bytes[p].is_ascii_whitespace() {
            p += 1;
        }
        p
    };
    let dot = skip_ws(pos);
    if bytes.get(dot) != Some(&b'.') {
        return None;
    }
    let next = skip_ws(dot + 1);
    (bytes.get(next) == Some(&b'[')).then_some(next)
}

/// Result of the bind phase: every ordinary path resolved to columns.
#[derive(Clone, Debug)]
pub struct BoundFormula {
    parsed: ParsedFormula,
    params: Vec<ColumnPath>,
}

impl BoundFormula {
    pub fn params(&self) -> &[ColumnPath] {
        &self.params
    }
}

pub(crate) fn bind(
    parsed: ParsedFormula,
    store: &Store,
    table: TableId,
) -> StreamResult<BoundFormula> {
    let params = parsed
        .paths
        .iter()
        .map(|name| name.resolve(store, table))
        .collect::<StreamResult<Vec<_>>>()?;
    Ok(BoundFormula { parsed, params })
}

enum Body {
    Identity(Slot),
    Compiled(Box<dyn CompiledExpression>),
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Identity(slot) => f.debug_tuple("Identity").field(slot).finish(),
            Body::Compiled(expr) => f.debug_tuple("Compiled").field(expr).finish(),
        }
    }
}

/// An executable formula bound to concrete columns.
#[derive(Debug)]
pub struct Translation {
    formula: String,
    params: Vec<ColumnPath>,
    uses_output: bool,
    numeric_placeholders: bool,
    body: Body,
}

pub(crate) fn build(
    bound: BoundFormula,
    backend: &dyn ExpressionBackend,
) -> StreamResult<Translation> {
    let BoundFormula { parsed, params } = bound;
    let uses_output = parsed.uses_output();

    let body = match parsed.identity_slot() {
        Some(slot) => Body::Identity(slot),
        None => {
            let mut rewritten = parsed.text.clone();
            for reference in parsed.references.iter().rev() {
                rewritten.replace_range(reference.span.clone(), &reference.slot.variable());
            }
            let mut variables: Vec<String> = (0..params.len())
                .map(|idx| Slot::Ordinary(idx).variable())
                .collect();
            if uses_output {
                variables.push(OUTPUT_VARIABLE.to_string());
            }
            let compiled = backend.compile(&rewritten, &variables).map_err(|err| match err {
                StreamError::Parse(msg) => {
                    StreamError::Parse(format!("{msg} in formula {:?}", parsed.text))
                }
                StreamError::Build(msg) => {
                    StreamError::Build(format!("{msg} in formula {:?}", parsed.text))
                }
                other => other,
            })?;
            Body::Compiled(compiled)
        }
    };

    Ok(Translation {
        formula: parsed.text,
        params,
        uses_output,
        numeric_placeholders: backend.requires_numeric_placeholders(),
        body,
    })
}

/// Runs the whole pipeline for `formula` relative to `table`.
pub(crate) fn translate(
    formula: &str,
    store: &Store,
    table: TableId,
    backend: &dyn ExpressionBackend,
) -> StreamResult<Translation> {
    let parsed = parse_formula(formula)?;
    let bound = bind(parsed, store, table)?;
    build(bound, backend)
}

impl Translation {
    pub fn formula(&self) -> &str {
        &self.formula
    }

    pub fn params(&self) -> &[ColumnPath] {
        &self.params
    }

    pub fn uses_output(&self) -> bool {
        self.uses_output
    }

    pub fn is_identity(&self) -> bool {
        matches!(self.body, Body::Identity(_))
    }

    /// Every column read by the formula, excluding the current-output term.
    pub fn dependencies(&self) -> impl Iterator<Item = ColumnId> + '_ {
        self.params.iter().flat_map(|p| p.columns().iter().copied())
    }

    /// Reads every parameter for `row` of the formula's table into `out`.
    pub(crate) fn read_params(
        &self,
        store: &Store,
        row: usize,
        out: &mut Vec<Value>,
    ) -> StreamResult<()> {
        out.clear();
        for path in &self.params {
            out.push(path.read(store, row)?);
        }
        Ok(())
    }

    /// Evaluates the formula for one row's parameter values.
    pub fn evaluate(&mut self, params: &[Value], current_output: &Value) -> StreamResult<Value> {
        match &mut self.body {
            Body::Identity(Slot::Ordinary(idx)) => {
                Ok(params.get(*idx).cloned().unwrap_or_default())
            }
            Body::Identity(Slot::CurrentOutput) => Ok(current_output.clone()),
            Body::Compiled(expr) => {
                for (idx, value) in params.iter().enumerate() {
                    let value = if value.is_blank() && self.numeric_placeholders {
                        Value::Number(f64::NAN)
                    } else {
                        value.clone()
                    };
                    expr.set_variable(&Slot::Ordinary(idx).variable(), value);
                }
                if self.uses_output {
                    let value = if current_output.is_blank() && self.numeric_placeholders {
                        Value::Number(f64::NAN)
                    } else {
                        current_output.clone()
                    };
                    expr.set_variable(OUTPUT_VARIABLE, value);
                }
                expr.evaluate().map_err(|err| match err {
                    StreamError::Evaluate(msg) => {
                        StreamError::Evaluate(format!("{msg} in formula {:?}", self.formula))
                    }
                    other => other,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::NativeBackend;
    use pretty_assertions::assert_eq;

    fn names(parsed: &ParsedFormula) -> Vec<String> {
        parsed.paths().iter().map(ToString::to_string).collect()
    }

    #[test]
    fn merges_dotted_brackets_into_one_path() {
        let parsed = parse_formula("[Order] . [Customer].[Discount] * [Price]").unwrap();
        assert_eq!(names(&parsed), vec!["[Order].[Customer].[Discount]", "[Price]"]);
        assert_eq!(parsed.references()[0].span, 0..31);
        assert_eq!(parsed.references()[1].slot, Slot::Ordinary(1));
    }

    #[test]
    fn repeated_paths_share_one_parameter() {
        let parsed = parse_formula("[A] * [a] + [B]").unwrap();
        assert_eq!(names(&parsed), vec!["[A]", "[B]"]);
        let slots: Vec<Slot> = parsed.references().iter().map(|r| r.slot).collect();
        assert_eq!(slots, vec![Slot::Ordinary(0), Slot::Ordinary(0), Slot::Ordinary(1)]);
    }

    #[test]
    fn out_goes_to_current_output_slot() {
        let parsed = parse_formula("[out] + [Amount]").unwrap();
        assert!(parsed.uses_output());
        assert_eq!(names(&parsed), vec!["[Amount]"]);
        assert_eq!(parsed.references()[0].slot, Slot::CurrentOutput);
    }

    #[test]
    fn brackets_inside_strings_are_not_references() {
        let parsed = parse_formula(r#""[x]" & [Name] & "say ""[y]""""#).unwrap();
        assert_eq!(names(&parsed), vec!["[Name]"]);
    }

    #[test]
    fn malformed_references_are_parse_errors() {
        for text in ["[A", "[] + 1", "\"open [A]"] {
            assert!(
                matches!(parse_formula(text), Err(StreamError::Parse(_))),
                "expected parse error for {text:?}"
            );
        }
    }

    #[test]
    fn identity_only_for_a_lone_reference() {
        assert_eq!(parse_formula("  [A]  ").unwrap().identity_slot(), Some(Slot::Ordinary(0)));
        assert_eq!(parse_formula("[out]").unwrap().identity_slot(), Some(Slot::CurrentOutput));
        assert_eq!(parse_formula("[A] + 0").unwrap().identity_slot(), None);
        assert_eq!(parse_formula("([A])").unwrap().identity_slot(), None);
    }

    #[test]
    fn build_rewrites_references_and_evaluates() {
        let parsed = parse_formula("[out] + [A] * 2").unwrap();
        let bound = BoundFormula {
            parsed,
            params: vec![dummy_path()],
        };
        let mut translation = build(bound, &NativeBackend).unwrap();
        assert!(!translation.is_identity());
        let value = translation
            .evaluate(&[Value::from(3.0)], &Value::from(10.0))
            .unwrap();
        assert_eq!(value, Value::from(16.0));

        let result = translation.evaluate(&[Value::Blank], &Value::from(1.0));
        let Value::Number(n) = result.unwrap() else {
            panic!("expected a number");
        };
        assert!(n.is_nan());
    }

    #[test]
    fn build_errors_mention_the_formula() {
        let parsed = parse_formula("[A] +* 2").unwrap();
        let bound = BoundFormula {
            parsed,
            params: vec![dummy_path()],
        };
        let err = build(bound, &NativeBackend).unwrap_err();
        assert!(matches!(err, StreamError::Parse(_)));
        assert!(err.to_string().contains("[A] +* 2"), "{err}");
    }

    fn dummy_path() -> ColumnPath {
        let mut store = Store::default();
        let table = store.add_table(|id| crate::table::Table::new(id, "T", None));
        let output = store.add_table(|id| crate::table::Table::new(id, "D", None));
        store.add_column("A", table, output).unwrap();
        QualifiedName::new(vec!["A".into()])
            .resolve(&store, table)
            .unwrap()
    }
}
