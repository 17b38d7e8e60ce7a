//! Incremental, formula-driven column engine.
//!
//! A [`Schema`] owns append-only tables whose derived columns are recomputed from other
//! columns. Each evaluate cycle only scans rows appended since the previous cycle, except for
//! accumulations, which are rebuilt from their fact table every time.
//!
//! ```
//! use formula_stream::{ColumnConfig, Record, Schema, TableConfig, Value};
//!
//! let mut schema = Schema::new();
//! let t = schema.create_table(&TableConfig::new("T")).unwrap();
//! schema.create_column(&ColumnConfig::free("T", "A", "Double")).unwrap();
//! let b = schema.create_column(&ColumnConfig::calc("T", "B", "[A] + 2")).unwrap();
//!
//! let row = schema.append(t, &Record::new().with("A", 5.0)).unwrap();
//! schema.evaluate();
//! assert_eq!(schema.value(b, row).unwrap(), &Value::Number(7.0));
//! ```
#![forbid(unsafe_code)]

mod column;
mod config;
mod error;
mod evaluator;
mod expr;
mod graph;
mod path;
mod range;
mod record;
mod schema;
mod store;
mod table;
mod translate;
mod value;

pub use crate::column::{Column, ColumnDefinition, ColumnId, ColumnKind, LinkMember};
pub use crate::config::{ColumnConfig, TableConfig};
pub use crate::error::{StreamError, StreamResult};
pub use crate::evaluator::{AccuEvaluator, CalcEvaluator, Evaluator, LinkEvaluator};
pub use crate::graph::{DependencyGraph, Schedule};
pub use crate::path::{ColumnPath, QualifiedName};
pub use crate::range::Range;
pub use crate::record::Record;
pub use crate::schema::{AutoEvaluate, EvaluateReport, Schema};
pub use crate::table::{PrimitiveType, Table, TableId};
pub use crate::translate::{
    parse_formula, BoundFormula, ParsedFormula, PathReference, Slot, Translation, OUTPUT_TERM,
};
pub use crate::value::Value;

pub use crate::expr::{
    parse_expression, BinaryOp, CompiledExpression, Expr, ExpressionBackend, NativeBackend, UnaryOp,
};
