//! Arithmetic expression backends.
//!
//! The translator rewrites every column path in a formula into a generated variable name and
//! hands the rewritten text to an [`ExpressionBackend`]. Backends only need to understand
//! variables, literals and operators; they never see column paths.
mod native;
mod parser;

pub use self::native::NativeBackend;
pub use self::parser::{parse as parse_expression, BinaryOp, Expr, UnaryOp};

use crate::error::StreamResult;
use crate::value::Value;
use std::fmt;

/// Compiles rewritten formula text into a re-evaluable expression.
pub trait ExpressionBackend: fmt::Debug {
    /// `variables` lists every identifier the text may reference. Referencing anything else, or
    /// text that does not parse, fails with [`crate::StreamError::Build`] or
    /// [`crate::StreamError::Parse`].
    fn compile(
        &self,
        text: &str,
        variables: &[String],
    ) -> StreamResult<Box<dyn CompiledExpression>>;

    /// Whether null inputs must be replaced by NaN before evaluation.
    fn requires_numeric_placeholders(&self) -> bool {
        true
    }
}

/// An expression returned by [`ExpressionBackend::compile`].
pub trait CompiledExpression: fmt::Debug {
    /// Sets the live value of a declared variable. Unknown names are ignored.
    fn set_variable(&mut self, name: &str, value: Value);

    fn evaluate(&self) -> StreamResult<Value>;
}
