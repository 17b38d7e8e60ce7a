use crate::range::Range;

pub type StreamResult<T> = Result<T, StreamError>;

/// Errors produced while defining, translating or evaluating columns.
///
/// Translate-phase errors (`Parse`, `Bind`, `Build`) and evaluate-phase errors are stored on the
/// owning column instead of being raised from [`crate::Schema::evaluate`], so the type is `Clone`.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum StreamError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("cannot resolve path {path} from table {table}")]
    Bind { table: String, path: String },

    #[error("build error: {0}")]
    Build(String),

    #[error("evaluation error: {0}")]
    Evaluate(String),

    #[error("row {row} of column {column} is outside the valid range {valid}")]
    OutOfRange {
        column: String,
        row: usize,
        valid: Range,
    },

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("unknown column {table}.{column}")]
    UnknownColumn { table: String, column: String },

    #[error("cannot create element: {0}")]
    CreateElement(String),

    #[error("cannot update element: {0}")]
    UpdateElement(String),

    #[error("cannot delete element: {0}")]
    DeleteElement(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl StreamError {
    /// Whether the error came out of the parse/bind/build pipeline.
    pub fn is_translate_error(&self) -> bool {
        matches!(
            self,
            StreamError::Parse(_) | StreamError::Bind { .. } | StreamError::Build(_)
        )
    }
}
