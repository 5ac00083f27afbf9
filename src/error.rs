use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("evaluation error: {0}")]
    Eval(String),

    #[error("unsupported field `{field}`: {reason}")]
    FieldAccess { field: String, reason: String },

    #[error("could not compute `{column}` for {document}: {source}")]
    Cell {
        column: String,
        document: String,
        source: Box<Error>,
    },

    #[error("definition error: {0}")]
    DefinitionParse(String),

    #[error("sort error: {0}")]
    SortSpec(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("path is outside of the corpus root: {0}")]
    OutsideRoot(PathBuf),
}

impl Error {
    pub(crate) fn field(
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::FieldAccess {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// A failure to turn expression text into an [`Expr`](crate::expr::Expr).
///
/// Kept separate from [`Error`] because it is cloneable: a filter that
/// failed to compile stores it and surfaces it again on every strict check.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("could not compile `{expr}` near byte {position}: {message}")]
pub struct CompileError {
    pub expr: String,
    pub position: usize,
    pub message: String,
}

impl CompileError {
    pub fn new(
        expr: &str,
        position: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            expr: expr.to_string(),
            position,
            message: message.into(),
        }
    }
}
