//! Boolean filter trees built from definition files.

use crate::{
    document::DocumentContext,
    error::{CompileError, Error, Result},
    expr::Expr,
    messages::Severity,
};

#[derive(Debug, Clone)]
pub enum Filter {
    /// Matches every document.
    Trivial,
    Field(FieldFilter),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    /// Whether `doc` passes.
    ///
    /// Children are checked left to right and stop at the first deciding
    /// result, so `And([])` passes and `Or([])` does not.
    pub fn check(&self, doc: &DocumentContext) -> Result<bool> {
        match self {
            Filter::Trivial => Ok(true),
            Filter::Field(field) => field.check(doc),
            Filter::And(children) => {
                for child in children {
                    if !child.check(doc)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Filter::Or(children) => {
                for child in children {
                    if child.check(doc)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    /// Every expression in the tree that failed to compile.
    pub fn compile_errors(&self) -> Vec<&CompileError> {
        match self {
            Filter::Trivial => Vec::new(),
            Filter::Field(field) => field.compile_error().into_iter().collect(),
            Filter::And(children) | Filter::Or(children) => children
                .iter()
                .flat_map(Filter::compile_errors)
                .collect(),
        }
    }

    /// Combine two filters, skipping trivial sides.
    pub fn and(self, other: Filter) -> Filter {
        match (self, other) {
            (Filter::Trivial, f) | (f, Filter::Trivial) => f,
            (left, right) => Filter::And(vec![left, right]),
        }
    }
}

/// A single expression filter.
///
/// Compilation happens once, up front. A failure is kept rather than
/// raised so that a lenient corpus still lists every document.
#[derive(Debug, Clone)]
pub struct FieldFilter {
    source: String,
    compiled: std::result::Result<Expr, CompileError>,
}

impl FieldFilter {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let compiled = Expr::compile(&source);
        Self { source, compiled }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn compile_error(&self) -> Option<&CompileError> {
        self.compiled.as_ref().err()
    }

    pub fn check(&self, doc: &DocumentContext) -> Result<bool> {
        let strict = doc.vault().strict_fields();
        let expr = match &self.compiled {
            Ok(expr) => expr,
            Err(err) if strict => return Err(Error::Compile(err.clone())),
            Err(err) => {
                doc.vault().notify(
                    Severity::Warning,
                    format!("could not parse filter `{}`", self.source),
                    err.to_string(),
                );
                return Ok(true);
            }
        };

        match expr.check(doc) {
            Ok(passed) => Ok(passed),
            Err(err) if strict => Err(err),
            Err(err) => {
                doc.vault().notify(
                    Severity::Warning,
                    format!(
                        "could not apply filter `{}` to {}",
                        self.source,
                        doc.display_path()
                    ),
                    err.to_string(),
                );
                Ok(true)
            }
        }
    }
}
