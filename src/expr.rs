//! The expression language used by filters and formulas.
//!
//! An expression string is compiled once into an [`Expr`] tree and then
//! evaluated against many documents through the [`Scope`] trait:
//!
//! ```text
//! file.ext == "md" and !file.tags.contains("draft")
//! (price * 2) + 1
//! file.hasTag("project")
//! ```
//!
//! Compilation only checks syntax. Method names and argument counts are
//! checked when the expression runs, so a typo in a method name surfaces
//! as an evaluation error for each document.

mod eval;
mod lexer;
mod parser;

use crate::{
    error::{CompileError, Result},
    value::Value,
};

pub use parser::ExprParser;

/// What an expression can ask of the document it runs against.
pub trait Scope {
    /// Value at a dotted property path, e.g. `["file", "name"]`.
    fn property(&self, path: &[String]) -> Result<Value>;

    /// Every tag attached to the document, without leading `#`.
    fn tags(&self) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::In => "in",
            CompareOp::NotIn => "not in",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// A compiled expression (AST node).
#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Value),
    Attr(Vec<String>),
    Method {
        receiver: Vec<String>,
        name: String,
        args: Vec<Expr>,
    },
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Arith {
        op: ArithOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Neg(Box<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Compile expression text.
    pub fn compile(source: &str) -> std::result::Result<Self, CompileError> {
        ExprParser::parse(source)
    }

    /// A constant expression.
    pub fn constant(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn evaluate(&self, scope: &dyn Scope) -> Result<Value> {
        eval::evaluate(self, scope)
    }

    /// Evaluate and reduce the result to a boolean.
    pub fn check(&self, scope: &dyn Scope) -> Result<bool> {
        Ok(self.evaluate(scope)?.is_truthy())
    }
}
