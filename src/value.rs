//! Dynamic values produced by expressions and document properties.
//!
//! Operators follow the loose rules users expect from front-matter data:
//! numbers compare across int/float, `in` works on strings, lists and maps,
//! and `and`/`or` yield the operand that decided the result.

use std::{cmp::Ordering, collections::BTreeMap, fmt};

use serde::{Serialize, Serializer};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Handle to the document under evaluation, by corpus-relative path.
    Document(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Document(_) => "file",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::Document(_) => true,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Scalars that are stored as-is in a view cell.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Value::Null
                | Value::Bool(_)
                | Value::Int(_)
                | Value::Float(_)
                | Value::Str(_)
        )
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(f64::from(u8::from(*b))),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn len(&self) -> Result<usize> {
        match self {
            Value::Str(s) => Ok(s.chars().count()),
            Value::List(items) => Ok(items.len()),
            Value::Map(map) => Ok(map.len()),
            other => Err(Error::Eval(format!(
                "object of type '{}' has no length",
                other.type_name()
            ))),
        }
    }

    /// `needle in self`.
    pub fn contains(&self, needle: &Value) -> Result<bool> {
        match self {
            Value::Str(haystack) => match needle {
                Value::Str(n) => Ok(haystack.contains(n.as_str())),
                other => Err(Error::Eval(format!(
                    "'in <str>' requires str as left operand, not {}",
                    other.type_name()
                ))),
            },
            Value::List(items) => Ok(items.iter().any(|item| item == needle)),
            Value::Map(map) => match needle {
                Value::Str(key) => Ok(map.contains_key(key)),
                _ => Ok(false),
            },
            other => Err(Error::Eval(format!(
                "argument of type '{}' does not support membership tests",
                other.type_name()
            ))),
        }
    }

    pub fn compare(&self, other: &Value) -> Result<Ordering> {
        if let (Some(a), Some(b)) = (self.numeric(), other.numeric()) {
            return a.partial_cmp(&b).ok_or_else(|| {
                Error::Eval("cannot order NaN values".to_string())
            });
        }
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b) {
                    match x.compare(y)? {
                        Ordering::Equal => continue,
                        decided => return Ok(decided),
                    }
                }
                Ok(a.len().cmp(&b.len()))
            }
            _ => Err(Error::Eval(format!(
                "ordering not supported between '{}' and '{}'",
                self.type_name(),
                other.type_name()
            ))),
        }
    }

    pub fn add(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
            (Value::List(a), Value::List(b)) => {
                Ok(Value::List(a.iter().chain(b).cloned().collect()))
            }
            _ => self.arith(other, "+", i64::checked_add, |a, b| a + b),
        }
    }

    pub fn sub(&self, other: &Value) -> Result<Value> {
        self.arith(other, "-", i64::checked_sub, |a, b| a - b)
    }

    pub fn mul(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) => {
                let times = repeat_count(s.len(), *n, "string")?;
                Ok(Value::Str(s.repeat(times)))
            }
            (Value::List(items), Value::Int(n))
            | (Value::Int(n), Value::List(items)) => {
                let times = repeat_count(items.len(), *n, "list")?;
                Ok(Value::List(
                    std::iter::repeat_n(items, times)
                        .flatten()
                        .cloned()
                        .collect(),
                ))
            }
            _ => self.arith(other, "*", i64::checked_mul, |a, b| a * b),
        }
    }

    pub fn div(&self, other: &Value) -> Result<Value> {
        let (Some(a), Some(b)) = (self.numeric(), other.numeric()) else {
            return Err(self.unsupported_operands("/", other));
        };
        if b == 0.0 {
            return Err(Error::Eval("division by zero".to_string()));
        }
        Ok(Value::Float(a / b))
    }

    pub fn neg(&self) -> Result<Value> {
        match self {
            Value::Int(i) => i
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| Error::Eval("integer overflow".to_string())),
            Value::Float(f) => Ok(Value::Float(-f)),
            Value::Bool(b) => Ok(Value::Int(-i64::from(*b))),
            other => Err(Error::Eval(format!(
                "bad operand type for unary -: '{}'",
                other.type_name()
            ))),
        }
    }

    fn arith(
        &self,
        other: &Value,
        op: &str,
        int_op: fn(i64, i64) -> Option<i64>,
        float_op: fn(f64, f64) -> f64,
    ) -> Result<Value> {
        match (self.integer(), other.integer()) {
            (Some(a), Some(b)) => int_op(a, b)
                .map(Value::Int)
                .ok_or_else(|| Error::Eval("integer overflow".to_string())),
            _ => match (self.numeric(), other.numeric()) {
                (Some(a), Some(b)) => Ok(Value::Float(float_op(a, b))),
                _ => Err(self.unsupported_operands(op, other)),
            },
        }
    }

    /// Integers and booleans, which take part in integer arithmetic.
    fn integer(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    fn numeric(&self) -> Option<f64> {
        self.as_f64()
    }

    fn unsupported_operands(&self, op: &str, other: &Value) -> Error {
        Error::Eval(format!(
            "unsupported operand type(s) for {op}: '{}' and '{}'",
            self.type_name(),
            other.type_name()
        ))
    }
}

/// Upper bound on the length of a repeated string or list.
pub const MAX_REPEAT_LEN: usize = 1024 * 1024;

/// Repetition count for `len * n`; negative counts repeat zero times.
fn repeat_count(len: usize, n: i64, what: &str) -> Result<usize> {
    let times = usize::try_from(n).unwrap_or(0);
    match len.checked_mul(times) {
        Some(total) if total <= MAX_REPEAT_LEN => Ok(times),
        _ => Err(Error::Eval(format!("repeated {what} is too long"))),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        if let (Some(a), Some(b)) = (self.numeric(), other.numeric()) {
            return a == b;
        }
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Document(a), Value::Document(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<serde_yaml::Value> for Value {
    fn from(value: serde_yaml::Value) -> Self {
        match value {
            serde_yaml::Value::Null => Value::Null,
            serde_yaml::Value::Bool(b) => Value::Bool(b),
            serde_yaml::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_yaml::Value::String(s) => Value::Str(s),
            serde_yaml::Value::Sequence(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_yaml::Value::Mapping(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| (yaml_key(k), Value::from(v)))
                    .collect(),
            ),
            serde_yaml::Value::Tagged(tagged) => Value::from(tagged.value),
        }
    }
}

/// Mapping keys are stringified the way they would print.
pub(crate) fn yaml_key(key: serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s,
        other => Value::from(other).to_string(),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("None"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => fmt_float(f, *x),
            Value::Str(s) => f.write_str(s),
            Value::Document(path) => f.write_str(path),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    fmt_repr(f, item)?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (key, item)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "'{key}': ")?;
                    fmt_repr(f, item)?;
                }
                f.write_str("}")
            }
        }
    }
}

fn fmt_float(f: &mut fmt::Formatter<'_>, x: f64) -> fmt::Result {
    if x.is_nan() {
        f.write_str("nan")
    } else if x.is_infinite() {
        f.write_str(if x > 0.0 { "inf" } else { "-inf" })
    } else if x.fract() == 0.0 && x.abs() < 1e16 {
        write!(f, "{x:.1}")
    } else {
        write!(f, "{x}")
    }
}

/// Nested strings are quoted, as inside a printed list.
fn fmt_repr(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::Str(s) | Value::Document(s) => write!(f, "'{s}'"),
        other => write!(f, "{other}"),
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(x) if x.is_finite() => serializer.serialize_f64(*x),
            Value::Float(_) => serializer.serialize_unit(),
            Value::Str(s) | Value::Document(s) => serializer.serialize_str(s),
            Value::List(items) => items.serialize(serializer),
            Value::Map(map) => map.serialize(serializer),
        }
    }
}
