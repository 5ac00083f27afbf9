use std::cmp::Ordering;

use crate::{
    error::{Error, Result},
    value::Value,
};

use super::{ArithOp, CompareOp, Expr, Scope};

pub(super) fn evaluate(expr: &Expr, scope: &dyn Scope) -> Result<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Attr(path) => scope.property(path),
        Expr::Method {
            receiver,
            name,
            args,
        } => call_method(scope, receiver, name, args),
        Expr::Compare { op, left, right } => {
            let left = evaluate(left, scope)?;
            let right = evaluate(right, scope)?;
            compare(*op, &left, &right).map(Value::Bool)
        }
        Expr::Arith { op, left, right } => {
            let left = evaluate(left, scope)?;
            let right = evaluate(right, scope)?;
            match op {
                ArithOp::Add => left.add(&right),
                ArithOp::Sub => left.sub(&right),
                ArithOp::Mul => left.mul(&right),
                ArithOp::Div => left.div(&right),
            }
        }
        Expr::Neg(inner) => evaluate(inner, scope)?.neg(),
        Expr::Not(inner) => {
            Ok(Value::Bool(!evaluate(inner, scope)?.is_truthy()))
        }
        Expr::And(left, right) => {
            let left = evaluate(left, scope)?;
            if !left.is_truthy() {
                return Ok(left);
            }
            evaluate(right, scope)
        }
        Expr::Or(left, right) => {
            let left = evaluate(left, scope)?;
            if left.is_truthy() {
                return Ok(left);
            }
            evaluate(right, scope)
        }
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool> {
    Ok(match op {
        CompareOp::Eq => left == right,
        CompareOp::Ne => left != right,
        CompareOp::Lt => left.compare(right)? == Ordering::Less,
        CompareOp::Le => left.compare(right)? != Ordering::Greater,
        CompareOp::Gt => left.compare(right)? == Ordering::Greater,
        CompareOp::Ge => left.compare(right)? != Ordering::Less,
        CompareOp::In => right.contains(left)?,
        CompareOp::NotIn => !right.contains(left)?,
    })
}

fn call_method(
    scope: &dyn Scope,
    receiver: &[String],
    name: &str,
    args: &[Expr],
) -> Result<Value> {
    let target = scope.property(receiver)?;
    let args = args
        .iter()
        .map(|arg| evaluate(arg, scope))
        .collect::<Result<Vec<_>>>()?;

    let result = match name {
        "contains" => {
            let [needle] = exact::<1>(name, &args)?;
            target.contains(needle)?
        }
        "containsAny" => {
            let mut any = false;
            for needle in &args {
                if target.contains(needle)? {
                    any = true;
                    break;
                }
            }
            any
        }
        "isEmpty" => {
            exact::<0>(name, &args)?;
            target.len()? == 0
        }
        "startsWith" => {
            let [prefix] = exact::<1>(name, &args)?;
            target.to_string().starts_with(&prefix.to_string())
        }
        "hasTag" => {
            let [tag] = exact::<1>(name, &args)?;
            has_tag(scope, &target, tag)?
        }
        other => {
            return Err(Error::Eval(format!("unknown method `{other}`")));
        }
    };
    Ok(Value::Bool(result))
}

fn has_tag(scope: &dyn Scope, target: &Value, tag: &Value) -> Result<bool> {
    if !matches!(target, Value::Document(_)) {
        return Err(Error::Eval(format!(
            "hasTag needs a file, not {}",
            target.type_name()
        )));
    }
    let Some(tag) = tag.as_str() else {
        return Err(Error::Eval(format!(
            "hasTag needs a string argument, not {}",
            tag.type_name()
        )));
    };
    let tag = tag.trim_start_matches('#');
    Ok(scope.tags()?.iter().any(|t| t == tag))
}

fn exact<'a, const N: usize>(
    method: &str,
    args: &'a [Value],
) -> Result<&'a [Value; N]> {
    args.try_into().map_err(|_| {
        Error::Eval(format!(
            "{method} takes {N} argument(s), {} given",
            args.len()
        ))
    })
}
