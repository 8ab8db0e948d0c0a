//! AST evaluation over bound values.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::cmp::Ordering;
use std::str::FromStr;

use super::parser::{BinaryOp, Function, Node, UnaryOp};
use super::{Bindings, Value};
use crate::error::{EvalError, EvalResult};

/// Evaluate `node` against `bindings`.
pub fn eval<B: Bindings + ?Sized>(node: &Node, bindings: &B) -> EvalResult<Value> {
    match node {
        Node::Literal(value) => Ok(value.clone()),
        Node::Field(name) => bindings.resolve(name),
        Node::Unary { op, operand } => {
            let value = eval(operand, bindings)?;
            match op {
                UnaryOp::Neg => Ok(Value::Number(-number(&value, "-")?)),
                UnaryOp::Not => Ok(Value::Bool(!truthy(&value)?)),
            }
        }
        Node::Binary { op: BinaryOp::And, left, right } => {
            if !truthy(&eval(left, bindings)?)? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(truthy(&eval(right, bindings)?)?))
        }
        Node::Binary { op: BinaryOp::Or, left, right } => {
            if truthy(&eval(left, bindings)?)? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(truthy(&eval(right, bindings)?)?))
        }
        Node::Binary { op, left, right } => {
            let left = eval(left, bindings)?;
            let right = eval(right, bindings)?;
            binary(*op, &left, &right)
        }
        Node::Membership { negated, needle, list } => {
            let needle = eval(needle, bindings)?;
            let mut found = false;
            for item in list {
                if loose_eq(&needle, &eval(item, bindings)?) {
                    found = true;
                    break;
                }
            }
            Ok(Value::Bool(found != *negated))
        }
        Node::Call { function, args } => {
            let values = args
                .iter()
                .map(|arg| eval(arg, bindings))
                .collect::<EvalResult<Vec<_>>>()?;
            call(*function, &values)
        }
    }
}

/// Truthiness of a condition operand: booleans only, empty counts as false.
pub fn truthy(value: &Value) -> EvalResult<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        other => Err(EvalError::TypeMismatch(format!(
            "expected a boolean, found {} '{}'",
            other.type_name(),
            other
        ))),
    }
}

/// Numeric view of a value. Empty is zero, numeric text is read as a number.
fn as_number(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Some(*n),
        Value::Null => Some(Decimal::ZERO),
        Value::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Some(Decimal::ZERO)
            } else {
                Decimal::from_str(trimmed).ok()
            }
        }
        Value::Bool(_) => None,
    }
}

fn number(value: &Value, op: &str) -> EvalResult<Decimal> {
    as_number(value).ok_or_else(|| {
        EvalError::TypeMismatch(format!(
            "'{}' needs a number, found {} '{}'",
            op,
            value.type_name(),
            value
        ))
    })
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> EvalResult<Value> {
    match op {
        BinaryOp::Add => {
            if let (Value::Text(a), Value::Text(b)) = (left, right) {
                if as_number(left).is_none() || as_number(right).is_none() {
                    return Ok(Value::Text(format!("{}{}", a, b)));
                }
            }
            let (a, b) = (number(left, "+")?, number(right, "+")?);
            a.checked_add(b).map(Value::Number).ok_or(EvalError::Overflow)
        }
        BinaryOp::Sub => {
            let (a, b) = (number(left, "-")?, number(right, "-")?);
            a.checked_sub(b).map(Value::Number).ok_or(EvalError::Overflow)
        }
        BinaryOp::Mul => {
            let (a, b) = (number(left, "*")?, number(right, "*")?);
            a.checked_mul(b).map(Value::Number).ok_or(EvalError::Overflow)
        }
        BinaryOp::Div => {
            let (a, b) = (number(left, "/")?, number(right, "/")?);
            if b.is_zero() {
                return Err(EvalError::DivisionByZero);
            }
            a.checked_div(b).map(Value::Number).ok_or(EvalError::Overflow)
        }
        BinaryOp::Eq => Ok(Value::Bool(loose_eq(left, right))),
        BinaryOp::Ne => Ok(Value::Bool(!loose_eq(left, right))),
        BinaryOp::Lt => compare(left, right).map(|o| Value::Bool(o == Ordering::Less)),
        BinaryOp::Le => compare(left, right).map(|o| Value::Bool(o != Ordering::Greater)),
        BinaryOp::Gt => compare(left, right).map(|o| Value::Bool(o == Ordering::Greater)),
        BinaryOp::Ge => compare(left, right).map(|o| Value::Bool(o != Ordering::Less)),
        BinaryOp::And => Ok(Value::Bool(truthy(left)? && truthy(right)?)),
        BinaryOp::Or => Ok(Value::Bool(truthy(left)? || truthy(right)?)),
    }
}

/// Numeric operands if neither side is plain text that fails to parse.
fn numeric_pair(left: &Value, right: &Value) -> Option<(Decimal, Decimal)> {
    let either_number = matches!(left, Value::Number(_)) || matches!(right, Value::Number(_));
    if !either_number {
        return None;
    }
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => None,
        _ => Some((as_number(left)?, as_number(right)?)),
    }
}

/// Equality used by `==`, `!=` and `in`.
///
/// A number equals numeric text of the same value. Otherwise values are
/// compared by their text form, so empty equals `''`.
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    if let Some((a, b)) = numeric_pair(left, right) {
        return a == b;
    }
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Bool(_), _) | (_, Value::Bool(_)) => false,
        _ => left.to_string() == right.to_string(),
    }
}

fn compare(left: &Value, right: &Value) -> EvalResult<Ordering> {
    if let Some((a, b)) = numeric_pair(left, right) {
        return Ok(a.cmp(&b));
    }
    match (left, right) {
        (Value::Number(_), _) | (_, Value::Number(_)) | (Value::Bool(_), _) | (_, Value::Bool(_)) => {
            Err(EvalError::TypeMismatch(format!(
                "cannot order {} '{}' against {} '{}'",
                left.type_name(),
                left,
                right.type_name(),
                right
            )))
        }
        _ => Ok(left.to_string().cmp(&right.to_string())),
    }
}

fn call(function: Function, args: &[Value]) -> EvalResult<Value> {
    let name = function.name();
    let (first, rest) = args
        .split_first()
        .ok_or_else(|| EvalError::Syntax(format!("{}() needs an argument", name)))?;

    match function {
        Function::Abs => Ok(Value::Number(number(first, name)?.abs())),
        Function::Round => {
            let value = number(first, name)?;
            let places = match rest.first() {
                None => 0,
                Some(arg) => {
                    let places = number(arg, name)?;
                    if !places.fract().is_zero() || places.is_sign_negative() || places > Decimal::from(28) {
                        return Err(EvalError::TypeMismatch(format!(
                            "round() places must be a whole number between 0 and 28, found {}",
                            places
                        )));
                    }
                    places.to_u32().ok_or(EvalError::Overflow)?
                }
            };
            Ok(Value::Number(value.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero)))
        }
        Function::Min | Function::Max => {
            let mut best = number(first, name)?;
            for arg in rest {
                let candidate = number(arg, name)?;
                let better = match function {
                    Function::Min => candidate < best,
                    _ => candidate > best,
                };
                if better {
                    best = candidate;
                }
            }
            Ok(Value::Number(best))
        }
    }
}
