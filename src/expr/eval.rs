//! Expression evaluation against an explicit scope.
//!
//! Evaluation never fails: unresolved identifiers, bad indexes and
//! non-numeric arithmetic all collapse to `Null`. The loose coercions
//! mirror the attribute language: `+` concatenates when either side is a
//! string, comparisons go numeric when both sides coerce, `&&`/`||` are
//! value-preserving.

use serde_json::{Map, Value};

use super::parser::{BinaryOp, Expr, FilterCall, LogicOp, PathExpr, UnaryOp};
use crate::context::{Scope, index_value, resolve_keys};
use crate::value::{from_f64, loose_eq, to_f64, truthy};

pub fn evaluate(expr: &Expr, scope: &Scope<'_>) -> Value {
    match expr {
        Expr::Literal(value) => value.clone(),
        Expr::Ident(name) => scope.get(name),
        Expr::Member(base, key) => {
            let base = evaluate(base, scope);
            let key = evaluate(key, scope);
            index_value(&base, &key)
        }
        Expr::Unary(op, operand) => {
            let value = evaluate(operand, scope);
            match op {
                UnaryOp::Not => Value::Bool(!truthy(&value)),
                UnaryOp::Neg => match to_f64(&value) {
                    Some(f) => from_f64(-f),
                    None => Value::Null,
                },
            }
        }
        Expr::Binary(op, left, right) => {
            let left = evaluate(left, scope);
            let right = evaluate(right, scope);
            binary(*op, &left, &right)
        }
        Expr::Logic(op, left, right) => {
            let left = evaluate(left, scope);
            match op {
                LogicOp::And => {
                    if truthy(&left) {
                        evaluate(right, scope)
                    } else {
                        left
                    }
                }
                LogicOp::Or => {
                    if truthy(&left) {
                        left
                    } else {
                        evaluate(right, scope)
                    }
                }
            }
        }
        Expr::Ternary(cond, then, otherwise) => {
            if truthy(&evaluate(cond, scope)) {
                evaluate(then, scope)
            } else {
                evaluate(otherwise, scope)
            }
        }
        Expr::Assign(path, value) => {
            let value = evaluate(value, scope);
            let keys = resolve_keys(scope, path);
            scope.assign(&path.root, &keys, value.clone());
            value
        }
        Expr::IncDec {
            path,
            increment,
            prefix,
        } => inc_dec(path, *increment, *prefix, scope),
        Expr::Object(entries) => {
            let mut map = Map::new();
            for (key, value_expr) in entries {
                map.insert(key.clone(), evaluate(value_expr, scope));
            }
            Value::Object(map)
        }
        Expr::Array(items) => Value::Array(items.iter().map(|i| evaluate(i, scope)).collect()),
        Expr::Pipe(input, filters) => {
            let mut value = evaluate(input, scope);
            for FilterCall { name, args } in filters {
                let args: Vec<Value> = args.iter().map(|a| evaluate(a, scope)).collect();
                value = scope.engine.apply_filter(name, value, &args);
            }
            value
        }
    }
}

fn inc_dec(path: &PathExpr, increment: bool, prefix: bool, scope: &Scope<'_>) -> Value {
    let keys = resolve_keys(scope, path);
    let mut current = scope.get(&path.root);
    for key in &keys {
        current = index_value(&current, key);
    }
    let old = to_f64(&current).unwrap_or(0.0);
    let new = if increment { old + 1.0 } else { old - 1.0 };
    scope.assign(&path.root, &keys, from_f64(new));
    if prefix { from_f64(new) } else { from_f64(old) }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Add => {
            if left.is_string() || right.is_string() {
                return Value::String(format!(
                    "{}{}",
                    crate::value::display(left),
                    crate::value::display(right)
                ));
            }
            numeric(left, right, |a, b| a + b)
        }
        BinaryOp::Sub => numeric(left, right, |a, b| a - b),
        BinaryOp::Mul => numeric(left, right, |a, b| a * b),
        BinaryOp::Div => numeric(left, right, |a, b| a / b),
        BinaryOp::Rem => numeric(left, right, |a, b| a % b),
        BinaryOp::Eq => Value::Bool(loose_eq(left, right)),
        BinaryOp::Ne => Value::Bool(!loose_eq(left, right)),
        BinaryOp::Lt => compare(left, right, |o| o.is_lt()),
        BinaryOp::Gt => compare(left, right, |o| o.is_gt()),
        BinaryOp::Le => compare(left, right, |o| o.is_le()),
        BinaryOp::Ge => compare(left, right, |o| o.is_ge()),
    }
}

fn numeric(left: &Value, right: &Value, op: impl Fn(f64, f64) -> f64) -> Value {
    match (to_f64(left), to_f64(right)) {
        (Some(a), Some(b)) => from_f64(op(a, b)),
        _ => Value::Null,
    }
}

fn compare(left: &Value, right: &Value, check: impl Fn(std::cmp::Ordering) -> bool) -> Value {
    let ordering = match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => match (to_f64(left), to_f64(right)) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    };
    match ordering {
        Some(ordering) => Value::Bool(check(ordering)),
        None => Value::Bool(false),
    }
}
