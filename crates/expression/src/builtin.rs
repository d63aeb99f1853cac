//! `BuiltinEvaluator`: the default rule-language backend.

use std::cmp::Ordering;

use serde_json::Value;
use tracing::trace;

use crate::parser::{parse, CompareOp, Expr};
use crate::{Context, Evaluator, ExpressionError};

/// Evaluates the small boolean/equality grammar described in [`crate::parser`].
///
/// Expressions are parsed on every call; nothing is cached between
/// evaluations.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinEvaluator;

impl BuiltinEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl Evaluator for BuiltinEvaluator {
    fn evaluate(&self, expression: &str, context: &Context) -> Result<bool, ExpressionError> {
        let expr = parse(expression)?;
        let value = eval(&expr, context)?;
        let matched = truthy(&value);
        trace!(expression, matched, "expression evaluated");
        Ok(matched)
    }
}

fn eval(expr: &Expr, context: &Context) -> Result<Value, ExpressionError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Symbol(name) => context
            .get(name)
            .cloned()
            .ok_or_else(|| ExpressionError::Evaluation(format!("unknown symbol '{name}'"))),
        Expr::Not(inner) => Ok(Value::Bool(!truthy(&eval(inner, context)?))),
        Expr::And(left, right) => {
            if !truthy(&eval(left, context)?) {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(truthy(&eval(right, context)?)))
        }
        Expr::Or(left, right) => {
            if truthy(&eval(left, context)?) {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(truthy(&eval(right, context)?)))
        }
        Expr::Compare(op, left, right) => {
            let left = eval(left, context)?;
            let right = eval(right, context)?;
            compare(*op, &left, &right).map(Value::Bool)
        }
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, ExpressionError> {
    match op {
        CompareOp::Eq => Ok(loosely_equal(left, right)),
        CompareOp::Ne => Ok(!loosely_equal(left, right)),
        CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => {
            let ordering = order(left, right)?;
            Ok(match op {
                CompareOp::Lt => ordering == Ordering::Less,
                CompareOp::Le => ordering != Ordering::Greater,
                CompareOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
    }
}

/// Equality that treats `1` and `1.0` as the same number.
fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn order(left: &Value, right: &Value) -> Result<Ordering, ExpressionError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
            a.partial_cmp(&b).ok_or_else(|| {
                ExpressionError::Evaluation(format!("cannot order {a} and {b}"))
            })
        }
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => Err(ExpressionError::Evaluation(format!(
            "cannot order {left} and {right}"
        ))),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
