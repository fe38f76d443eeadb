//! Hit-time condition evaluation.
//!
//! The language is deliberately tiny: literals, the six comparison
//! operators, `&&` / `||`, and variable references into the hit scope.
//! There is no precedence beyond the AND/OR split and no parentheses;
//! operators are found by first textual occurrence. Nothing in here can
//! call into the host process, and nothing escapes as an error: a broken
//! expression simply evaluates to false.

pub mod scope;
pub use scope::Scope;

use thiserror::Error;

use crate::value::Value;

#[derive(Error, Debug)]
pub enum EvalError {
    #[error("unresolved identifier: {0}")]
    Unresolved(String),
    #[error("malformed expression: {0}")]
    Malformed(String),
}

// checked in this order so two-char operators win over their prefixes
const OPERATORS: [&str; 6] = ["==", "!=", "<=", ">=", "<", ">"];

/// Public contract: never fails outward.
pub fn evaluate(expression: &str, scope: &Scope) -> bool {
    match try_eval(expression, scope) {
        Ok(result) => result,
        Err(err) => {
            tracing::debug!(expression, %err, "condition evaluated to false");
            false
        }
    }
}

/// Fallible form used by the orchestrator to report condition errors.
/// An empty expression means "no condition" and is always true; inside a
/// larger expression an empty operand is malformed.
pub fn try_eval(expression: &str, scope: &Scope) -> Result<bool, EvalError> {
    if expression.trim().is_empty() {
        return Ok(true);
    }
    eval_expr(expression, scope)
}

fn eval_expr(expression: &str, scope: &Scope) -> Result<bool, EvalError> {
    let expr = expression.trim();
    if expr == "true" {
        return Ok(true);
    }
    if expr == "false" {
        return Ok(false);
    }

    if expr.contains("&&") {
        for part in expr.split("&&") {
            if !eval_expr(part, scope)? {
                return Ok(false);
            }
        }
        return Ok(true);
    }

    if expr.contains("||") {
        for part in expr.split("||") {
            if eval_expr(part, scope)? {
                return Ok(true);
            }
        }
        return Ok(false);
    }

    eval_comparison(expr, scope)
}

fn eval_comparison(expr: &str, scope: &Scope) -> Result<bool, EvalError> {
    for op in OPERATORS {
        if let Some(at) = expr.find(op) {
            let left = eval_value(&expr[..at], scope)?;
            let right = eval_value(&expr[at + op.len()..], scope)?;
            return Ok(compare(&left, &right, op));
        }
    }

    // bare value: booleans by value, null is false, anything else is true
    let value = eval_value(expr, scope)?;
    Ok(match value {
        Value::Bool(b) => b,
        Value::Null => false,
        _ => true,
    })
}

fn eval_value(expr: &str, scope: &Scope) -> Result<Value, EvalError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(EvalError::Malformed("empty operand".to_owned()));
    }

    match expr {
        "true" => return Ok(Value::Bool(true)),
        "false" => return Ok(Value::Bool(false)),
        "null" => return Ok(Value::Null),
        _ => {}
    }

    if expr.len() >= 2 {
        let quoted = (expr.starts_with('"') && expr.ends_with('"'))
            || (expr.starts_with('\'') && expr.ends_with('\''));
        if quoted {
            return Ok(Value::Str(expr[1..expr.len() - 1].to_owned()));
        }
    }

    if looks_numeric(expr) {
        if expr.contains('.') {
            if let Ok(f) = expr.parse::<f64>() {
                return Ok(Value::Float(f));
            }
        } else if let Ok(i) = expr.parse::<i64>() {
            return Ok(Value::Int(i));
        }
        return Err(EvalError::Malformed(format!("bad numeric literal: {expr}")));
    }

    scope.resolve(expr)
}

fn looks_numeric(expr: &str) -> bool {
    let rest = expr.strip_prefix('-').unwrap_or(expr);
    !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit() || b == b'.')
}

fn compare(left: &Value, right: &Value, op: &str) -> bool {
    if left.is_null() || right.is_null() {
        return match op {
            "==" => left.is_null() && right.is_null(),
            "!=" => left.is_null() != right.is_null(),
            _ => false,
        };
    }

    if let (Some(l), Some(r)) = (left.as_number(), right.as_number()) {
        return match op {
            "==" => l == r,
            "!=" => l != r,
            "<" => l < r,
            ">" => l > r,
            "<=" => l <= r,
            ">=" => l >= r,
            _ => false,
        };
    }

    // non-numeric operands only support (in)equality, as strings
    match op {
        "==" => left.coerce_string() == right.coerce_string(),
        "!=" => left.coerce_string() != right.coerce_string(),
        _ => false,
    }
}
