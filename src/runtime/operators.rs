use std::cmp::Ordering;

use crate::ast::{ArithmeticOp, CompareOp};

use super::error::RuntimeError;
use super::value::{format_number, Number, Value};

/// Comparisons yield the constants `"1"` and `"0"`.
pub fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    let result = match op {
        CompareOp::Equal => left.same_representation(right),
        CompareOp::NotEqual => !left.same_representation(right),
        _ => {
            let symbol = op.to_string();
            let a = left.to_declared_number(&symbol)?;
            let b = right.to_declared_number(&symbol)?;
            let ordering = match (a, b) {
                (Number::Int(x), Number::Int(y)) => Some(x.cmp(&y)),
                _ => a.as_f64().partial_cmp(&b.as_f64()),
            };
            match (op, ordering) {
                (_, None) => false,
                (CompareOp::Greater, Some(o)) => o == Ordering::Greater,
                (CompareOp::Less, Some(o)) => o == Ordering::Less,
                (CompareOp::GreaterEqual, Some(o)) => o != Ordering::Less,
                (CompareOp::LessEqual, Some(o)) => o != Ordering::Greater,
                (_, Some(_)) => false,
            }
        }
    };
    Ok(Value::bool(result))
}

/// `+` keeps integers integral; `-`, `*` and `/` produce constants.
pub fn arithmetic(op: ArithmeticOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    let symbol = op.to_string();
    if op == ArithmeticOp::Add {
        let a = left.to_declared_number(&symbol)?;
        let b = right.to_declared_number(&symbol)?;
        return Ok(match (a, b) {
            (Number::Int(x), Number::Int(y)) => match x.checked_add(y) {
                Some(sum) => Value::Int(sum),
                None => Value::Float(x as f64 + y as f64),
            },
            _ => Value::Float(a.as_f64() + b.as_f64()),
        });
    }

    let a = left.to_number(&symbol)?;
    let b = right.to_number(&symbol)?;
    let result = match op {
        ArithmeticOp::Subtract => a - b,
        ArithmeticOp::Multiply => a * b,
        // Division by zero follows IEEE: INF, -INF or NAN.
        ArithmeticOp::Divide => a / b,
        ArithmeticOp::Add => a + b,
    };
    Ok(Value::Const(format_number(result)))
}

pub fn negate(operand: &Value) -> Result<Value, RuntimeError> {
    let n = operand.to_number("-")?;
    Ok(Value::Const(format_number(-n)))
}

pub fn concat(left: &Value, right: &Value) -> Value {
    Value::Const(format!("{}{}", left, right))
}
