use std::collections::BTreeMap;
use std::fmt;

use super::error::RuntimeError;

/// Index of a live object in the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub usize);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Array cells keyed by the textual form of their key, so `$a[0]` and
/// `$a['0']` address the same cell.
pub type ArrayValue = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    /// String constant. Also the result kind of comparisons and of the
    /// `-`, `*`, `/` and negation operators.
    Const(String),
    Array(ArrayValue),
    /// Shared handle; the object itself lives in the heap.
    Object(ObjectId),
}

/// Kind of a value, used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Const,
    Array,
    Object,
    Int,
    Float,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueKind::Const => "Const",
            ValueKind::Array => "Array",
            ValueKind::Object => "Object",
            ValueKind::Int => "Int",
            ValueKind::Float => "Float",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", format_number(*n)),
            Value::Const(s) => write!(f, "{}", s),
            Value::Array(_) => write!(f, "Array"),
            Value::Object(_) => write!(f, "Object"),
        }
    }
}

impl Value {
    /// The "no value" result: statements, missing array cells, functions
    /// that finish without `return`.
    pub fn empty() -> Self {
        Value::Const(String::new())
    }

    pub fn str(s: &str) -> Self {
        Value::Const(s.to_string())
    }

    pub fn bool(b: bool) -> Self {
        Value::Const(if b { "1" } else { "0" }.to_string())
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Const(_) => ValueKind::Const,
            Value::Array(_) => ValueKind::Array,
            Value::Object(_) => ValueKind::Object,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Int(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::Const(s) => !s.is_empty() && s != "0",
            Value::Array(cells) => !cells.is_empty(),
            Value::Object(_) => true,
        }
    }

    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Value::Object(id) => Some(*id),
            _ => None,
        }
    }

    /// Numeric view used by ordering comparisons and `+`: integers and
    /// constants read their integer prefix, floats stay floats.
    pub fn to_declared_number(&self, op: &str) -> Result<Number, RuntimeError> {
        match self {
            Value::Int(n) => Ok(Number::Int(*n)),
            Value::Const(s) => Ok(Number::Int(integer_prefix(s))),
            Value::Float(n) => Ok(Number::Float(*n)),
            Value::Array(_) | Value::Object(_) => Err(RuntimeError::UnsupportedOperand {
                op: op.to_string(),
                found: self.kind(),
            }),
        }
    }

    /// Loose numeric view used by `-`, `*`, `/` and negation.
    pub fn to_number(&self, op: &str) -> Result<f64, RuntimeError> {
        match self {
            Value::Int(n) => Ok(*n as f64),
            Value::Float(n) => Ok(*n),
            Value::Const(s) => Ok(number_prefix(s)),
            Value::Array(_) | Value::Object(_) => Err(RuntimeError::UnsupportedOperand {
                op: op.to_string(),
                found: self.kind(),
            }),
        }
    }

    /// Equality as used by `==`/`!=`: same representation, no numeric
    /// coercion. Arrays compare cell by cell, objects by handle.
    pub fn same_representation(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|((ka, va), (kb, vb))| ka == kb && va.same_representation(vb))
            }
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Array(_), _) | (_, Value::Array(_)) => false,
            (Value::Object(_), _) | (_, Value::Object(_)) => false,
            _ => self.to_string() == other.to_string(),
        }
    }

    /// Text of a scalar used as an array key.
    pub fn to_key(&self) -> Result<String, RuntimeError> {
        match self {
            Value::Int(_) | Value::Float(_) | Value::Const(_) => Ok(self.to_string()),
            _ => Err(RuntimeError::InvalidArrayKey { found: self.kind() }),
        }
    }

    /// Every object handle reachable from this value, arrays included.
    pub fn handles(&self) -> Vec<ObjectId> {
        let mut out = Vec::new();
        self.collect_handles(&mut out);
        out
    }

    fn collect_handles(&self, out: &mut Vec<ObjectId>) {
        match self {
            Value::Object(id) => out.push(*id),
            Value::Array(cells) => {
                for cell in cells.values() {
                    cell.collect_handles(out);
                }
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(n) => n,
        }
    }
}

/// Renders a number the way echo shows it: integral values without a
/// fractional part.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NAN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "INF" } else { "-INF" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Leading optionally-signed run of digits; 0 when there is none.
pub fn integer_prefix(s: &str) -> i64 {
    let trimmed = s.trim_start();
    let bytes = trimmed.as_bytes();
    let mut end = 0;
    if end < bytes.len() && (bytes[end] == b'-' || bytes[end] == b'+') {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == digits_start {
        return 0;
    }
    trimmed[..end].parse().unwrap_or(0)
}

/// Longest leading numeric literal (sign, digits, fraction, exponent); 0 when
/// there is none.
pub fn number_prefix(s: &str) -> f64 {
    let trimmed = s.trim();
    if let Ok(n) = trimmed.parse::<f64>() {
        if !trimmed.eq_ignore_ascii_case("nan") && !trimmed.to_ascii_lowercase().contains("inf") {
            return n;
        }
    }
    let bytes = trimmed.as_bytes();
    let mut end = 0;
    if end < bytes.len() && (bytes[end] == b'-' || bytes[end] == b'+') {
        end += 1;
    }
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    // Walk back over a dangling sign or dot.
    while end > 0 && trimmed[..end].parse::<f64>().is_err() {
        end -= 1;
    }
    if end == 0 {
        return 0.0;
    }
    trimmed[..end].parse().unwrap_or(0.0)
}
