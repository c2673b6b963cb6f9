//! JavaScript-like semantics over `serde_json::Value`.

use serde_json::{Number, Value};

use crate::error::EvalError;

/// Largest integer an f64 represents exactly (2^53).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Wrap an f64, keeping integral values as integers so they print without a fraction.
pub fn number(n: f64) -> Result<Value, EvalError> {
    if !n.is_finite() {
        return Err(EvalError::NonFinite);
    }
    if n.fract() == 0.0 && n.abs() < MAX_SAFE_INTEGER {
        return Ok(Value::from(n as i64));
    }
    Number::from_f64(n)
        .map(Value::Number)
        .ok_or(EvalError::NonFinite)
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Numeric coercion (`Number(v)`); `None` stands for NaN.
pub fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Null => Some(0.0),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                Some(0.0)
            } else {
                s.parse::<f64>().ok()
            }
        }
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// String conversion (`String(v)`).
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => display_number(n),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => display(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

fn display_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < MAX_SAFE_INTEGER => (f as i64).to_string(),
        Some(f) => f.to_string(),
        None => "NaN".to_string(),
    }
}

/// `===`: numbers compare numerically, everything else structurally.
pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// `==`: like `===`, plus null/number/string/bool coercion between primitives.
pub fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Number(_) | Value::String(_) | Value::Bool(_), Value::Number(_) | Value::Bool(_))
        | (Value::Number(_) | Value::Bool(_), Value::String(_)) => {
            match (to_number(a), to_number(b)) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            }
        }
        _ => strict_equals(a, b),
    }
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integral_numbers_print_without_fraction() {
        assert_eq!(display(&number(10.0).unwrap()), "10");
        assert_eq!(display(&number(2.5).unwrap()), "2.5");
        assert_eq!(display(&json!(3.0)), "3");
        assert_eq!(number(f64::INFINITY), Err(EvalError::NonFinite));
    }

    #[test]
    fn display_follows_string_conversion() {
        assert_eq!(display(&json!([1, null, "a"])), "1,,a");
        assert_eq!(display(&json!({"a": 1})), "[object Object]");
        assert_eq!(display(&json!(null)), "null");
        assert_eq!(display(&json!(true)), "true");
    }

    #[test]
    fn truthiness() {
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(!truthy(&json!(null)));
        assert!(truthy(&json!([])));
        assert!(truthy(&json!("0")));
    }

    #[test]
    fn equality() {
        assert!(strict_equals(&json!(1), &json!(1.0)));
        assert!(!strict_equals(&json!(1), &json!("1")));
        assert!(loose_equals(&json!(1), &json!("1")));
        assert!(loose_equals(&json!(true), &json!(1)));
        assert!(!loose_equals(&json!(null), &json!(0)));
    }
}
