use serde_json::{Map, Value};

use super::parser::{BinaryOp, Expr, UnaryOp};
use super::value::{display, loose_equals, number, strict_equals, to_number, truthy, type_name};
use super::Scope;
use crate::error::EvalError;

/// Upper bound on strings built by `repeat`, in bytes.
pub const MAX_STRING_LEN: usize = 1 << 24;

/// Interpret an expression tree against `scope`.
pub fn evaluate(expr: &Expr, scope: &Scope) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Ident(name) => scope
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UndefinedVariable { name: name.clone() }),
        Expr::Array(items) => items
            .iter()
            .map(|item| evaluate(item, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Expr::Object(entries) => {
            let mut map = Map::new();
            for (key, value) in entries {
                map.insert(key.clone(), evaluate(value, scope)?);
            }
            Ok(Value::Object(map))
        }
        Expr::Unary(op, operand) => {
            let v = evaluate(operand, scope)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!truthy(&v))),
                UnaryOp::Neg => numeric(&v, "-").and_then(|n| number(-n)),
                UnaryOp::Plus => numeric(&v, "+").and_then(number),
            }
        }
        Expr::Binary(op, lhs, rhs) => binary(*op, lhs, rhs, scope),
        Expr::Conditional(test, then, otherwise) => {
            if truthy(&evaluate(test, scope)?) {
                evaluate(then, scope)
            } else {
                evaluate(otherwise, scope)
            }
        }
        Expr::Member(object, property) => {
            let object = evaluate(object, scope)?;
            member(&object, property)
        }
        Expr::Index(object, index) => {
            let object = evaluate(object, scope)?;
            let index = evaluate(index, scope)?;
            match (&object, &index) {
                (Value::Array(items), Value::Number(n)) => Ok(n
                    .as_u64()
                    .and_then(|i| items.get(i as usize))
                    .cloned()
                    .unwrap_or(Value::Null)),
                (Value::String(s), Value::Number(n)) => Ok(n
                    .as_u64()
                    .and_then(|i| s.chars().nth(i as usize))
                    .map(|c| Value::String(c.to_string()))
                    .unwrap_or(Value::Null)),
                _ => member(&object, &display(&index)),
            }
        }
        Expr::Call(callee, args) => {
            let Expr::Member(receiver, method) = callee.as_ref() else {
                return Err(EvalError::NotCallable);
            };
            let receiver = evaluate(receiver, scope)?;
            let args = args
                .iter()
                .map(|arg| evaluate(arg, scope))
                .collect::<Result<Vec<_>, _>>()?;
            call_method(&receiver, method, &args)
        }
    }
}

fn binary(op: BinaryOp, lhs: &Expr, rhs: &Expr, scope: &Scope) -> Result<Value, EvalError> {
    // Short-circuiting operators evaluate the right side lazily.
    match op {
        BinaryOp::And => {
            let l = evaluate(lhs, scope)?;
            return if truthy(&l) { evaluate(rhs, scope) } else { Ok(l) };
        }
        BinaryOp::Or => {
            let l = evaluate(lhs, scope)?;
            return if truthy(&l) { Ok(l) } else { evaluate(rhs, scope) };
        }
        BinaryOp::Coalesce => {
            let l = evaluate(lhs, scope)?;
            return if l.is_null() { evaluate(rhs, scope) } else { Ok(l) };
        }
        _ => {}
    }

    let l = evaluate(lhs, scope)?;
    let r = evaluate(rhs, scope)?;
    strict_binary(op, &l, &r)
}

/// Apply `op` to two already-evaluated operands.
fn strict_binary(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, EvalError> {
    let arithmetic = |f: fn(f64, f64) -> f64, symbol: &str| -> Result<Value, EvalError> {
        number(f(numeric(l, symbol)?, numeric(r, symbol)?))
    };
    match op {
        BinaryOp::StrictEq => Ok(Value::Bool(strict_equals(l, r))),
        BinaryOp::StrictNe => Ok(Value::Bool(!strict_equals(l, r))),
        BinaryOp::Eq => Ok(Value::Bool(loose_equals(l, r))),
        BinaryOp::Ne => Ok(Value::Bool(!loose_equals(l, r))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            Ok(Value::Bool(compare(op, l, r)))
        }
        BinaryOp::Add if is_stringish(l) || is_stringish(r) => {
            Ok(Value::String(display(l) + &display(r)))
        }
        BinaryOp::Add => arithmetic(|a, b| a + b, "+"),
        BinaryOp::Sub => arithmetic(|a, b| a - b, "-"),
        BinaryOp::Mul => arithmetic(|a, b| a * b, "*"),
        BinaryOp::Div => arithmetic(|a, b| a / b, "/"),
        BinaryOp::Rem => arithmetic(|a, b| a % b, "%"),
        BinaryOp::And => Ok(if truthy(l) { r.clone() } else { l.clone() }),
        BinaryOp::Or => Ok(if truthy(l) { l.clone() } else { r.clone() }),
        BinaryOp::Coalesce => Ok(if l.is_null() { r.clone() } else { l.clone() }),
    }
}

fn is_stringish(v: &Value) -> bool {
    matches!(v, Value::String(_) | Value::Array(_) | Value::Object(_))
}

fn numeric(v: &Value, op: &str) -> Result<f64, EvalError> {
    to_number(v).ok_or_else(|| {
        EvalError::TypeError(format!(
            "operator '{}' cannot be applied to {}",
            op,
            type_name(v)
        ))
    })
}

fn compare(op: BinaryOp, l: &Value, r: &Value) -> bool {
    let ordering = match (l, r) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => match (to_number(l), to_number(r)) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    };
    let Some(ordering) = ordering else {
        return false;
    };
    match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        BinaryOp::Ge => ordering.is_ge(),
        _ => false,
    }
}

fn member(object: &Value, property: &str) -> Result<Value, EvalError> {
    match object {
        Value::Null => Err(EvalError::PropertyOfNothing {
            property: property.to_string(),
            receiver: "null".to_string(),
        }),
        Value::Object(map) => Ok(map.get(property).cloned().unwrap_or(Value::Null)),
        Value::Array(items) if property == "length" => number(items.len() as f64),
        Value::String(s) if property == "length" => number(s.chars().count() as f64),
        _ => Ok(Value::Null),
    }
}

fn call_method(receiver: &Value, method: &str, args: &[Value]) -> Result<Value, EvalError> {
    let arg_str = |i: usize| args.get(i).map(display).unwrap_or_default();
    let arg_num = |i: usize| args.get(i).and_then(to_number);

    if method == "toString" {
        return Ok(Value::String(display(receiver)));
    }

    match receiver {
        Value::String(s) => match method {
            "toUpperCase" => Ok(Value::String(s.to_uppercase())),
            "toLowerCase" => Ok(Value::String(s.to_lowercase())),
            "trim" => Ok(Value::String(s.trim().to_string())),
            "includes" => Ok(Value::Bool(s.contains(&arg_str(0)))),
            "startsWith" => Ok(Value::Bool(s.starts_with(&arg_str(0)))),
            "endsWith" => Ok(Value::Bool(s.ends_with(&arg_str(0)))),
            "split" => {
                let sep = arg_str(0);
                let parts: Vec<Value> = if sep.is_empty() {
                    s.chars().map(|c| Value::String(c.to_string())).collect()
                } else {
                    s.split(sep.as_str())
                        .map(|p| Value::String(p.to_string()))
                        .collect()
                };
                Ok(Value::Array(parts))
            }
            "repeat" => {
                let count = arg_num(0).unwrap_or(0.0);
                if !count.is_finite() || count < 0.0 {
                    return Err(EvalError::TypeError(format!("invalid repeat count {}", count)));
                }
                let count = count.trunc();
                let fits = count <= MAX_STRING_LEN as f64
                    && (count as usize)
                        .checked_mul(s.len())
                        .is_some_and(|len| len <= MAX_STRING_LEN);
                if !fits {
                    return Err(EvalError::TypeError(format!(
                        "repeat count {} exceeds the maximum string length",
                        count
                    )));
                }
                Ok(Value::String(s.repeat(count as usize)))
            }
            "slice" => {
                let chars: Vec<char> = s.chars().collect();
                let (start, end) = slice_bounds(chars.len(), arg_num(0), arg_num(1));
                Ok(Value::String(chars[start..end].iter().collect()))
            }
            _ => Err(unknown_method(receiver, method)),
        },
        Value::Array(items) => match method {
            "join" => {
                let sep = if args.is_empty() {
                    ",".to_string()
                } else {
                    arg_str(0)
                };
                Ok(Value::String(
                    items
                        .iter()
                        .map(|item| match item {
                            Value::Null => String::new(),
                            other => display(other),
                        })
                        .collect::<Vec<_>>()
                        .join(&sep),
                ))
            }
            "includes" => {
                let needle = args.first().cloned().unwrap_or(Value::Null);
                Ok(Value::Bool(items.iter().any(|i| strict_equals(i, &needle))))
            }
            "indexOf" => {
                let needle = args.first().cloned().unwrap_or(Value::Null);
                let idx = items
                    .iter()
                    .position(|i| strict_equals(i, &needle))
                    .map(|i| i as f64)
                    .unwrap_or(-1.0);
                number(idx)
            }
            "slice" => {
                let (start, end) = slice_bounds(items.len(), arg_num(0), arg_num(1));
                Ok(Value::Array(items[start..end].to_vec()))
            }
            _ => Err(unknown_method(receiver, method)),
        },
        Value::Number(n) => match method {
            "toFixed" => {
                let digits = arg_num(0).unwrap_or(0.0).clamp(0.0, 100.0) as usize;
                let f = n.as_f64().unwrap_or(0.0);
                Ok(Value::String(format!("{:.*}", digits, f)))
            }
            _ => Err(unknown_method(receiver, method)),
        },
        Value::Null => Err(EvalError::PropertyOfNothing {
            property: method.to_string(),
            receiver: "null".to_string(),
        }),
        _ => Err(unknown_method(receiver, method)),
    }
}

/// Resolve JS `slice(start, end)` arguments (negative counts from the end).
fn slice_bounds(len: usize, start: Option<f64>, end: Option<f64>) -> (usize, usize) {
    let resolve = |v: f64| -> usize {
        if v < 0.0 {
            (len as f64 + v).max(0.0) as usize
        } else {
            (v as usize).min(len)
        }
    };
    let start = start.map(resolve).unwrap_or(0);
    let end = end.map(resolve).unwrap_or(len);
    (start, end.max(start))
}

fn unknown_method(receiver: &Value, method: &str) -> EvalError {
    EvalError::UnknownMethod {
        method: method.to_string(),
        receiver: type_name(receiver).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse_expression;
    use serde_json::json;

    fn eval_in(source: &str, scope: &Scope) -> Result<Value, EvalError> {
        evaluate(&parse_expression(source)?, scope)
    }

    fn eval(source: &str) -> Value {
        eval_in(source, &Scope::new()).unwrap()
    }

    #[test]
    fn arithmetic_and_concatenation() {
        assert_eq!(eval("1 + 2 * 3"), json!(7));
        assert_eq!(eval("7 % 4"), json!(3));
        assert_eq!(eval("1 / 4"), json!(0.25));
        assert_eq!(eval("'a' + 1"), json!("a1"));
        assert_eq!(eval("[1, 2] + ''"), json!("1,2"));
        assert_eq!(eval("true + 1"), json!(2));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert_eq!(
            eval_in("1 / 0", &Scope::new()),
            Err(EvalError::NonFinite)
        );
    }

    #[test]
    fn logic_short_circuits() {
        // `missing` would be an error if evaluated
        assert_eq!(eval("false && missing"), json!(false));
        assert_eq!(eval("'x' || missing"), json!("x"));
        assert_eq!(eval("null ?? 'fallback'"), json!("fallback"));
        assert_eq!(eval("0 || 'zero'"), json!("zero"));
        assert_eq!(eval("!''"), json!(true));
    }

    #[test]
    fn comparisons() {
        assert_eq!(eval("2 > 1"), json!(true));
        assert_eq!(eval("'b' < 'a'"), json!(false));
        assert_eq!(eval("'10' == 10"), json!(true));
        assert_eq!(eval("'10' === 10"), json!(false));
        assert_eq!(eval("null == null"), json!(true));
        assert_eq!(eval("3 >= 3 ? 'yes' : 'no'"), json!("yes"));
    }

    #[test]
    fn members_and_methods() {
        let scope = Scope::new().with(
            "user",
            json!({"name": "ada", "tags": ["x", "y", "z"], "score": 3.14159}),
        );
        assert_eq!(eval_in("user.name.toUpperCase()", &scope), Ok(json!("ADA")));
        assert_eq!(eval_in("user.tags.length", &scope), Ok(json!(3)));
        assert_eq!(eval_in("user.tags[1]", &scope), Ok(json!("y")));
        assert_eq!(eval_in("user['name']", &scope), Ok(json!("ada")));
        assert_eq!(eval_in("user.tags.join(' / ')", &scope), Ok(json!("x / y / z")));
        assert_eq!(eval_in("user.tags.slice(-2)", &scope), Ok(json!(["y", "z"])));
        assert_eq!(eval_in("user.tags.indexOf('q')", &scope), Ok(json!(-1)));
        assert_eq!(eval_in("user.score.toFixed(2)", &scope), Ok(json!("3.14")));
        assert_eq!(eval_in("user.missing", &scope), Ok(json!(null)));
        assert_eq!(eval_in("'a,b'.split(',')", &scope), Ok(json!(["a", "b"])));
    }

    #[test]
    fn member_errors() {
        let scope = Scope::new().with("nothing", json!(null));
        assert!(matches!(
            eval_in("nothing.field", &scope),
            Err(EvalError::PropertyOfNothing { .. })
        ));
        assert!(matches!(
            eval_in("'s'.explode()", &scope),
            Err(EvalError::UnknownMethod { .. })
        ));
        assert_eq!(eval_in("(1)(2)", &scope), Err(EvalError::NotCallable));
    }

    #[test]
    fn repeat_is_bounded() {
        assert_eq!(eval("'ab'.repeat(3)"), json!("ababab"));
        assert_eq!(eval("'x'.repeat(2.7)"), json!("xx"));
        assert!(matches!(
            eval_in("'x'.repeat(1e20)", &Scope::new()),
            Err(EvalError::TypeError(_))
        ));
        assert!(matches!(
            eval_in("'xy'.repeat(16777216)", &Scope::new()),
            Err(EvalError::TypeError(_))
        ));
        assert!(matches!(
            eval_in("'x'.repeat(-1)", &Scope::new()),
            Err(EvalError::TypeError(_))
        ));
    }

    #[test]
    fn strict_binary_covers_every_operator() {
        let (one, zero) = (json!(1), json!(0));
        assert_eq!(strict_binary(BinaryOp::And, &zero, &one), Ok(json!(0)));
        assert_eq!(strict_binary(BinaryOp::Or, &zero, &one), Ok(json!(1)));
        assert_eq!(strict_binary(BinaryOp::Coalesce, &Value::Null, &one), Ok(json!(1)));
        assert_eq!(strict_binary(BinaryOp::Rem, &json!(7), &json!(4)), Ok(json!(3)));
    }

    #[test]
    fn object_literal_with_shorthand() {
        let scope = Scope::new().with("n", json!(5));
        assert_eq!(
            eval_in("{n, label: 'five'}", &scope),
            Ok(json!({"n": 5, "label": "five"}))
        );
    }
}
