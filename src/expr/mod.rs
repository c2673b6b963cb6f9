//! # Expression engine
//!
//! Directives evaluate attribute text (`c`, `vars`, `of`) and `{...}`
//! interpolation spans through an [`ExpressionEvaluator`]. The default
//! [`ExprEngine`] understands a small JavaScript-flavoured subset:
//!
//! ```ignore
//! user.name.toUpperCase() + '!'
//! items.length > 2 && !hidden ? 'many' : 'few'
//! {title: 'Docs', tags: ['a', 'b']}
//! ```
//!
//! Evaluation has full read access to the scope it is given and no time or
//! resource bound; embedders that need one should supply their own evaluator.

pub mod eval;
pub mod parser;
pub mod value;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::EvalError;

pub use parser::{parse_expression, BinaryOp, Expr, UnaryOp};

/// Flat identifier -> value mapping. Scopes never chain to a parent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope {
    vars: HashMap<String, Value>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// A copy of this scope with `bindings` layered on top.
    pub fn extended<I>(&self, bindings: I) -> Scope
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut scope = self.clone();
        scope.vars.extend(bindings);
        scope
    }

    /// Build a scope from an evaluated object value. `null` gives an empty scope.
    pub fn from_value(value: Value) -> Option<Scope> {
        match value {
            Value::Object(map) => Some(map.into_iter().collect()),
            Value::Null => Some(Scope::new()),
            _ => None,
        }
    }
}

impl FromIterator<(String, Value)> for Scope {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Scope {
            vars: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Scope {
    type Item = (String, Value);
    type IntoIter = std::collections::hash_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.vars.into_iter()
    }
}

/// Evaluates expression source text against a scope.
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, source: &str, scope: &Scope) -> Result<Value, EvalError>;
}

/// Default evaluator: parses with [`parse_expression`] and interprets the AST.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExprEngine;

impl ExpressionEvaluator for ExprEngine {
    fn evaluate(&self, source: &str, scope: &Scope) -> Result<Value, EvalError> {
        let expr = parse_expression(source)?;
        eval::evaluate(&expr, scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scope_from_object_value() {
        let scope = Scope::from_value(json!({"a": 1, "b": "two"})).unwrap();
        assert_eq!(scope.get("a"), Some(&json!(1)));
        assert_eq!(scope.len(), 2);
        assert!(Scope::from_value(json!(null)).unwrap().is_empty());
        assert!(Scope::from_value(json!([1])).is_none());
    }

    #[test]
    fn extended_scope_overrides_without_mutating() {
        let base = Scope::new().with("x", json!(1)).with("y", json!(2));
        let inner = base.extended([("x".to_string(), json!(10))]);
        assert_eq!(inner.get("x"), Some(&json!(10)));
        assert_eq!(inner.get("y"), Some(&json!(2)));
        assert_eq!(base.get("x"), Some(&json!(1)));
    }

    #[test]
    fn engine_evaluates_against_scope() {
        let scope = Scope::new().with("n", json!(4));
        assert_eq!(ExprEngine.evaluate("n * 2 + 1", &scope), Ok(json!(9)));
        assert!(matches!(
            ExprEngine.evaluate("missing", &scope),
            Err(EvalError::UndefinedVariable { .. })
        ));
    }

    #[test]
    fn scope_deserializes_from_yaml() {
        let scope: Scope = serde_yaml::from_str("user: Ada\nitems: [1, 2]").unwrap();
        assert_eq!(scope.get("user"), Some(&json!("Ada")));
        assert_eq!(scope.get("items"), Some(&json!([1, 2])));
    }
}
