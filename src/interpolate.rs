use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::error::EvalError;
use crate::expr::value::display;
use crate::expr::{ExpressionEvaluator, Scope};

/// Replace every `{expr}` span in `markup` with its evaluated, stringified value.
///
/// Spans are not brace-depth aware: the first `}` after a `{` closes the span,
/// so expressions containing a literal `}` (object literals) cannot be
/// interpolated. Identical span texts are evaluated once and every occurrence
/// is replaced. The first evaluation failure aborts the whole interpolation.
pub fn interpolate(
    markup: &str,
    scope: &Scope,
    evaluator: &dyn ExpressionEvaluator,
) -> Result<String, EvalError> {
    static SPAN_REGEX: OnceLock<Regex> = OnceLock::new();
    let re = SPAN_REGEX.get_or_init(|| Regex::new(r"\{[^}]*\}").unwrap());

    let mut seen = HashSet::new();
    let mut output = markup.to_string();
    for span in re.find_iter(markup) {
        let span = span.as_str();
        if !seen.insert(span) {
            continue;
        }
        let source = &span[1..span.len() - 1];
        let value = evaluator.evaluate(source, scope)?;
        output = output.replace(span, &display(&value));
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ExprEngine;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn replaces_each_span() {
        let scope = Scope::new().with("x", json!(10)).with("i", json!(0));
        assert_eq!(
            interpolate("<p>{x}-{i}</p>", &scope, &ExprEngine).unwrap(),
            "<p>10-0</p>"
        );
    }

    #[test]
    fn text_without_spans_is_unchanged() {
        let out = interpolate("plain <b>text</b>", &Scope::new(), &ExprEngine).unwrap();
        assert_eq!(out, "plain <b>text</b>");
    }

    #[test]
    fn second_pass_is_idempotent() {
        let scope = Scope::new().with("name", json!("Ada"));
        let once = interpolate("Hi {name}!", &scope, &ExprEngine).unwrap();
        let twice = interpolate(&once, &scope, &ExprEngine).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn errors_propagate() {
        let err = interpolate("{ok} {missing}", &Scope::new().with("ok", json!(1)), &ExprEngine);
        assert_eq!(
            err,
            Err(EvalError::UndefinedVariable {
                name: "missing".to_string()
            })
        );
    }

    #[test]
    fn object_literal_span_is_cut_at_first_brace() {
        // `{{a: 1}.a}` scans as `{{a: 1}`, which does not parse.
        assert!(interpolate("{{a: 1}.a}", &Scope::new(), &ExprEngine).is_err());
    }

    struct Counting(AtomicUsize);

    impl ExpressionEvaluator for Counting {
        fn evaluate(&self, source: &str, _scope: &Scope) -> Result<Value, EvalError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(json!(source.trim().to_uppercase()))
        }
    }

    #[test]
    fn duplicate_spans_evaluate_once() {
        let counter = Counting(AtomicUsize::new(0));
        let out = interpolate("{a} and {a} and {b}", &Scope::new(), &counter).unwrap();
        assert_eq!(out, "A and A and B");
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }
}
