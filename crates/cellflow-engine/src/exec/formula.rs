//! Formula evaluation.
//!
//! A formula is a single Rhai expression. Its reads are pushed into the scope
//! as constants, so the expression cannot mutate them. `$name` is accepted as
//! an older spelling of `name`.

use rhai::{Dynamic, Engine, Scope};

use crate::analyzer::strip_sigils;
use crate::value::StoreValue;

/// Evaluate `expression` against the given input values.
pub fn evaluate(
    engine: &Engine,
    expression: &str,
    inputs: &[(String, StoreValue)],
) -> Result<Dynamic, String> {
    let expression = strip_sigils(expression);
    if expression.trim().is_empty() {
        return Ok(Dynamic::UNIT);
    }

    let mut scope = Scope::new();
    for (name, value) in inputs {
        scope.push_constant_dynamic(name.as_str(), value.to_dynamic());
    }

    engine
        .eval_expression_with_scope::<Dynamic>(&mut scope, &expression)
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::exec::create_expression_engine;

    fn inputs(pairs: &[(&str, i64)]) -> Vec<(String, StoreValue)> {
        pairs
            .iter()
            .map(|(n, v)| (n.to_string(), StoreValue::from(*v)))
            .collect()
    }

    #[test]
    fn test_evaluate_sum() {
        let engine = create_expression_engine(&EngineConfig::default());
        let result = evaluate(&engine, "a + b", &inputs(&[("a", 2), ("b", 3)])).unwrap();
        assert_eq!(result.as_int().unwrap(), 5);
    }

    #[test]
    fn test_sigil_and_bare_names_agree() {
        let engine = create_expression_engine(&EngineConfig::default());
        let vars = inputs(&[("x", 10)]);
        let bare = evaluate(&engine, "x * 2", &vars).unwrap();
        let sigil = evaluate(&engine, "$x * 2", &vars).unwrap();
        assert_eq!(bare.as_int().unwrap(), sigil.as_int().unwrap());
    }

    #[test]
    fn test_statements_are_rejected() {
        let engine = create_expression_engine(&EngineConfig::default());
        assert!(evaluate(&engine, "let y = 1; y", &[]).is_err());
    }

    #[test]
    fn test_nan_passes_through() {
        let engine = create_expression_engine(&EngineConfig::default());
        let result = evaluate(&engine, "(-1.0).sqrt()", &[]).unwrap();
        assert!(result.as_float().unwrap().is_nan());
    }

    #[test]
    fn test_unknown_variable_is_an_error() {
        let engine = create_expression_engine(&EngineConfig::default());
        assert!(evaluate(&engine, "missing + 1", &[]).is_err());
    }
}
