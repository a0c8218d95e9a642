//! Markdown interpolation.

use rhai::Engine;

use super::filters::apply_filter;
use super::formula::evaluate;
use crate::analyzer::{TemplatePart, parse_template};
use crate::format::format_dynamic;
use crate::value::StoreValue;

/// Marker rendered in place of a placeholder whose expression failed.
pub const PLACEHOLDER_ERROR: &str = "#ERR!";

/// Substitute every placeholder in `template`.
///
/// An unterminated placeholder is left in the output as literal text.
pub fn render(engine: &Engine, template: &str, inputs: &[(String, StoreValue)]) -> String {
    let (parts, _) = parse_template(template);
    let mut out = String::with_capacity(template.len());

    for part in parts {
        match part {
            TemplatePart::Text(text) => out.push_str(&text),
            TemplatePart::Placeholder(placeholder) => {
                match evaluate(engine, &placeholder.expression, inputs) {
                    Ok(value) => match &placeholder.filter {
                        Some(filter) => out.push_str(&apply_filter(&value, filter)),
                        None => out.push_str(&format_dynamic(&value)),
                    },
                    Err(e) => {
                        tracing::debug!(
                            expression = placeholder.expression.as_str(),
                            error = e.as_str(),
                            "placeholder failed"
                        );
                        out.push_str(PLACEHOLDER_ERROR);
                    }
                }
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::exec::create_expression_engine;

    #[test]
    fn test_render_with_filter() {
        let engine = create_expression_engine(&EngineConfig::default());
        let inputs = vec![("c".to_string(), StoreValue::from(5_i64))];
        assert_eq!(render(&engine, "Total: {{c|round,1}}", &inputs), "Total: 5.0");
    }

    #[test]
    fn test_render_expression_and_plain_text() {
        let engine = create_expression_engine(&EngineConfig::default());
        let inputs = vec![
            ("name".to_string(), StoreValue::from("Ada")),
            ("n".to_string(), StoreValue::from(2_i64)),
        ];
        assert_eq!(
            render(&engine, "Hi {{ name | upper }}, {{ n * 3 }} items", &inputs),
            "Hi ADA, 6 items"
        );
    }

    #[test]
    fn test_failed_placeholder_renders_marker() {
        let engine = create_expression_engine(&EngineConfig::default());
        assert_eq!(render(&engine, "x={{ nope }}", &[]), "x=#ERR!");
    }

    #[test]
    fn test_unterminated_placeholder_is_literal() {
        let engine = create_expression_engine(&EngineConfig::default());
        assert_eq!(render(&engine, "a {{ b", &[]), "a {{ b");
    }
}
