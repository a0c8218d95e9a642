//! Display formatting for store values.

use rhai::Dynamic;

use crate::value::StoreValue;

/// Format a Dynamic value for display.
pub fn format_dynamic(value: &Dynamic) -> String {
    if value.is_unit() {
        String::new()
    } else if let Ok(n) = value.as_float() {
        format_number(n)
    } else if let Ok(n) = value.as_int() {
        n.to_string()
    } else if let Ok(b) = value.as_bool() {
        if b { "true" } else { "false" }.to_string()
    } else if let Ok(s) = value.clone().into_string() {
        s
    } else {
        value.to_string()
    }
}

/// Format a number for display.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "#NAN!".to_string()
    } else if n.is_infinite() {
        "#INF!".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e10 {
        format!("{:.0}", n)
    } else {
        format!("{:.2}", n)
    }
}

/// Format a store slot, rendering error markers as `#ERR!`.
pub fn format_store_value(value: &StoreValue) -> String {
    match value {
        StoreValue::Undefined => String::new(),
        StoreValue::Value(v) => format_dynamic(v),
        StoreValue::Error(_) => "#ERR!".to_string(),
    }
}
