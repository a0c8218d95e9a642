//! Placeholder filters for markdown cells.
//!
//! A filter turns the placeholder's value into display text. Unknown filter
//! names fall back to the plain display form of the value.

use rhai::Dynamic;

use crate::analyzer::FilterSpec;
use crate::format::format_dynamic;

fn as_number(value: &Dynamic) -> Option<f64> {
    if let Ok(n) = value.as_float() {
        return Some(n);
    }
    value.as_int().ok().map(|n| n as f64)
}

fn arg_usize(args: &[String], index: usize, default: usize) -> usize {
    args.get(index)
        .and_then(|a| a.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

pub fn fixed_decimal_string(n: f64, decimals: usize) -> String {
    if n.is_nan() {
        return "#NAN!".to_string();
    }
    if n.is_infinite() {
        return "#INF!".to_string();
    }

    // Always prints trailing zeros.
    format!("{:.*}", decimals, n)
}

pub fn money_string(n: f64, symbol: &str, decimals: usize) -> String {
    if n.is_nan() {
        return "#NAN!".to_string();
    }
    if n.is_infinite() {
        return "#INF!".to_string();
    }

    let sign = if n.is_sign_negative() && n != 0.0 { "-" } else { "" };
    format!("{}{}{}", sign, symbol, fixed_decimal_string(n.abs(), decimals))
}

/// Render `value` through the named filter.
pub fn apply_filter(value: &Dynamic, filter: &FilterSpec) -> String {
    let args = filter.args.as_slice();
    match filter.name.as_str() {
        "round" | "fixed" => match as_number(value) {
            Some(n) => fixed_decimal_string(n, arg_usize(args, 0, 0)),
            None => format_dynamic(value),
        },
        "percent" => match as_number(value) {
            Some(n) => format!("{}%", fixed_decimal_string(n * 100.0, arg_usize(args, 0, 0))),
            None => format_dynamic(value),
        },
        "currency" => match as_number(value) {
            Some(n) => {
                let symbol = args.first().map(|s| s.trim()).unwrap_or("$");
                money_string(n, symbol, arg_usize(args, 1, 2))
            }
            None => format_dynamic(value),
        },
        "upper" => format_dynamic(value).to_uppercase(),
        "lower" => format_dynamic(value).to_lowercase(),
        "trim" => format_dynamic(value).trim().to_string(),
        "default" => {
            if value.is_unit() {
                args.join(",").trim().to_string()
            } else {
                format_dynamic(value)
            }
        }
        "len" => {
            if let Some(array) = value.read_lock::<rhai::Array>() {
                array.len().to_string()
            } else if let Some(map) = value.read_lock::<rhai::Map>() {
                map.len().to_string()
            } else {
                format_dynamic(value).chars().count().to_string()
            }
        }
        _ => format_dynamic(value),
    }
}
