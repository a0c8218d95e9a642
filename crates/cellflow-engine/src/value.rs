//! Store values and value comparison.

use rhai::{Array, Dynamic, Map};

use crate::error::CellFault;

/// The value held by a variable in the store.
///
/// `Undefined` is what a read-before-write yields. `Error` is the marker a
/// failing cell leaves on each variable it would have written.
#[derive(Clone, Debug, Default)]
pub enum StoreValue {
    #[default]
    Undefined,
    Value(Dynamic),
    Error(CellFault),
}

impl StoreValue {
    pub fn is_undefined(&self) -> bool {
        matches!(self, StoreValue::Undefined)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, StoreValue::Error(_))
    }

    pub fn as_value(&self) -> Option<&Dynamic> {
        match self {
            StoreValue::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn fault(&self) -> Option<&CellFault> {
        match self {
            StoreValue::Error(f) => Some(f),
            _ => None,
        }
    }

    /// Numeric view of the value (ints are widened).
    pub fn as_f64(&self) -> Option<f64> {
        let v = self.as_value()?;
        if let Ok(n) = v.as_float() {
            return Some(n);
        }
        v.as_int().ok().map(|n| n as f64)
    }

    /// The value as seen by executors: undefined and error markers become unit.
    pub fn to_dynamic(&self) -> Dynamic {
        match self {
            StoreValue::Value(v) => v.clone(),
            _ => Dynamic::UNIT,
        }
    }

    /// Whether two store values are indistinguishable for change detection.
    pub fn same_as(&self, other: &StoreValue) -> bool {
        match (self, other) {
            (StoreValue::Undefined, StoreValue::Undefined) => true,
            (StoreValue::Value(a), StoreValue::Value(b)) => dynamic_eq(a, b),
            (StoreValue::Error(a), StoreValue::Error(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq for StoreValue {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl From<Dynamic> for StoreValue {
    fn from(value: Dynamic) -> Self {
        StoreValue::Value(value)
    }
}

impl From<i64> for StoreValue {
    fn from(value: i64) -> Self {
        StoreValue::Value(Dynamic::from(value))
    }
}

impl From<f64> for StoreValue {
    fn from(value: f64) -> Self {
        StoreValue::Value(Dynamic::from(value))
    }
}

impl From<bool> for StoreValue {
    fn from(value: bool) -> Self {
        StoreValue::Value(Dynamic::from(value))
    }
}

impl From<&str> for StoreValue {
    fn from(value: &str) -> Self {
        StoreValue::Value(Dynamic::from(value.to_string()))
    }
}

impl From<CellFault> for StoreValue {
    fn from(fault: CellFault) -> Self {
        StoreValue::Error(fault)
    }
}

/// Structural equality for script values.
///
/// Values of types without a structural comparison (functions, custom types)
/// are never equal, so writing them always counts as a change.
pub fn dynamic_eq(a: &Dynamic, b: &Dynamic) -> bool {
    if a.type_name() != b.type_name() {
        return false;
    }
    if a.is_unit() {
        return true;
    }
    if let (Ok(x), Ok(y)) = (a.as_bool(), b.as_bool()) {
        return x == y;
    }
    if let (Ok(x), Ok(y)) = (a.as_int(), b.as_int()) {
        return x == y;
    }
    if let (Ok(x), Ok(y)) = (a.as_float(), b.as_float()) {
        return x.to_bits() == y.to_bits();
    }
    if let (Ok(x), Ok(y)) = (a.as_char(), b.as_char()) {
        return x == y;
    }
    if a.is_string() {
        return a.clone().into_immutable_string().ok() == b.clone().into_immutable_string().ok();
    }
    if a.is_array() {
        let (Some(x), Some(y)) = (a.clone().try_cast::<Array>(), b.clone().try_cast::<Array>())
        else {
            return false;
        };
        return x.len() == y.len() && x.iter().zip(y.iter()).all(|(p, q)| dynamic_eq(p, q));
    }
    if a.is_map() {
        let (Some(x), Some(y)) = (a.clone().try_cast::<Map>(), b.clone().try_cast::<Map>()) else {
            return false;
        };
        return x.len() == y.len()
            && x.iter()
                .zip(y.iter())
                .all(|((ka, va), (kb, vb))| ka == kb && dynamic_eq(va, vb));
    }
    false
}

/// Parse a literal typed into an input cell (or a `--set` override).
///
/// - Empty string or whitespace -> unit
/// - Integer literal -> INT, decimal literal -> FLOAT
/// - `true` / `false` -> bool
/// - Quoted string -> string without quotes
/// - Otherwise -> the trimmed text
pub fn parse_literal(input: &str) -> Dynamic {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Dynamic::UNIT;
    }

    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        return Dynamic::from(trimmed[1..trimmed.len() - 1].to_string());
    }

    match trimmed {
        "true" => return Dynamic::from(true),
        "false" => return Dynamic::from(false),
        _ => {}
    }

    if let Ok(n) = trimmed.parse::<i64>() {
        return Dynamic::from(n);
    }
    if let Ok(n) = trimmed.parse::<f64>() {
        return Dynamic::from(n);
    }

    Dynamic::from(trimmed.to_string())
}
