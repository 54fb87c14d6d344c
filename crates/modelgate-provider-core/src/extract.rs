//! Best-effort typed reads over raw vendor JSON.
//!
//! None of these fail: a field of an unexpected shape reads as absent, so one
//! odd model entry never aborts a whole catalog sync.

use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::{Map, Value};

pub fn string(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn object<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    map.get(key).and_then(Value::as_object)
}

/// Trimmed strings of an array; non-string entries are skipped.
pub fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// A JSON number, or a string holding one.
pub fn number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            text.parse::<f64>().ok().filter(|value| value.is_finite())
        }
        _ => None,
    }
}

pub fn decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(number) => decimal_from_str(&number.to_string())
            .or_else(|| number.as_f64().and_then(|f| Decimal::try_from(f).ok())),
        Value::String(text) => decimal_from_str(text.trim()),
        _ => None,
    }
}

fn decimal_from_str(text: &str) -> Option<Decimal> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

/// `default_parameters` object: null and blank strings map to `None`,
/// numbers and numeric strings to a decimal, anything else is dropped.
pub fn default_parameters(value: Option<&Value>) -> BTreeMap<String, Option<Decimal>> {
    let mut out = BTreeMap::new();
    let Some(Value::Object(params)) = value else {
        return out;
    };
    for (key, raw) in params {
        match raw {
            Value::Null => {
                out.insert(key.clone(), None);
            }
            Value::String(text) if text.trim().is_empty() => {
                out.insert(key.clone(), None);
            }
            Value::String(_) | Value::Number(_) => {
                if let Some(parsed) = decimal(raw) {
                    out.insert(key.clone(), Some(parsed));
                }
            }
            _ => {}
        }
    }
    out
}

pub fn contains_ignore_case(list: &[String], target: &str) -> bool {
    list.iter().any(|item| item.eq_ignore_ascii_case(target))
}
