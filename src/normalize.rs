// src/normalize.rs
//! Output normalizer: the single point of signal-schema enforcement.
//!
//! Accepts whatever the backend produced (after JSON repair) and keeps only
//! entries that form a valid `Signal`. Bad entries are dropped one by one; the
//! batch only fails when the top-level shape is neither a list nor an object.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::signal::{Sentiment, Signal};

pub const MAX_JUSTIFICATION_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("expected a JSON list of signals, got {0}")]
    NotASequence(&'static str),
}

/// Top-level entry: list → per-entry validation; single object → one-element list.
pub fn normalize_signals(value: &Value) -> Result<Vec<Signal>, SchemaError> {
    match value {
        Value::Array(items) => Ok(items.iter().filter_map(normalize_entry).collect()),
        Value::Object(_) => Ok(normalize_entry(value).into_iter().collect()),
        Value::Null => Err(SchemaError::NotASequence("null")),
        Value::Bool(_) => Err(SchemaError::NotASequence("a boolean")),
        Value::Number(_) => Err(SchemaError::NotASequence("a number")),
        Value::String(_) => Err(SchemaError::NotASequence("a string")),
    }
}

/// Validate one candidate entry; `None` means "drop silently".
pub fn normalize_entry(entry: &Value) -> Option<Signal> {
    let obj = entry.as_object()?;

    let ticker = normalize_ticker(obj.get("ticker").and_then(Value::as_str).unwrap_or(""));
    if ticker.is_empty() {
        return None;
    }
    let sentiment: Sentiment = obj.get("sentiment").and_then(Value::as_str)?.parse().ok()?;

    let confidence = obj.get("confidence").map(coerce_confidence).unwrap_or(0.0);
    let justification = truncate_chars(
        obj.get("justification")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim(),
        MAX_JUSTIFICATION_CHARS,
    );

    Some(Signal {
        ticker,
        sentiment,
        confidence,
        justification,
    })
}

pub fn normalize_ticker(t: &str) -> String {
    t.trim().to_uppercase()
}

/// Numbers and numeric strings → f64 clamped to [0,1]; anything else (or NaN) → 0.0.
pub fn coerce_confidence(v: &Value) -> f64 {
    let raw = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match raw {
        Some(x) if !x.is_nan() => x.clamp(0.0, 1.0),
        _ => 0.0,
    }
}

pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

// ------------------------------------------------------------
// serde hooks used by `OutputRecord`
// ------------------------------------------------------------

/// Every signal loaded from disk passes through the same validation as fresh output.
pub(crate) fn de_signals<'de, D>(d: D) -> Result<Vec<Signal>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(d)?;
    Ok(match v {
        Some(Value::Array(items)) => items.iter().filter_map(normalize_entry).collect(),
        _ => Vec::new(),
    })
}

pub(crate) fn de_lossy_string<'de, D>(d: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(d)?;
    Ok(match v {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    })
}
