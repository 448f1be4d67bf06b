// src/repair.rs
//! Lenient JSON extraction for generative replies.
//!
//! Order: direct parse → balanced `{...}` / `[...]` span search with trailing
//! commas removed → greedy first-opener..last-closer span. Scanning is
//! string-aware, so brackets and commas inside JSON strings are left alone.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepairError {
    #[error("no JSON found in model output")]
    NoJson,
    #[error("JSON span found but unparseable: {0}")]
    Unparseable(String),
}

/// Parse `text` as JSON, repairing common LLM wrapping when the direct parse fails.
pub fn parse_lenient(text: &str) -> Result<Value, RepairError> {
    let trimmed = text.trim();
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return Ok(v);
    }

    let mut last_err: Option<String> = None;
    let mut found_span = false;

    for (start, _) in trimmed.char_indices().filter(|(_, c)| *c == '{' || *c == '[') {
        let Some(end) = balanced_end(trimmed, start) else {
            continue;
        };
        found_span = true;
        match serde_json::from_str::<Value>(&strip_trailing_commas(&trimmed[start..=end])) {
            Ok(v) => return Ok(v),
            Err(e) => {
                last_err.get_or_insert_with(|| e.to_string());
            }
        }
    }

    // Unbalanced text (e.g. stray closer in prose): try the widest span.
    if let Some(span) = greedy_span(trimmed) {
        found_span = true;
        match serde_json::from_str::<Value>(&strip_trailing_commas(span)) {
            Ok(v) => return Ok(v),
            Err(e) => {
                last_err.get_or_insert_with(|| e.to_string());
            }
        }
    }

    if found_span {
        Err(RepairError::Unparseable(last_err.unwrap_or_default()))
    } else {
        Err(RepairError::NoJson)
    }
}

/// Byte index of the delimiter closing the one at `start`, if the span is balanced.
pub fn balanced_end(s: &str, start: usize) -> Option<usize> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(c) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(start + i);
                }
            }
            _ => {}
        }
    }
    None
}

fn greedy_span(s: &str) -> Option<&str> {
    let start = s.find(['{', '['])?;
    let closer = if s[start..].starts_with('{') { '}' } else { ']' };
    let end = s.rfind(closer)?;
    (end > start).then(|| &s[start..=end])
}

/// Drop commas that are followed (after whitespace) by `}` or `]`, outside strings.
pub fn strip_trailing_commas(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            out.push(c);
            continue;
        }
        if c == '"' {
            in_string = true;
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}
