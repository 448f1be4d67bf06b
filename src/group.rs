// src/group.rs
//! Flat → grouped import for signal files produced row-per-ticker.
//!
//! Rows `{title, published, ticker, sentiment, confidence, justification}` are
//! folded into one `OutputRecord` per identity. Rows go through the same
//! normalizer as fresh backend output.

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::identity::IdentityKey;
use crate::normalize::normalize_entry;
use crate::signal::OutputRecord;
use crate::store;

const SIGNAL_FIELDS: [&str; 3] = ["signals", "gpt_signals", "finbert_signals"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupOutcome {
    AlreadyGrouped,
    Converted {
        records: usize,
        dropped_rows: usize,
        backup: PathBuf,
    },
}

/// True when the first element already carries a signal list.
pub fn is_grouped(data: &Value) -> bool {
    match data.as_array().and_then(|a| a.first()) {
        Some(Value::Object(first)) => SIGNAL_FIELDS.iter().any(|f| first.contains_key(*f)),
        Some(_) => false,
        // An empty list is trivially grouped.
        None => data.is_array(),
    }
}

/// Fold flat rows into grouped records, sorted by identity.
/// Returns the records and the number of rows that failed validation.
pub fn group_rows(rows: &[Value]) -> (Vec<OutputRecord>, usize) {
    let mut grouped: BTreeMap<IdentityKey, OutputRecord> = BTreeMap::new();
    let mut dropped = 0usize;

    for row in rows {
        let Some(obj) = row.as_object() else {
            dropped += 1;
            continue;
        };
        let field = |k: &str| {
            obj.get(k)
                .and_then(Value::as_str)
                .map(str::trim)
                .unwrap_or("")
                .to_string()
        };
        let title = field("title");
        let published = field("published");
        let key = IdentityKey::from_fields(&title, &published);

        let rec = grouped.entry(key.clone()).or_insert_with(|| OutputRecord {
            key: Some(key.to_string()),
            title,
            published,
            ..OutputRecord::default()
        });
        if rec.source.is_empty() {
            rec.source = field("source");
        }
        if rec.url.is_empty() {
            rec.url = field("url");
        }

        match normalize_entry(row) {
            Some(sig) => rec.signals.push(sig),
            None => dropped += 1,
        }
    }

    (grouped.into_values().collect(), dropped)
}

pub fn backup_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "signals".to_string());
    path.with_file_name(format!("{stem}.backup.json"))
}

/// Convert `path` in place. A byte copy of the original is kept next to it.
pub fn group_file(path: &Path) -> Result<GroupOutcome> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let data: Value =
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;

    if is_grouped(&data) {
        info!(file = %path.display(), "already grouped; nothing to do");
        return Ok(GroupOutcome::AlreadyGrouped);
    }
    let rows = data
        .as_array()
        .with_context(|| format!("{} is not a JSON list", path.display()))?;

    let (records, dropped_rows) = group_rows(rows);

    let backup = backup_path(path);
    fs::copy(path, &backup).with_context(|| format!("backing up to {}", backup.display()))?;
    store::write_output(path, &records)?;

    info!(
        file = %path.display(),
        records = records.len(),
        dropped = dropped_rows,
        "converted flat signals to grouped format"
    );
    Ok(GroupOutcome::Converted {
        records: records.len(),
        dropped_rows,
        backup,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Sentiment;
    use serde_json::json;

    #[test]
    fn rows_fold_by_title_and_date() {
        let rows = vec![
            json!({"title": " Fed holds ", "published": "2024-03-01", "ticker": "jpm", "sentiment": "Neutral", "confidence": 0.7, "justification": "x"}),
            json!({"title": "Fed holds", "published": "2024-03-01", "ticker": "GS", "sentiment": "positive", "confidence": "0.6"}),
            json!({"title": "Other", "published": "2024-03-02", "ticker": "AAPL", "sentiment": "bullish"}),
        ];
        let (records, dropped) = group_rows(&rows);
        assert_eq!(dropped, 1);
        assert_eq!(records.len(), 2);

        let fed = records.iter().find(|r| r.title == "Fed holds").unwrap();
        assert_eq!(fed.key.as_deref(), Some("Fed holds|2024-03-01"));
        assert_eq!(fed.signals.len(), 2);
        assert_eq!(fed.signals[0].ticker, "JPM");
        assert_eq!(fed.signals[0].sentiment, Sentiment::Neutral);
        assert!((fed.signals[1].confidence - 0.6).abs() < 1e-9);

        let other = records.iter().find(|r| r.title == "Other").unwrap();
        assert!(other.signals.is_empty());
    }

    #[test]
    fn grouped_detection() {
        assert!(is_grouped(&json!([{"title": "a", "finbert_signals": []}])));
        assert!(is_grouped(&json!([])));
        assert!(!is_grouped(&json!([{"title": "a", "ticker": "X"}])));
        assert!(!is_grouped(&json!({"title": "a"})));
    }

    #[test]
    fn file_conversion_writes_backup_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("finbert_signals_combined.json");
        let flat = json!([
            {"title": "T1", "published": "d", "ticker": "AAPL", "sentiment": "positive", "confidence": 0.9, "justification": "j"}
        ]);
        let original = serde_json::to_string(&flat).unwrap();
        fs::write(&path, &original).unwrap();

        let out = group_file(&path).unwrap();
        let backup = dir.path().join("finbert_signals_combined.backup.json");
        assert_eq!(
            out,
            GroupOutcome::Converted {
                records: 1,
                dropped_rows: 0,
                backup: backup.clone()
            }
        );
        assert_eq!(fs::read_to_string(&backup).unwrap(), original);

        let loaded = store::load_output(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].signals[0].ticker, "AAPL");

        assert_eq!(group_file(&path).unwrap(), GroupOutcome::AlreadyGrouped);
    }
}
