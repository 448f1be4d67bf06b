// src/store.rs
//! Crash-safe persistence of signal sets.
//!
//! Writes go to a temp file in the target's directory, are flushed and fsynced,
//! then renamed over the target. Readers see either the old or the new file.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::signal::OutputRecord;

/// Load a persisted signal set. A missing file is an empty set; a file that
/// exists but does not parse is an error, so it never gets silently overwritten.
pub fn load_output(path: &Path) -> Result<Vec<OutputRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    let records: Vec<OutputRecord> =
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    Ok(records)
}

pub fn write_output(path: &Path, records: &[OutputRecord]) -> Result<()> {
    write_json_atomic(path, &records)
}

/// Pretty-printed JSON with a trailing newline, replaced atomically.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temp file in {}", dir.display()))?;
    {
        let mut w = BufWriter::new(tmp.as_file());
        serde_json::to_writer_pretty(&mut w, value)
            .with_context(|| format!("serializing {}", path.display()))?;
        w.write_all(b"\n")?;
        w.flush()?;
    }
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("syncing temp file for {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("renaming temp file over {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{Sentiment, Signal};

    fn record(title: &str) -> OutputRecord {
        OutputRecord {
            key: Some(format!("{title}|2024-01-01")),
            title: title.into(),
            published: "2024-01-01".into(),
            signals: vec![Signal {
                ticker: "AAPL".into(),
                sentiment: Sentiment::Positive,
                confidence: 0.8,
                justification: "beat".into(),
            }],
            ..OutputRecord::default()
        }
    }

    #[test]
    fn write_then_load_and_no_temp_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("signals.json");
        write_output(&path, &[record("T1"), record("T2")]).unwrap();

        let loaded = load_output(&path).unwrap();
        assert_eq!(loaded, vec![record("T1"), record("T2")]);

        let entries: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .flatten()
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn missing_file_is_empty_but_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signals.json");
        assert!(load_output(&path).unwrap().is_empty());
        fs::write(&path, "[{\"title\": ").unwrap();
        assert!(load_output(&path).is_err());
    }

    #[test]
    fn failed_write_leaves_previous_version_intact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signals.json");
        write_output(&path, &[record("T1")]).unwrap();
        let before = fs::read(&path).unwrap();

        // A directory squatting on the target path makes the rename fail.
        let blocked = dir.path().join("blocked");
        fs::create_dir_all(blocked.join("child")).unwrap();
        assert!(write_output(&blocked, &[record("T2")]).is_err());

        assert_eq!(fs::read(&path).unwrap(), before);
    }
}
