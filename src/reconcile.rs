// src/reconcile.rs
//! Reconciliation of two independently generated signal sets.
//!
//! Pairs are keyed by (normalised title, ticker). Each pair of set A is joined to
//! set B exactly, or else to the most similar B title carrying the same ticker
//! (matching-blocks ratio ≥ threshold; ties → lexicographically smallest title).
//! Unjoined pairs are left out. Set A is the reference when computing
//! per-class precision/recall.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::normalize::normalize_ticker;
use crate::signal::{OutputRecord, Sentiment};
use crate::store;

pub const FUZZY_MATCH_THRESHOLD: f64 = 0.9;

static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Comparison form of a title: entities decoded, curly quotes → ASCII,
/// lowercase, whitespace collapsed.
pub fn slug_title(t: &str) -> String {
    let decoded = html_escape::decode_html_entities(t);
    let out = decoded
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .to_lowercase();
    RE_WS.replace_all(out.trim(), " ").to_string()
}

/// Ratcliff/Obershelp similarity, `2·M / (|a| + |b|)` over chars, where `M` is
/// the total size of the matching blocks found by repeatedly taking the longest
/// common substring and recursing on both sides. Two empty strings score 1.0.
///
/// No junk heuristics are applied; long titles are compared character for character.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matched_chars(&a, &b) as f64 / total as f64
}

fn matched_chars(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, k) = longest_match(a, b, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        matched += k;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            pending.push((i + k, ahi, j + k, bhi));
        }
    }
    matched
}

/// Longest common block in `a[alo..ahi]` × `b[blo..bhi]` as `(i, j, len)`.
/// Ties go to the block that starts earliest in `a`, then earliest in `b`.
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best) = (alo, blo, 0);
    // run[j - blo + 1] = length of the common run ending at (i - 1, j)
    let mut prev = vec![0usize; bhi - blo + 1];
    let mut cur = vec![0usize; bhi - blo + 1];
    for i in alo..ahi {
        for j in blo..bhi {
            let k = if a[i] == b[j] { prev[j - blo] + 1 } else { 0 };
            cur[j - blo + 1] = k;
            if k > best {
                best_i = i + 1 - k;
                best_j = j + 1 - k;
                best = k;
            }
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    (best_i, best_j, best)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalEntry {
    pub sentiment: Sentiment,
    pub confidence: f64,
}

/// (title slug, ticker) → judgment. Later duplicates overwrite earlier ones.
pub type SignalMap = BTreeMap<(String, String), SignalEntry>;

pub fn signal_map(records: &[OutputRecord]) -> SignalMap {
    let mut m = SignalMap::new();
    for rec in records {
        let title = slug_title(&rec.title);
        if title.is_empty() {
            continue;
        }
        for sig in &rec.signals {
            let ticker = normalize_ticker(&sig.ticker);
            if ticker.is_empty() {
                continue;
            }
            m.insert(
                (title.clone(), ticker),
                SignalEntry {
                    sentiment: sig.sentiment,
                    confidence: sig.confidence,
                },
            );
        }
    }
    m
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationRow {
    pub title: String,
    pub ticker: String,
    pub sentiment_a: Sentiment,
    pub sentiment_b: Sentiment,
    pub confidence_a: f64,
    pub confidence_b: f64,
    #[serde(rename = "match")]
    pub is_match: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub sentiment: Sentiment,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Reference (set A) count for this class.
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReportStatus {
    Ok,
    /// Both inputs loaded but no (title, ticker) pair could be joined.
    NoOverlap,
    /// An input was missing or unreadable.
    NoData { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationReport {
    pub status: ReportStatus,
    pub rows: Vec<ReconciliationRow>,
    pub fuzzy_joins: usize,
    /// Rows = reference (A), columns = prediction (B), in `Sentiment::ALL` order.
    pub confusion: [[usize; 3]; 3],
}

impl ReconciliationReport {
    pub fn no_data(reason: impl Into<String>) -> Self {
        Self {
            status: ReportStatus::NoData {
                reason: reason.into(),
            },
            rows: Vec::new(),
            fuzzy_joins: 0,
            confusion: [[0; 3]; 3],
        }
    }

    pub fn joined(&self) -> usize {
        self.rows.len()
    }

    pub fn agreements(&self) -> usize {
        self.rows.iter().filter(|r| r.is_match).count()
    }

    pub fn disagreements(&self) -> usize {
        self.joined() - self.agreements()
    }

    /// `None` when nothing was joined.
    pub fn agreement_rate(&self) -> Option<f64> {
        match self.joined() {
            0 => None,
            n => Some(self.agreements() as f64 / n as f64),
        }
    }

    pub fn disagreeing_rows(&self) -> impl Iterator<Item = &ReconciliationRow> {
        self.rows.iter().filter(|r| !r.is_match)
    }

    pub fn per_class(&self) -> Vec<ClassMetrics> {
        Sentiment::ALL
            .iter()
            .map(|&s| {
                let i = s.index();
                let tp = self.confusion[i][i];
                let predicted: usize = (0..3).map(|r| self.confusion[r][i]).sum();
                let support: usize = self.confusion[i].iter().sum();
                let precision = ratio(tp, predicted);
                let recall = ratio(tp, support);
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                ClassMetrics {
                    sentiment: s,
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect()
    }

    pub fn macro_f1(&self) -> f64 {
        let per = self.per_class();
        per.iter().map(|c| c.f1).sum::<f64>() / per.len() as f64
    }

    /// Human-readable summary. `label_a`/`label_b` name the two producers.
    pub fn summary(&self, label_a: &str, label_b: &str) -> String {
        let mut out = String::new();
        match &self.status {
            ReportStatus::NoData { reason } => {
                let _ = writeln!(out, "No data: {reason}");
                return out;
            }
            ReportStatus::NoOverlap => {
                let _ = writeln!(out, "No overlaps found.");
                let _ = writeln!(
                    out,
                    "No (title, ticker) pair of {label_a} could be joined to {label_b}."
                );
                return out;
            }
            ReportStatus::Ok => {}
        }

        let total = self.joined();
        let agree = self.agreements();
        let disagree = self.disagreements();
        let _ = writeln!(out, "Total matched (title + ticker): {total}");
        let _ = writeln!(out, "Fuzzy title joins: {}", self.fuzzy_joins);
        let _ = writeln!(
            out,
            "Agreement: {agree} ({:.2}%)",
            100.0 * ratio(agree, total)
        );
        let _ = writeln!(
            out,
            "Disagreement: {disagree} ({:.2}%)",
            100.0 * ratio(disagree, total)
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "Classification report ({label_b} vs {label_a}):");
        let _ = writeln!(
            out,
            "{:>10} {:>10} {:>10} {:>10} {:>10}",
            "", "precision", "recall", "f1-score", "support"
        );
        for c in self.per_class() {
            let _ = writeln!(
                out,
                "{:>10} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                c.sentiment.as_str(),
                c.precision,
                c.recall,
                c.f1,
                c.support
            );
        }
        let _ = writeln!(out, "{:>10} {:>32.2} {:>10}", "macro f1", self.macro_f1(), total);
        let _ = writeln!(out);
        let _ = writeln!(out, "Confusion matrix (rows: {label_a}, cols: {label_b}):");
        let _ = writeln!(out, "{:>10} {:>9} {:>9} {:>9}", "", "positive", "neutral", "negative");
        for s in Sentiment::ALL {
            let r = self.confusion[s.index()];
            let _ = writeln!(out, "{:>10} {:>9} {:>9} {:>9}", s.as_str(), r[0], r[1], r[2]);
        }
        out
    }

    /// `comparison_summary.txt`, `comparison_full.csv`, `disagreements.csv`.
    /// Written for every status; a report without rows gets header-only CSVs.
    pub fn write_to_dir(&self, dir: &Path, label_a: &str, label_b: &str) -> Result<()> {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        fs::write(
            dir.join("comparison_summary.txt"),
            self.summary(label_a, label_b),
        )
        .context("writing comparison summary")?;
        write_rows_csv(&dir.join("comparison_full.csv"), self.rows.iter())?;
        write_rows_csv(&dir.join("disagreements.csv"), self.disagreeing_rows())?;
        Ok(())
    }
}

fn ratio(n: usize, d: usize) -> f64 {
    if d == 0 {
        0.0
    } else {
        n as f64 / d as f64
    }
}

fn write_rows_csv<'a>(
    path: &Path,
    rows: impl Iterator<Item = &'a ReconciliationRow>,
) -> Result<()> {
    let mut w = csv::Writer::from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    // Header even when there are no rows.
    w.write_record([
        "title",
        "ticker",
        "sentiment_a",
        "sentiment_b",
        "confidence_a",
        "confidence_b",
        "match",
    ])?;
    for r in rows {
        w.write_record([
            r.title.clone(),
            r.ticker.clone(),
            r.sentiment_a.to_string(),
            r.sentiment_b.to_string(),
            r.confidence_a.to_string(),
            r.confidence_b.to_string(),
            r.is_match.to_string(),
        ])?;
    }
    w.flush()?;
    Ok(())
}

/// Best fuzzy candidate among `titles`: highest similarity ≥ threshold, then
/// lexicographically smallest.
pub fn best_fuzzy_title<'a, I>(title: &str, titles: I, threshold: f64) -> Option<(&'a str, f64)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(&'a str, f64)> = None;
    for cand in titles {
        let sim = title_similarity(title, cand);
        if sim < threshold {
            continue;
        }
        best = match best {
            None => Some((cand, sim)),
            Some((bt, bs)) if sim > bs || (sim == bs && cand < bt) => Some((cand, sim)),
            keep => keep,
        };
    }
    best
}

pub fn reconcile(a: &[OutputRecord], b: &[OutputRecord], threshold: f64) -> ReconciliationReport {
    let map_a = signal_map(a);
    let map_b = signal_map(b);

    // ticker → distinct B titles carrying it
    let mut titles_by_ticker: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (title, ticker) in map_b.keys() {
        titles_by_ticker
            .entry(ticker.as_str())
            .or_default()
            .push(title.as_str());
    }

    let mut rows = Vec::new();
    let mut fuzzy_joins = 0usize;
    let mut confusion = [[0usize; 3]; 3];

    for ((title, ticker), va) in &map_a {
        let vb = match map_b.get(&(title.clone(), ticker.clone())) {
            Some(v) => *v,
            None => {
                let candidates = titles_by_ticker
                    .get(ticker.as_str())
                    .map(|v| v.iter().copied())
                    .into_iter()
                    .flatten();
                match best_fuzzy_title(title, candidates, threshold) {
                    Some((t, _)) => {
                        fuzzy_joins += 1;
                        map_b[&(t.to_string(), ticker.clone())]
                    }
                    None => continue,
                }
            }
        };

        confusion[va.sentiment.index()][vb.sentiment.index()] += 1;
        rows.push(ReconciliationRow {
            title: title.clone(),
            ticker: ticker.clone(),
            sentiment_a: va.sentiment,
            sentiment_b: vb.sentiment,
            confidence_a: va.confidence,
            confidence_b: vb.confidence,
            is_match: va.sentiment == vb.sentiment,
        });
    }

    let status = if rows.is_empty() {
        ReportStatus::NoOverlap
    } else {
        ReportStatus::Ok
    };
    info!(
        pairs_a = map_a.len(),
        pairs_b = map_b.len(),
        joined = rows.len(),
        fuzzy = fuzzy_joins,
        "reconciliation finished"
    );
    ReconciliationReport {
        status,
        rows,
        fuzzy_joins,
        confusion,
    }
}

/// Load both sets and reconcile. Missing or unreadable inputs yield a
/// `NoData` report instead of an error.
pub fn reconcile_files(path_a: &Path, path_b: &Path, threshold: f64) -> ReconciliationReport {
    let mut loaded = Vec::with_capacity(2);
    for path in [path_a, path_b] {
        if !path.exists() {
            warn!(file = %path.display(), "missing signal file");
            return ReconciliationReport::no_data(format!("missing file {}", path.display()));
        }
        match store::load_output(path) {
            Ok(records) => loaded.push(records),
            Err(e) => {
                warn!(file = %path.display(), error = %format!("{e:#}"), "failed to parse signal file");
                return ReconciliationReport::no_data(format!("failed to parse {}", path.display()));
            }
        }
    }
    reconcile(&loaded[0], &loaded[1], threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Signal;

    fn rec(title: &str, sigs: &[(&str, Sentiment, f64)]) -> OutputRecord {
        OutputRecord {
            title: title.into(),
            published: "2024-01-01".into(),
            signals: sigs
                .iter()
                .map(|(t, s, c)| Signal {
                    ticker: t.to_string(),
                    sentiment: *s,
                    confidence: *c,
                    justification: String::new(),
                })
                .collect(),
            ..OutputRecord::default()
        }
    }

    #[test]
    fn slug_normalises_quotes_case_and_whitespace() {
        assert_eq!(
            slug_title("  Apple\u{2019}s   \u{201C}Record\u{201D} &amp; Quarter "),
            "apple's \"record\" & quarter"
        );
    }

    #[test]
    fn fuzzy_threshold_behaviour() {
        let a = slug_title("Apple posts record quarter");
        assert!(title_similarity(&a, &slug_title("Apple posts record quarter.")) >= 0.9);
        assert!(title_similarity(&a, &slug_title("Tesla recalls vehicles")) < 0.9);

        // Wire-service prefixes stay above the threshold.
        let plain = slug_title("Apple beats Wall Street estimates on strong iPhone sales");
        let wire = slug_title("UPDATE 1-Apple beats Wall Street estimates on strong iPhone sales");
        let sim = title_similarity(&plain, &wire);
        assert!((sim - 112.0 / 121.0).abs() < 1e-9);
        assert!(sim >= FUZZY_MATCH_THRESHOLD);
    }

    #[test]
    fn matching_blocks_ratio_known_values() {
        assert_eq!(title_similarity("", ""), 1.0);
        assert_eq!(title_similarity("abc", ""), 0.0);
        assert_eq!(title_similarity("abcd", "abcd"), 1.0);
        // one block "bcd" → 2·3 / 8
        assert!((title_similarity("abcd", "bcda") - 0.75).abs() < 1e-9);
        // "qabxcd" vs "abycdf": blocks "ab" + "cd" → 2·4 / 12
        assert!((title_similarity("qabxcd", "abycdf") - 8.0 / 12.0).abs() < 1e-9);
    }

    #[test]
    fn fuzzy_tie_break_prefers_highest_then_lexicographic() {
        let titles = ["apple posts record quarter!", "apple posts record quarter.", "apple posts record quarters!!"];
        let best = best_fuzzy_title("apple posts record quarter", titles.iter().copied(), 0.9);
        assert_eq!(best.map(|(t, _)| t), Some("apple posts record quarter!"));
    }

    #[test]
    fn fuzzy_join_only_considers_titles_with_the_same_ticker() {
        let a = vec![rec("Apple posts record quarter", &[("AAPL", Sentiment::Positive, 0.9)])];
        let b = vec![
            rec("Apple posts record quarter.", &[("MSFT", Sentiment::Positive, 0.9)]),
            rec("Apple posts record quarter!", &[("AAPL", Sentiment::Neutral, 0.6)]),
        ];
        let report = reconcile(&a, &b, FUZZY_MATCH_THRESHOLD);
        assert_eq!(report.joined(), 1);
        assert_eq!(report.fuzzy_joins, 1);
        assert_eq!(report.rows[0].sentiment_b, Sentiment::Neutral);
    }

    #[test]
    fn per_class_metrics_use_a_as_reference() {
        let a = vec![
            rec("t1", &[("AAPL", Sentiment::Positive, 0.9)]),
            rec("t2", &[("AAPL", Sentiment::Positive, 0.9)]),
            rec("t3", &[("AAPL", Sentiment::Negative, 0.9)]),
        ];
        let b = vec![
            rec("t1", &[("AAPL", Sentiment::Positive, 0.7)]),
            rec("t2", &[("AAPL", Sentiment::Negative, 0.7)]),
            rec("t3", &[("AAPL", Sentiment::Negative, 0.7)]),
        ];
        let report = reconcile(&a, &b, FUZZY_MATCH_THRESHOLD);
        let per = report.per_class();
        let pos = &per[0];
        assert_eq!(pos.support, 2);
        assert!((pos.precision - 1.0).abs() < 1e-9);
        assert!((pos.recall - 0.5).abs() < 1e-9);
        let neg = &per[2];
        assert!((neg.precision - 0.5).abs() < 1e-9);
        assert!((neg.recall - 1.0).abs() < 1e-9);
        let neu = &per[1];
        assert_eq!((neu.precision, neu.recall, neu.f1, neu.support), (0.0, 0.0, 0.0, 0));
        assert_eq!(report.confusion[0], [1, 0, 1]);
    }

    #[test]
    fn summary_and_csv_files_are_written() {
        let a = vec![rec("T1", &[("AAPL", Sentiment::Positive, 0.8)])];
        let b = vec![rec("T1", &[("AAPL", Sentiment::Negative, 0.6)])];
        let report = reconcile(&a, &b, FUZZY_MATCH_THRESHOLD);
        let dir = tempfile::tempdir().unwrap();
        report.write_to_dir(dir.path(), "llm", "classifier").unwrap();

        let summary = fs::read_to_string(dir.path().join("comparison_summary.txt")).unwrap();
        assert!(summary.contains("Total matched (title + ticker): 1"));
        assert!(summary.contains("Agreement: 0 (0.00%)"));
        let dis = fs::read_to_string(dir.path().join("disagreements.csv")).unwrap();
        assert_eq!(dis.lines().count(), 2);
        assert!(dis.lines().nth(1).unwrap().starts_with("t1,AAPL,positive,negative,"));
    }
}
