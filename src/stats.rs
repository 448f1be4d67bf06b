// src/stats.rs
//! Pipeline counts for a quick health overview.

use anyhow::Result;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use tracing::warn;

use crate::config::PipelineConfig;
use crate::lookup::{json_files_in, load_articles, load_work_items, LookupIndex};
use crate::store;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutputStats {
    pub name: String,
    pub records: usize,
    pub completed: usize,
    pub errored: usize,
    pub signals: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineStats {
    pub enriched_files: usize,
    /// Rows across all enrichment files, duplicates included.
    pub enriched_rows: usize,
    pub distinct_articles: usize,
    /// Rows with a non-empty subject, verb and object.
    pub full_triplets: usize,
    /// `None` when no clustered work-item file exists.
    pub work_items: Option<usize>,
    pub outputs: Vec<OutputStats>,
}

pub fn enrichment_stats(dir: &Path, stats: &mut PipelineStats) {
    let files = match json_files_in(dir) {
        Ok(f) => f,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "enrichment directory unavailable");
            return;
        }
    };
    let mut index = LookupIndex::new();
    for path in files {
        match load_articles(&path) {
            Ok(articles) => {
                stats.enriched_files += 1;
                stats.enriched_rows += articles.len();
                stats.full_triplets += articles
                    .iter()
                    .filter(|a| a.triplet().is_complete())
                    .count();
                index.extend(articles);
            }
            Err(e) => {
                warn!(file = %path.display(), error = %format!("{e:#}"), "skipping enrichment file");
            }
        }
    }
    stats.distinct_articles = index.len();
}

pub fn output_stats(name: &str, path: &Path) -> Result<OutputStats> {
    let records = store::load_output(path)?;
    Ok(OutputStats {
        name: name.to_string(),
        records: records.len(),
        completed: records.iter().filter(|r| r.is_completed()).count(),
        errored: records.iter().filter(|r| r.error.is_some()).count(),
        signals: records.iter().map(|r| r.signals.len()).sum(),
    })
}

pub fn collect(cfg: &PipelineConfig) -> Result<PipelineStats> {
    let mut stats = PipelineStats::default();
    enrichment_stats(&cfg.enriched_dir, &mut stats);
    stats.work_items = load_work_items(&cfg.clustered_file)?.map(|items| items.len());

    for (name, path) in [
        ("llm", &cfg.outputs.llm),
        ("classifier", &cfg.outputs.classifier),
        ("lexicon", &cfg.outputs.lexicon),
    ] {
        if path.exists() {
            stats.outputs.push(output_stats(name, path)?);
        }
    }
    Ok(stats)
}

impl fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Enrichment files: {}", self.enriched_files)?;
        writeln!(f, "Enriched articles: {}", self.enriched_rows)?;
        writeln!(f, "Distinct articles: {}", self.distinct_articles)?;
        writeln!(f, "Full triplets: {}", self.full_triplets)?;
        match self.work_items {
            Some(n) => writeln!(f, "Clustered work items: {n}")?,
            None => writeln!(f, "Clustered work items: (none)")?,
        }
        for o in &self.outputs {
            writeln!(
                f,
                "Output [{}]: records={} completed={} errored={} signals={}",
                o.name, o.records, o.completed, o.errored, o.signals
            )?;
        }
        Ok(())
    }
}
