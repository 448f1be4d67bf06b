// src/lookup.rs
//! Lookup index: identity key → the most enriched known copy of an article.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::identity::IdentityKey;
use crate::types::{ArticleRecord, WorkItem};

#[derive(Debug, Clone, Default)]
pub struct LookupIndex {
    by_key: BTreeMap<IdentityKey, ArticleRecord>,
}

impl LookupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from every `*.json` file in `dir` (sorted by name). Unreadable or
    /// malformed files are logged and skipped; a missing directory yields an empty index.
    pub fn from_dir(dir: &Path) -> Self {
        let mut index = Self::new();
        let files = match json_files_in(dir) {
            Ok(f) => f,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "enrichment directory unavailable");
                return index;
            }
        };

        for path in files {
            match load_articles(&path) {
                Ok(articles) => {
                    debug!(file = %path.display(), count = articles.len(), "loaded enrichment file");
                    index.extend(articles);
                }
                Err(e) => {
                    warn!(file = %path.display(), error = %format!("{e:#}"), "skipping enrichment file");
                }
            }
        }
        info!(articles = index.len(), "lookup index built");
        index
    }

    /// Insert keeping the larger serialized record per key; ties keep the existing one.
    pub fn insert(&mut self, art: ArticleRecord) {
        let key = IdentityKey::resolve(art.title_str(), art.published_str(), &art);
        match self.by_key.get(&key) {
            Some(existing) if existing.serialized_len() >= art.serialized_len() => {}
            _ => {
                self.by_key.insert(key, art);
            }
        }
    }

    pub fn extend<I: IntoIterator<Item = ArticleRecord>>(&mut self, articles: I) {
        for art in articles {
            self.insert(art);
        }
    }

    pub fn get(&self, key: &IdentityKey) -> Option<&ArticleRecord> {
        self.by_key.get(key)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IdentityKey, &ArticleRecord)> {
        self.by_key.iter()
    }

    /// One work item per distinct article, used when no clustered queue exists.
    pub fn as_work_items(&self) -> Vec<WorkItem> {
        self.by_key
            .iter()
            .map(|(key, art)| WorkItem::from_article(key.clone(), art))
            .collect()
    }
}

pub fn load_articles(path: &Path) -> Result<Vec<ArticleRecord>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let articles: Vec<ArticleRecord> =
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    Ok(articles)
}

/// Load the clustered work queue. `Ok(None)` when the file does not exist.
pub fn load_work_items(path: &Path) -> Result<Option<Vec<WorkItem>>> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let items: Vec<WorkItem> =
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(items))
}

/// Work queue for a run: the clustered file if present, else one item per indexed article.
pub fn work_queue(clustered: &Path, index: &LookupIndex) -> Result<Vec<WorkItem>> {
    match load_work_items(clustered)? {
        Some(items) => {
            info!(items = items.len(), file = %clustered.display(), "using clustered work items");
            Ok(items)
        }
        None => {
            info!(
                items = index.len(),
                "no clustered work items; falling back to one item per article"
            );
            Ok(index.as_work_items())
        }
    }
}

pub(crate) fn json_files_in(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
        .collect();
    files.sort();
    Ok(files)
}
