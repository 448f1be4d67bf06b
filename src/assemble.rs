// src/assemble.rs
//! Work item assembly: merge a queued item with its article context into one
//! backend-agnostic classification request.

use serde::Serialize;

use crate::identity::IdentityKey;
use crate::lookup::LookupIndex;
use crate::normalize::{normalize_ticker, truncate_chars};
use crate::types::{ArticleRecord, Triplet, WorkItem};

/// Default character budget for local classifier input.
pub const CLASSIFIER_CHAR_BUDGET: usize = 512;

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ClassificationRequest {
    #[serde(skip)]
    pub key: Option<IdentityKey>,
    pub title: String,
    pub published: String,
    pub source: String,
    pub url: String,
    pub tickers: Vec<String>,
    pub triplet: Triplet,
    pub sentence: String,
    pub cluster_label: String,
    pub polarity: Option<f64>,
    pub article_text: String,
}

impl ClassificationRequest {
    pub fn key(&self) -> IdentityKey {
        self.key
            .clone()
            .unwrap_or_else(|| IdentityKey::from_fields(&self.title, &self.published))
    }

    /// Instruction block for a generative backend; demands a JSON array reply.
    pub fn render_prompt(&self) -> String {
        let t = &self.triplet;
        let polarity = self
            .polarity
            .map(|p| format!("{p:.3}"))
            .unwrap_or_else(|| "n/a".to_string());
        format!(
            "You are a financial NLP analyst. Analyse the given news context and return \
only companies that are clearly affected.\n\
Return ONLY JSON: a list of objects with keys: ticker (string), sentiment \
(positive/neutral/negative), confidence (0-1 float), justification (<=30 words).\n\n\
ArticleTitle: {title}\n\
Published: {published}\n\
Source: {source}\n\
CandidateTickers: [{tickers}]\n\
Triplet: subject={subject} | verb={verb} | object={object}\n\
SentenceContext: {sentence}\n\
ClusterLabel: {cluster}\n\
PolarityScore: {polarity}\n\n\
JSON output spec:\n\
[\n  {{\"ticker\":\"AAPL\",\"sentiment\":\"positive\",\"confidence\":0.83,\"justification\":\"<why in <=30 words>\"}},\n  ...\n]",
            title = self.title,
            published = self.published,
            source = self.source,
            tickers = self.tickers.join(", "),
            subject = t.subject.as_deref().unwrap_or(""),
            verb = t.verb.as_deref().unwrap_or(""),
            object = t.object.as_deref().unwrap_or(""),
            sentence = self.sentence,
            cluster = self.cluster_label,
            polarity = polarity,
        )
    }

    /// Raw text for a local classifier: article body, else sentence, else title;
    /// truncated to `budget` characters.
    pub fn classifier_text(&self, budget: usize) -> String {
        let text = [&self.article_text, &self.sentence, &self.title]
            .into_iter()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .unwrap_or("");
        truncate_chars(text, budget)
    }
}

/// Resolve the item's identity, pull context from the index (or build a minimal
/// one from the item itself), and merge candidate tickers.
pub fn assemble(item: &WorkItem, index: &LookupIndex) -> ClassificationRequest {
    let key = item
        .key
        .clone()
        .unwrap_or_else(|| IdentityKey::resolve(item.title_str(), item.published_str(), item));
    let fallback;
    let ctx: &ArticleRecord = match index.get(&key) {
        Some(a) => a,
        None => {
            fallback = ArticleRecord {
                title: item.title.clone(),
                published: item.published.clone(),
                ..ArticleRecord::default()
            };
            &fallback
        }
    };

    let tickers = merge_tickers(&item.tickers, &ctx.tickers);

    let item_triplet = item.triplet();
    let triplet = if item_triplet.is_empty() {
        ctx.triplet()
    } else {
        item_triplet
    };

    let sentence = item
        .sentence
        .as_deref()
        .or(ctx.sentence.as_deref())
        .unwrap_or_default()
        .trim()
        .to_string();

    ClassificationRequest {
        key: Some(key),
        title: ctx.title_str().to_string(),
        published: ctx.published_str().to_string(),
        source: ctx.source.as_deref().unwrap_or_default().trim().to_string(),
        url: ctx.url.as_deref().unwrap_or_default().trim().to_string(),
        tickers,
        triplet,
        sentence,
        cluster_label: item.cluster_label.clone().unwrap_or_default(),
        polarity: item.polarity.or(ctx.polarity),
        article_text: ctx.body_text().unwrap_or_default().to_string(),
    }
}

/// Union of both lists, uppercased, empties removed, first-seen order kept.
pub fn merge_tickers(primary: &[String], secondary: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for t in primary.iter().chain(secondary.iter()) {
        let t = normalize_ticker(t);
        if !t.is_empty() && !out.contains(&t) {
            out.push(t);
        }
    }
    out
}
