// src/backend/lexicon.rs
//! Offline lexicon classifier: one label per article from summed word scores.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::collections::HashMap;

use super::{Backend, BackendError, BackendReply};
use crate::assemble::ClassificationRequest;

static LEXICON: Lazy<HashMap<String, i32>> = Lazy::new(|| {
    let raw = include_str!("../../sentiment_lexicon.json");
    serde_json::from_str::<HashMap<String, i32>>(raw).expect("valid sentiment lexicon")
});

#[derive(Debug, Clone)]
pub struct LexiconBackend {
    char_budget: usize,
}

impl LexiconBackend {
    pub fn new(char_budget: usize) -> Self {
        Self { char_budget }
    }

    #[inline]
    fn word_score(&self, w: &str) -> i32 {
        *LEXICON.get(w).unwrap_or(&0)
    }

    /// Returns (score, token count). A negator within the previous three tokens
    /// flips the sign of a word's lexicon score.
    pub fn score_text(&self, text: &str) -> (i32, usize) {
        let tokens: Vec<String> = tokenize(text).collect();
        let mut score: i32 = 0;

        for i in 0..tokens.len() {
            let base = self.word_score(tokens[i].as_str());
            if base == 0 {
                continue;
            }
            let negated = (1..=3).any(|k| i >= k && is_negator(tokens[i - k].as_str()));
            score += if negated { -base } else { base };
        }

        (score, tokens.len())
    }
}

#[async_trait]
impl Backend for LexiconBackend {
    async fn classify(&self, req: &ClassificationRequest) -> Result<BackendReply, BackendError> {
        if req.tickers.is_empty() {
            return Err(BackendError::NoTickers);
        }
        let text = req.classifier_text(self.char_budget);
        if text.is_empty() {
            return Err(BackendError::NoText);
        }
        let (score, _) = self.score_text(&text);
        Ok(label_for(score))
    }

    fn name(&self) -> &'static str {
        "lexicon"
    }
}

/// Sign gives the label; magnitude saturates towards 1.0.
fn label_for(score: i32) -> BackendReply {
    let label = match score.signum() {
        1 => "positive",
        -1 => "negative",
        _ => "neutral",
    };
    let mag = score.unsigned_abs() as f64;
    let confidence = if score == 0 {
        0.5
    } else {
        0.5 + 0.5 * mag / (mag + 3.0)
    };
    BackendReply::Label {
        label: label.to_string(),
        score: (confidence * 10_000.0).round() / 10_000.0,
    }
}

fn tokenize(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
}

fn is_negator(tok: &str) -> bool {
    matches!(
        tok,
        "not" | "no" | "never" | "isn't" | "wasn't" | "aren't" | "won't" | "can't" | "cannot"
            | "without"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_with_negation() {
        let lx = LexiconBackend::new(512);
        assert!(lx.score_text("Apple beats estimates as profits surge").0 > 0);
        assert!(lx.score_text("Tesla recalls vehicles after probe").0 < 0);
        assert!(lx.score_text("Shares did not surge").0 < 0);
        assert_eq!(lx.score_text("The meeting is on Tuesday").0, 0);
    }

    #[tokio::test]
    async fn labels_whole_article() {
        let lx = LexiconBackend::new(512);
        let req = ClassificationRequest {
            tickers: vec!["TSLA".into()],
            article_text: "Tesla shares plunge after recall".into(),
            ..ClassificationRequest::default()
        };
        match lx.classify(&req).await.unwrap() {
            BackendReply::Label { label, score } => {
                assert_eq!(label, "negative");
                assert!(score > 0.5 && score < 1.0);
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_text_is_an_error() {
        let lx = LexiconBackend::new(512);
        let req = ClassificationRequest {
            tickers: vec!["TSLA".into()],
            ..ClassificationRequest::default()
        };
        assert_eq!(lx.classify(&req).await, Err(BackendError::NoText));
    }
}
