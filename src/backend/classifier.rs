// src/backend/classifier.rs
//! Locally hosted text-classification endpoint (FinBERT-style inference server).
//!
//! Request: `POST {"inputs": "<article text>"}`. Accepted replies:
//! `{"label", "score"}`, `[{"label", "score"}, ...]` or the nested
//! `[[{"label", "score"}, ...]]` form. The highest-scoring label wins.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use super::{Backend, BackendError, BackendReply};
use crate::assemble::ClassificationRequest;

pub struct HttpClassifierBackend {
    http: reqwest::Client,
    endpoint: String,
    char_budget: usize,
}

impl HttpClassifierBackend {
    pub fn new(endpoint: &str, char_budget: usize, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            char_budget,
        })
    }
}

#[async_trait]
impl Backend for HttpClassifierBackend {
    async fn classify(&self, req: &ClassificationRequest) -> Result<BackendReply, BackendError> {
        if req.tickers.is_empty() {
            return Err(BackendError::NoTickers);
        }
        let text = req.classifier_text(self.char_budget);
        if text.is_empty() {
            return Err(BackendError::NoText);
        }

        let resp = self
            .http
            .post(&self.endpoint)
            .json(&json!({ "inputs": text }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(BackendError::Status(resp.status().as_u16()));
        }
        let body: Value = resp.json().await?;
        best_label(&body)
            .map(|(label, score)| BackendReply::Label { label, score })
            .ok_or_else(|| BackendError::Unexpected(truncate_for_log(&body.to_string())))
    }

    fn name(&self) -> &'static str {
        "classifier"
    }
}

/// Highest-scoring `(label, score)` anywhere in the accepted reply shapes.
pub fn best_label(body: &Value) -> Option<(String, f64)> {
    let mut candidates: Vec<&Value> = Vec::new();
    collect_candidates(body, &mut candidates);
    candidates
        .into_iter()
        .filter_map(|c| {
            let label = c.get("label")?.as_str()?.to_string();
            let score = c.get("score").and_then(Value::as_f64).unwrap_or(0.0);
            Some((label, score))
        })
        .max_by(|a, b| a.1.total_cmp(&b.1))
}

fn collect_candidates<'a>(v: &'a Value, out: &mut Vec<&'a Value>) {
    match v {
        Value::Array(items) => items.iter().for_each(|it| collect_candidates(it, out)),
        Value::Object(_) => out.push(v),
        _ => {}
    }
}

fn truncate_for_log(s: &str) -> String {
    s.chars().take(160).collect()
}
