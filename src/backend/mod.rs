// src/backend/mod.rs
//! Classification backends: one request/response contract, several providers.
//!
//! A backend only reports what the external service said (`BackendReply`);
//! turning that into validated signals is `interpret`, a separate
//! parse-then-validate stage shared by every provider.

pub mod budget;
pub mod classifier;
pub mod lexicon;
pub mod mock;
pub mod openai;

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::assemble::ClassificationRequest;
use crate::config::{AiConfig, PipelineConfig};
use crate::normalize::{normalize_signals, truncate_chars};
use crate::repair::parse_lenient;
use crate::signal::Signal;

pub use budget::BudgetedBackend;
pub use classifier::HttpClassifierBackend;
pub use lexicon::LexiconBackend;
pub use mock::MockBackend;
pub use openai::OpenAiBackend;

/// Raw answer from a backend, before repair and validation.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendReply {
    /// Free text from a generative model, expected to embed a JSON list.
    Text(String),
    /// One label for the whole article, applied to every candidate ticker.
    Label { label: String, score: f64 },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("missing API key")]
    MissingApiKey,
    #[error("http error: {0}")]
    Http(String),
    #[error("backend returned status {0}")]
    Status(u16),
    #[error("backend timed out after {0:?}")]
    Timeout(Duration),
    #[error("backend returned an empty reply")]
    EmptyReply,
    #[error("article has no candidate tickers")]
    NoTickers,
    #[error("article has no text to classify")]
    NoText,
    #[error("daily limit of {0} calls reached")]
    DailyLimit(u32),
    #[error("unexpected reply: {0}")]
    Unexpected(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        BackendError::Http(e.to_string())
    }
}

#[async_trait]
pub trait Backend: Send + Sync {
    async fn classify(&self, req: &ClassificationRequest) -> Result<BackendReply, BackendError>;

    /// Provider name for logs and metrics labels.
    fn name(&self) -> &'static str;
}

#[async_trait]
impl<B: Backend + ?Sized> Backend for Arc<B> {
    async fn classify(&self, req: &ClassificationRequest) -> Result<BackendReply, BackendError> {
        (**self).classify(req).await
    }
    fn name(&self) -> &'static str {
        (**self).name()
    }
}

#[async_trait]
impl<B: Backend + ?Sized> Backend for Box<B> {
    async fn classify(&self, req: &ClassificationRequest) -> Result<BackendReply, BackendError> {
        (**self).classify(req).await
    }
    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Leaves room for the label suffix within the normalizer's justification bound.
const JUSTIFICATION_EXCERPT_CHARS: usize = 120;

/// Repair and validate a reply into signals. `Err` carries the per-item error note.
pub fn interpret(reply: BackendReply, req: &ClassificationRequest) -> Result<Vec<Signal>, String> {
    match reply {
        BackendReply::Text(text) => {
            let value = parse_lenient(&text).map_err(|e| e.to_string())?;
            normalize_signals(&value).map_err(|e| e.to_string())
        }
        BackendReply::Label { label, score } => {
            if req.tickers.is_empty() {
                return Err(BackendError::NoTickers.to_string());
            }
            let excerpt = truncate_chars(&req.classifier_text(usize::MAX), JUSTIFICATION_EXCERPT_CHARS);
            let label = label.trim().to_lowercase();
            let entries: Vec<Value> = req
                .tickers
                .iter()
                .map(|t| {
                    json!({
                        "ticker": t,
                        "sentiment": label,
                        "confidence": score,
                        "justification": format!("classified \"{excerpt}...\" as {label}"),
                    })
                })
                .collect();
            let signals = normalize_signals(&Value::Array(entries)).map_err(|e| e.to_string())?;
            if signals.is_empty() {
                return Err(format!("classifier label '{label}' is not a known sentiment"));
            }
            Ok(signals)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BackendKind {
    /// Remote chat-completion model.
    Openai,
    /// Locally hosted text-classification endpoint.
    Classifier,
    /// Offline lexicon classifier.
    Lexicon,
}

impl BackendKind {
    pub fn output_path<'a>(&self, cfg: &'a PipelineConfig) -> &'a std::path::Path {
        match self {
            BackendKind::Openai => &cfg.outputs.llm,
            BackendKind::Classifier => &cfg.outputs.classifier,
            BackendKind::Lexicon => &cfg.outputs.lexicon,
        }
    }
}

pub type DynBackend = Arc<dyn Backend>;

/// Factory: build a backend according to kind, config and environment.
///
/// * If `AI_TEST_MODE=mock`, returns a mock that answers every item with an empty list.
/// * Generative backends are wrapped with the daily call budget when configured.
pub fn build_backend(
    kind: BackendKind,
    pipeline: &PipelineConfig,
    ai: &AiConfig,
) -> anyhow::Result<DynBackend> {
    if std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Ok(Arc::new(MockBackend::constant(BackendReply::Text("[]".into()))));
    }

    let timeout = pipeline.generation.timeout();
    let backend: DynBackend = match kind {
        BackendKind::Openai => {
            if !ai.enabled {
                anyhow::bail!("AI backend is disabled in config");
            }
            let provider = OpenAiBackend::new(&ai.api_key, &ai.model, ai.temperature, timeout)?;
            match ai.daily_limit {
                Some(limit) => Arc::new(BudgetedBackend::new(
                    provider,
                    budget::default_budget_dir(),
                    limit,
                )),
                None => Arc::new(provider),
            }
        }
        BackendKind::Classifier => Arc::new(HttpClassifierBackend::new(
            &pipeline.classifier.endpoint,
            pipeline.generation.classifier_char_budget,
            timeout,
        )?),
        BackendKind::Lexicon => Arc::new(LexiconBackend::new(
            pipeline.generation.classifier_char_budget,
        )),
    };
    Ok(backend)
}
