// src/backend/openai.rs
//! OpenAI Chat Completions backend. Requires an API key (see `config/ai.json`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Backend, BackendError, BackendReply};
use crate::assemble::ClassificationRequest;

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAiBackend {
    http: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f32,
    url: String,
}

impl OpenAiBackend {
    pub fn new(
        api_key: &str,
        model: &str,
        temperature: f32,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("news-signals/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
            temperature,
            url: CHAT_COMPLETIONS_URL.to_string(),
        })
    }

    /// Point at a compatible endpoint (proxy, local gateway).
    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}
#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
}
#[derive(Deserialize)]
struct Resp {
    choices: Vec<Choice>,
}
#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}
#[derive(Deserialize)]
struct ChoiceMsg {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl Backend for OpenAiBackend {
    async fn classify(&self, req: &ClassificationRequest) -> Result<BackendReply, BackendError> {
        if self.api_key.is_empty() {
            return Err(BackendError::MissingApiKey);
        }

        let prompt = req.render_prompt();
        let body = Req {
            model: &self.model,
            messages: vec![Msg {
                role: "user",
                content: &prompt,
            }],
            temperature: self.temperature,
        };

        let resp = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(BackendError::Status(resp.status().as_u16()));
        }
        let parsed: Resp = resp.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(BackendError::EmptyReply);
        }
        Ok(BackendReply::Text(content))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
