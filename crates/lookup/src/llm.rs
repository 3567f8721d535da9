use std::env;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

/// Opaque text-generation collaborator: prompt in, text out. Implementations
/// are resolved once at startup; a scripted fake stands in for tests.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(
        &self,
        system: Option<&str>,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String>;
}

/// Chat-completions client for any OpenAI-compatible endpoint. All supported
/// providers speak this dialect, so one client covers the whole chain.
#[derive(Debug, Clone)]
pub struct OpenAiCompatModel {
    http: reqwest::Client,
    provider: String,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatModel {
    pub fn new(
        http: reqwest::Client,
        provider: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http,
            provider: provider.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatModel {
    fn name(&self) -> &str {
        &self.provider
    }

    async fn complete(
        &self,
        system: Option<&str>,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String> {
        let mut messages = Vec::new();
        if let Some(system) = system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": prompt }));

        let payload = json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.7,
            "max_tokens": max_tokens,
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .context("chat completion request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("chat provider status {}: {}", status.as_u16(), body);
        }

        let body: Value = response
            .json()
            .await
            .context("chat provider returned non-JSON body")?;
        extract_reply_text(&body)
            .filter(|text| !text.trim().is_empty())
            .context("chat provider reply had no content")
    }
}

/// Reply text lives under `message.content` for most providers; reasoning
/// models sometimes leave it in `reasoning_content`, and completion-style
/// endpoints use a bare `text` field.
pub fn extract_reply_text(body: &Value) -> Option<String> {
    let choice = body.get("choices")?.as_array()?.first()?;

    let from_message = choice.get("message").and_then(|message| {
        ["content", "reasoning_content"]
            .iter()
            .find_map(|key| message.get(*key).and_then(Value::as_str))
            .filter(|text| !text.trim().is_empty())
    });

    from_message
        .or_else(|| {
            choice
                .get("text")
                .and_then(Value::as_str)
                .filter(|text| !text.trim().is_empty())
        })
        .map(|text| text.trim().to_string())
}

/// Provider chain, first configured one wins. Resolved once at startup; a
/// missing provider is the single fatal configuration error in the system.
pub fn resolve_chat_model(http: reqwest::Client) -> Result<OpenAiCompatModel> {
    let model_override = env::var("WAYFINDER_LLM_MODEL").ok();
    let model = |default: &str| {
        model_override
            .clone()
            .unwrap_or_else(|| default.to_string())
    };

    let picked = if let Ok(token) = env::var("HF_TOKEN") {
        OpenAiCompatModel::new(
            http,
            "huggingface",
            "https://router.huggingface.co/v1",
            token,
            model("meta-llama/Meta-Llama-3-8B-Instruct"),
        )
    } else if let Ok(key) = env::var("GROQ_API_KEY") {
        OpenAiCompatModel::new(
            http,
            "groq",
            "https://api.groq.com/openai/v1",
            key,
            model("llama-3.1-8b-instant"),
        )
    } else if let Ok(key) = env::var("OPENAI_API_KEY") {
        OpenAiCompatModel::new(
            http,
            "openai",
            "https://api.openai.com/v1",
            key,
            model("gpt-4o-mini"),
        )
    } else if let Ok(base_url) = env::var("WAYFINDER_LLM_BASE_URL") {
        OpenAiCompatModel::new(
            http,
            "custom",
            base_url.trim_end_matches('/').to_string(),
            env::var("WAYFINDER_LLM_API_KEY").unwrap_or_default(),
            model("openai/gpt-oss-20b"),
        )
    } else {
        anyhow::bail!(
            "no chat provider configured; set HF_TOKEN, GROQ_API_KEY, OPENAI_API_KEY, \
             or WAYFINDER_LLM_BASE_URL"
        );
    };

    info!(provider = %picked.provider, model = %picked.model, "chat provider selected");
    Ok(picked)
}
