//! Language-model provider abstraction.
//!
//! The query engine depends only on [`LanguageModel::complete`]: one prompt
//! in, the model's raw text out. Providers:
//! - **[`DisabledModel`]**: always fails; used when `llm.provider = "disabled"`.
//! - **[`OpenAIChat`]**: `POST /v1/chat/completions`.
//! - **[`OllamaChat`]**: `POST /api/chat` on a local Ollama instance.
//!
//! Requests are bounded by `llm.timeout_secs` and never retried here.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

/// A text-completion capability.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &str;
    /// Model identifier.
    fn model(&self) -> &str;
    /// Complete a single prompt and return the unprocessed output text.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

pub struct DisabledModel;

#[async_trait]
impl LanguageModel for DisabledModel {
    fn name(&self) -> &str {
        "disabled"
    }
    fn model(&self) -> &str {
        "disabled"
    }
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Err(Error::query_engine("Language model provider is disabled"))
    }
}

// ============ OpenAI ============

/// Chat-completions client. Requires `OPENAI_API_KEY`.
pub struct OpenAIChat {
    model: String,
    temperature: Option<f32>,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::Config("OPENAI_API_KEY environment variable not set".into()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAIChat {
    fn name(&self) -> &str {
        "openai"
    }
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
        });
        if let Some(t) = self.temperature {
            body["temperature"] = serde_json::json!(t);
        }

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::query_engine(format!(
                "OpenAI API error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response.json().await?;
        json.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::query_engine("Invalid OpenAI response: missing message content"))
    }
}

// ============ Ollama ============

pub struct OllamaChat {
    model: String,
    temperature: Option<f32>,
    url: String,
    client: reqwest::Client,
}

impl OllamaChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            client,
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaChat {
    fn name(&self) -> &str {
        "ollama"
    }
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "stream": false,
        });
        if let Some(t) = self.temperature {
            body["options"] = serde_json::json!({ "temperature": t });
        }

        let response = self
            .client
            .post(format!("{}/api/chat", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                Error::query_engine(format!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url, e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::query_engine(format!(
                "Ollama API error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response.json().await?;
        json.pointer("/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::query_engine("Invalid Ollama response: missing message content"))
    }
}

/// Create the configured [`LanguageModel`].
pub fn create_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledModel)),
        "openai" => Ok(Arc::new(OpenAIChat::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaChat::new(config)?)),
        other => Err(Error::Config(format!("Unknown llm provider: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_model_fails_with_query_error() {
        let err = DisabledModel.complete("prompt").await.unwrap_err();
        assert!(matches!(err, Error::QueryEngine(_)));
    }

    #[test]
    fn create_model_rejects_unknown_provider() {
        let cfg = LlmConfig {
            provider: "mystery".to_string(),
            ..LlmConfig::default()
        };
        assert!(matches!(create_model(&cfg), Err(Error::Config(_))));
    }

    #[test]
    fn ollama_model_uses_default_url() {
        let cfg = LlmConfig {
            provider: "ollama".to_string(),
            model: "llama3".to_string(),
            ..LlmConfig::default()
        };
        let model = OllamaChat::new(&cfg).unwrap();
        assert_eq!(model.url, "http://localhost:11434");
        assert_eq!(model.model(), "llama3");
    }
}
