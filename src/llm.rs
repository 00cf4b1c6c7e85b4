//! Language model abstraction and implementations.
//!
//! The answer synthesizer only needs a stateless single-turn call:
//! `generate(prompt, temperature) -> text`. Implementations:
//! - **[`DisabledModel`]**: always errors.
//! - **[`OpenAIChatModel`]**: `POST /v1/chat/completions`.
//! - **[`OllamaModel`]**: `POST /api/generate` with streaming off.

use async_trait::async_trait;
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::{RagError, Result};
use crate::http;

const OPENAI_DEFAULT_MODEL: &str = "gpt-3.5-turbo";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// A stateless text generator.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Returns the model identifier (e.g. `"gpt-3.5-turbo"`).
    fn model_name(&self) -> &str;

    /// Generate a completion for `prompt`. `temperature = 0.0` requests
    /// deterministic decoding.
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String>;
}

/// Model used when `llm.provider = "disabled"`.
pub struct DisabledModel;

#[async_trait]
impl LanguageModel for DisabledModel {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &str, _temperature: f32) -> Result<String> {
        Err(RagError::language_model(
            "disabled",
            "Language model is disabled. Set [llm] provider in config.",
        ))
    }
}

/// OpenAI chat-completions model. Requires `OPENAI_API_KEY`.
pub struct OpenAIChatModel {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_retries: u32,
}

impl OpenAIChatModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                RagError::Configuration("OPENAI_API_KEY environment variable not set".to_string())
            })?;

        let client = http::client(config.timeout_secs)
            .map_err(|e| RagError::language_model("openai", e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string()),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAIChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String> {
        debug!(provider = "openai", model = %self.model, prompt_len = prompt.len(), "generating");

        let body = serde_json::json!({
            "model": self.model,
            "temperature": temperature,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let json = http::post_json(
            &self.client,
            &url,
            Some(&self.api_key),
            &body,
            self.max_retries,
        )
        .await
        .map_err(|e| RagError::language_model("openai", e))?;

        parse_chat_response(&json)
    }
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            RagError::language_model("openai", "invalid response: missing choices[0].message.content")
        })
}

/// Model served by a local Ollama instance.
pub struct OllamaModel {
    client: reqwest::Client,
    url: String,
    model: String,
    max_retries: u32,
}

impl OllamaModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let model = config.model.clone().ok_or_else(|| {
            RagError::Configuration("llm.model required for Ollama provider".to_string())
        })?;
        let client = http::client(config.timeout_secs)
            .map_err(|e| RagError::language_model("ollama", e.to_string()))?;

        Ok(Self {
            client,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OLLAMA_BASE_URL.to_string()),
            model,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String> {
        debug!(provider = "ollama", model = %self.model, prompt_len = prompt.len(), "generating");

        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": temperature },
        });

        let url = format!("{}/api/generate", self.url.trim_end_matches('/'));
        let json = http::post_json(&self.client, &url, None, &body, self.max_retries)
            .await
            .map_err(|e| RagError::language_model("ollama", e))?;

        json.get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| RagError::language_model("ollama", "invalid response: missing response"))
    }
}

/// Create the configured [`LanguageModel`].
///
/// # Errors
///
/// Returns [`RagError::Configuration`] for unknown providers, a missing
/// model name, or a missing `OPENAI_API_KEY`.
pub fn create_model(config: &LlmConfig) -> Result<Box<dyn LanguageModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledModel)),
        "openai" => Ok(Box::new(OpenAIChatModel::new(config)?)),
        "ollama" => Ok(Box::new(OllamaModel::new(config)?)),
        other => Err(RagError::Configuration(format!(
            "Unknown llm provider: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_response() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "15 days." } }]
        });
        assert_eq!(parse_chat_response(&json).unwrap(), "15 days.");
    }

    #[test]
    fn test_parse_chat_response_missing_content() {
        let err = parse_chat_response(&serde_json::json!({ "choices": [] })).unwrap_err();
        assert!(matches!(err, RagError::LanguageModel { .. }));
    }

    #[test]
    fn test_ollama_requires_model() {
        let config = LlmConfig {
            provider: "ollama".to_string(),
            ..LlmConfig::default()
        };
        assert!(matches!(
            create_model(&config),
            Err(RagError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_disabled_model_errors() {
        let err = DisabledModel.generate("hi", 0.0).await.unwrap_err();
        assert!(matches!(err, RagError::LanguageModel { .. }));
    }
}
