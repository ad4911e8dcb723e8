//! Text-generation providers.
//!
//! A [`Generator`] turns a fully built prompt into model text. Prompt
//! construction lives in `study_rag_core::prompt`; providers only move
//! bytes. All failures surface as [`RagError::GenerationUnavailable`].
//!
//! | Config Value | Provider | Endpoint |
//! |--------------|----------|----------|
//! | `"disabled"` | [`DisabledGenerator`] | none |
//! | `"openai"` | [`OpenAIGenerator`] | `POST /v1/chat/completions` |
//! | `"gemini"` | [`GeminiGenerator`] | `POST /v1beta/models/{model}:generateContent` |
//! | `"ollama"` | [`OllamaGenerator`] | `POST /api/generate` |

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use study_rag_core::RagError;

use crate::backend::{self, BackendFailure, JsonRequest};
use crate::config::GenerationConfig;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.1";

/// A prompt → text backend.
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> study_rag_core::Result<String>;
}

fn unavailable(e: BackendFailure) -> RagError {
    RagError::GenerationUnavailable(e.0)
}

fn invalid(label: &str, what: &str) -> RagError {
    RagError::GenerationUnavailable(format!("Invalid {label} response: {what}"))
}

/// Settings every HTTP generator shares.
struct Http {
    client: reqwest::Client,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
}

impl Http {
    fn new(config: &GenerationConfig, default_model: &str) -> Result<Self> {
        Ok(Self {
            client: backend::build_client(config.timeout_secs)
                .map_err(|e| anyhow::anyhow!(e.0))?,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| default_model.to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
        })
    }

    async fn post(
        &self,
        label: &str,
        url: String,
        bearer: Option<&str>,
        header: Option<(&str, &str)>,
        body: &Value,
    ) -> study_rag_core::Result<Value> {
        backend::post_json(
            &self.client,
            JsonRequest {
                label,
                url,
                bearer,
                header,
                body,
                max_retries: self.max_retries,
                base_delay: Duration::from_secs(1),
            },
        )
        .await
        .map_err(unavailable)
    }
}

// ============ Disabled ============

/// Always fails; used when no generation backend is configured.
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &str) -> study_rag_core::Result<String> {
        Err(RagError::GenerationUnavailable(
            "generation provider is disabled".to_string(),
        ))
    }
}

// ============ OpenAI ============

/// Chat completions against the OpenAI API. Requires `OPENAI_API_KEY`.
pub struct OpenAIGenerator {
    http: Http,
    api_key: String,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = backend::api_key("OPENAI_API_KEY").map_err(|e| anyhow::anyhow!(e.0))?;
        Ok(Self {
            http: Http::new(config, DEFAULT_OPENAI_MODEL)?,
            api_key,
        })
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.http.model
    }

    async fn generate(&self, prompt: &str) -> study_rag_core::Result<String> {
        let body = serde_json::json!({
            "model": self.http.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": self.http.temperature,
            "max_tokens": self.http.max_tokens,
        });
        let json = self
            .http
            .post(
                "OpenAI",
                OPENAI_CHAT_URL.to_string(),
                Some(&self.api_key),
                None,
                &body,
            )
            .await?;
        parse_openai_reply(&json)
    }
}

fn parse_openai_reply(json: &Value) -> study_rag_core::Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| invalid("OpenAI", "missing choices[0].message.content"))
}

// ============ Gemini ============

/// Google Gemini `generateContent`. Requires `GOOGLE_API_KEY`.
pub struct GeminiGenerator {
    http: Http,
    api_key: String,
    base_url: String,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = backend::api_key("GOOGLE_API_KEY").map_err(|e| anyhow::anyhow!(e.0))?;
        Ok(Self {
            http: Http::new(config, DEFAULT_GEMINI_MODEL)?,
            api_key,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
        })
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.http.model
    }

    async fn generate(&self, prompt: &str) -> study_rag_core::Result<String> {
        let body = serde_json::json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": {
                "temperature": self.http.temperature,
                "maxOutputTokens": self.http.max_tokens,
            },
        });
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.http.model
        );
        let json = self
            .http
            .post(
                "Gemini",
                url,
                None,
                Some(("x-goog-api-key", self.api_key.as_str())),
                &body,
            )
            .await?;
        parse_gemini_reply(&json)
    }
}

/// Concatenate the text parts of the first candidate.
fn parse_gemini_reply(json: &Value) -> study_rag_core::Result<String> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| invalid("Gemini", "missing candidates[0].content.parts"))?;
    Ok(parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join(""))
}

// ============ Ollama ============

/// Non-streaming `/api/generate` on a local Ollama instance.
pub struct OllamaGenerator {
    http: Http,
    url: String,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            http: Http::new(config, DEFAULT_OLLAMA_MODEL)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.http.model
    }

    async fn generate(&self, prompt: &str) -> study_rag_core::Result<String> {
        let body = serde_json::json!({
            "model": self.http.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": self.http.temperature,
                "num_predict": self.http.max_tokens,
            },
        });
        let url = format!("{}/api/generate", self.url.trim_end_matches('/'));
        let json = self.http.post("Ollama", url, None, None, &body).await?;
        json.get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| invalid("Ollama", "missing response"))
    }
}

/// Create the configured [`Generator`].
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "gemini" => Ok(Arc::new(GeminiGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_generator_is_unavailable() {
        let g = create_generator(&GenerationConfig::default()).unwrap();
        assert_eq!(g.model_name(), "disabled");
        let err = g.generate("hi").await.unwrap_err();
        assert_eq!(err.kind(), "generation_unavailable");
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config = GenerationConfig {
            provider: "together".into(),
            ..GenerationConfig::default()
        };
        assert!(create_generator(&config).is_err());
    }

    #[test]
    fn test_parse_openai_reply() {
        let json = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "Paris."}}]
        });
        assert_eq!(parse_openai_reply(&json).unwrap(), "Paris.");
        assert!(parse_openai_reply(&serde_json::json!({"choices": []})).is_err());
    }

    #[test]
    fn test_parse_gemini_reply_joins_parts() {
        let json = serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "Paris "}, {"text": "is the capital."}]}}]
        });
        assert_eq!(parse_gemini_reply(&json).unwrap(), "Paris is the capital.");
        let err = parse_gemini_reply(&serde_json::json!({"promptFeedback": {}})).unwrap_err();
        assert!(matches!(err, RagError::GenerationUnavailable(_)));
    }

    #[tokio::test]
    async fn test_gemini_error_does_not_expose_api_key() {
        let config = GenerationConfig {
            provider: "gemini".into(),
            max_retries: 0,
            timeout_secs: 1,
            ..GenerationConfig::default()
        };
        let g = GeminiGenerator {
            http: Http::new(&config, DEFAULT_GEMINI_MODEL).unwrap(),
            api_key: "SECRET-KEY-123".to_string(),
            base_url: "http://127.0.0.1:9".to_string(),
        };
        let err = g.generate("hi").await.unwrap_err();
        assert_eq!(err.kind(), "generation_unavailable");
        let message = err.to_string();
        assert!(message.contains("Gemini connection error"), "{message}");
        assert!(!message.contains("SECRET-KEY-123"), "{message}");
        assert!(!message.contains("key="), "{message}");
    }

    #[tokio::test]
    async fn test_unreachable_ollama_is_generation_unavailable() {
        let config = GenerationConfig {
            provider: "ollama".into(),
            max_retries: 0,
            timeout_secs: 1,
            url: Some("http://127.0.0.1:9".into()),
            ..GenerationConfig::default()
        };
        let g = create_generator(&config).unwrap();
        assert_eq!(g.model_name(), DEFAULT_OLLAMA_MODEL);
        assert!(matches!(
            g.generate("hi").await,
            Err(RagError::GenerationUnavailable(_))
        ));
    }
}
