//! HTTP client for hosted language models.
//!
//! Supports the `OpenAI` chat completions API and the Anthropic messages API.
//! API keys come from the environment only.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Value};

use crate::config::{LlmConfig, LlmProvider};
use crate::enrichment::{ChatMessage, ChatModel, Role};
use crate::error::{LlmErrorKind, QuotientError, Result};

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_SYSTEM: &str = "You are a helpful AI tutor.";

/// A [`ChatModel`] backed by a hosted provider.
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    provider: LlmProvider,
    model: String,
    api_key: String,
    endpoint: String,
    max_tokens: u32,
    temperature: f32,
}

impl LlmClient {
    /// Builds a client reading the provider's API key from the environment.
    ///
    /// # Errors
    ///
    /// Returns `QuotientError::LlmNotConfigured` for the offline provider or
    /// when the key variable is unset or blank.
    pub fn from_env(config: &LlmConfig) -> Result<Self> {
        let Some(env_var) = config.provider.api_key_env() else {
            return Err(QuotientError::llm_not_configured(
                config.provider.as_str(),
                "OPENAI_API_KEY or ANTHROPIC_API_KEY",
            ));
        };
        let api_key = std::env::var(env_var)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| QuotientError::llm_not_configured(config.provider.as_str(), env_var))?;
        Self::new(config, api_key)
    }

    /// Builds a client with an explicit key.
    pub fn new(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let endpoint = match config.provider {
            LlmProvider::OpenAi => OPENAI_URL,
            LlmProvider::Anthropic => ANTHROPIC_URL,
            LlmProvider::Offline => {
                return Err(QuotientError::llm_not_configured(
                    "offline",
                    "OPENAI_API_KEY or ANTHROPIC_API_KEY",
                ))
            }
        };
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| QuotientError::llm_api_error(LlmErrorKind::Other, e.to_string()))?;

        tracing::info!(
            provider = %config.provider,
            model = config.model_name(),
            timeout_secs = config.request_timeout_secs,
            "Language model client ready"
        );

        Ok(Self {
            http,
            provider: config.provider,
            model: config.model_name().to_string(),
            api_key: api_key.into(),
            endpoint: endpoint.to_string(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// Points the client at a different base URL, e.g. a proxy or a test server.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Provider in use.
    pub const fn provider(&self) -> LlmProvider {
        self.provider
    }

    fn request_body(&self, messages: &[ChatMessage]) -> Value {
        match self.provider {
            LlmProvider::Anthropic => anthropic_body(&self.model, self.max_tokens, messages),
            _ => openai_body(&self.model, self.max_tokens, self.temperature, messages),
        }
    }

    async fn send(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = self.http.post(&self.endpoint).json(&self.request_body(messages));
        let request = match self.provider {
            LlmProvider::Anthropic => request
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            _ => request.bearer_auth(&self.api_key),
        };

        let response = request.send().await.map_err(classify_transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(QuotientError::llm_api_error(
                LlmErrorKind::from_status(status.as_u16()),
                format!("{} returned {status}: {}", self.provider, truncate(&detail, 200)),
            ));
        }

        let body: Value = response.json().await.map_err(|e| {
            QuotientError::llm_api_error(LlmErrorKind::MalformedResponse, e.to_string())
        })?;
        let text = match self.provider {
            LlmProvider::Anthropic => anthropic_text(&body),
            _ => openai_text(&body),
        }?;
        tracing::debug!(provider = %self.provider, chars = text.len(), "Model replied");
        Ok(text)
    }
}

impl ChatModel for LlmClient {
    fn name(&self) -> &str {
        &self.model
    }

    fn complete<'a>(&'a self, messages: &'a [ChatMessage]) -> BoxFuture<'a, Result<String>> {
        self.send(messages).boxed()
    }
}

fn classify_transport_error(e: reqwest::Error) -> QuotientError {
    let kind = if e.is_timeout() {
        LlmErrorKind::Timeout
    } else if e.is_connect() || e.is_request() {
        LlmErrorKind::Network
    } else {
        LlmErrorKind::Other
    };
    QuotientError::llm_api_error(kind, e.to_string())
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Request body for the `OpenAI` chat completions API.
pub fn openai_body(model: &str, max_tokens: u32, temperature: f32, messages: &[ChatMessage]) -> Value {
    json!({
        "model": model,
        "messages": messages,
        "max_tokens": max_tokens,
        "temperature": temperature,
    })
}

/// Request body for the Anthropic messages API. The system message moves to
/// the top-level `system` field.
pub fn anthropic_body(model: &str, max_tokens: u32, messages: &[ChatMessage]) -> Value {
    let system = messages
        .iter()
        .find(|m| m.role == Role::System)
        .map_or(DEFAULT_SYSTEM, |m| m.content.as_str());
    let turns: Vec<Value> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| json!({ "role": m.role, "content": m.content }))
        .collect();
    json!({
        "model": model,
        "max_tokens": max_tokens,
        "system": system,
        "messages": turns,
    })
}

/// Extracts the reply from an `OpenAI` response body.
pub fn openai_text(body: &Value) -> Result<String> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| {
            QuotientError::llm_api_error(
                LlmErrorKind::MalformedResponse,
                "response has no choices[0].message.content",
            )
        })
}

/// Extracts the reply from an Anthropic response body.
pub fn anthropic_text(body: &Value) -> Result<String> {
    body.pointer("/content/0/text")
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| {
            QuotientError::llm_api_error(
                LlmErrorKind::MalformedResponse,
                "response has no content[0].text",
            )
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn messages() -> Vec<ChatMessage> {
        vec![
            ChatMessage::system("Be brief."),
            ChatMessage::user("What is 1/2 + 1/4?"),
        ]
    }

    #[test]
    fn test_openai_body_shape() {
        let body = openai_body("gpt-4o-mini", 500, 0.7, &messages());
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 500);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "What is 1/2 + 1/4?");
    }

    #[test]
    fn test_anthropic_body_moves_system_message() {
        let body = anthropic_body("claude-3-haiku-20240307", 500, &messages());
        assert_eq!(body["system"], "Be brief.");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn test_anthropic_body_default_system() {
        let body = anthropic_body("m", 10, &[ChatMessage::user("hi")]);
        assert_eq!(body["system"], DEFAULT_SYSTEM);
    }

    #[test]
    fn test_openai_text() {
        let body = json!({"choices": [{"message": {"role": "assistant", "content": "3/4"}}]});
        assert_eq!(openai_text(&body).unwrap(), "3/4");
        let err = openai_text(&json!({"choices": []})).unwrap_err();
        assert!(matches!(
            err,
            QuotientError::LlmApiError {
                kind: LlmErrorKind::MalformedResponse,
                ..
            }
        ));
    }

    #[test]
    fn test_anthropic_text() {
        let body = json!({"content": [{"type": "text", "text": "Half plus a quarter."}]});
        assert_eq!(anthropic_text(&body).unwrap(), "Half plus a quarter.");
        assert!(anthropic_text(&json!({})).is_err());
    }

    #[test]
    fn test_offline_provider_has_no_client() {
        let config = LlmConfig {
            provider: LlmProvider::Offline,
            ..LlmConfig::default()
        };
        let err = LlmClient::from_env(&config).unwrap_err();
        assert!(matches!(err, QuotientError::LlmNotConfigured { .. }));
        assert!(LlmClient::new(&config, "key").is_err());
    }

    #[test]
    fn test_new_uses_provider_defaults() {
        let config = LlmConfig {
            provider: LlmProvider::Anthropic,
            ..LlmConfig::default()
        };
        let client = LlmClient::new(&config, "key").unwrap();
        assert_eq!(client.name(), "claude-3-haiku-20240307");
        assert_eq!(client.provider(), LlmProvider::Anthropic);
        assert_eq!(client.endpoint, ANTHROPIC_URL);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("½½½", 2), "½½");
        assert_eq!(truncate("ab", 5), "ab");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let client = LlmClient::new(&LlmConfig::default(), "key")
            .unwrap()
            .with_endpoint("http://127.0.0.1:9/v1/chat/completions");
        let err = client.complete(&messages()).await.unwrap_err();
        assert!(matches!(err, QuotientError::LlmApiError { .. }));
    }
}
