//! OpenAI-compatible chat-completions client.
//!
//! Talks to any endpoint exposing `POST {api_base}/chat/completions`
//! (OpenRouter by default).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::AppConfig;
use crate::error::GenerationError;

/// A message in a conversation with an LLM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender ("system", "user", "assistant").
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Request for a chat completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model identifier; empty means the client's default model.
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Response to a chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    /// Model that actually served the request.
    pub model: String,
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Usage,
}

impl ChatResponse {
    /// Content of the first choice, if any.
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Token usage statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Anything that can answer a chat completion request.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, GenerationError>;
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// HTTP client for an OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct ChatClient {
    http_client: Client,
    api_base: String,
    api_key: Option<String>,
    default_model: String,
}

impl ChatClient {
    pub fn new(
        api_base: impl Into<String>,
        api_key: Option<String>,
        default_model: impl Into<String>,
    ) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            http_client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
            default_model: default_model.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.generation_api_base,
            config.generation_api_key.clone(),
            &config.generation_model,
        )
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl ChatProvider for ChatClient {
    async fn complete(&self, mut request: ChatRequest) -> Result<ChatResponse, GenerationError> {
        if request.model.is_empty() {
            request.model = self.default_model.clone();
        }

        let url = format!("{}/chat/completions", self.api_base);
        let mut http_request = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("X-Title", "repo-digest");

        if let Some(ref api_key) = self.api_key {
            http_request = http_request.header("Authorization", format!("Bearer {}", api_key));
        }

        let http_response = http_request
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::RequestFailed(e.to_string()))?;

        let status = http_response.status();
        if !status.is_success() {
            let code = status.as_u16();
            let body = http_response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(classify_error(code, &body));
        }

        http_response
            .json::<ChatResponse>()
            .await
            .map_err(|e| GenerationError::ParseError(e.to_string()))
    }
}

/// Maps a non-success response to an error, preferring the structured message.
fn classify_error(code: u16, body: &str) -> GenerationError {
    let message = serde_json::from_str::<ApiErrorResponse>(body)
        .map(|r| r.error.message)
        .unwrap_or_else(|_| body.to_string());

    if code == 429 {
        GenerationError::RateLimited(message)
    } else {
        GenerationError::ApiError { code, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization_skips_unset_options() {
        let request = ChatRequest::new("m", vec![Message::system("s"), Message::user("u")]);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert!(json.get("temperature").is_none());

        let json = serde_json::to_value(request.with_temperature(0.2).with_max_tokens(64)).unwrap();
        assert_eq!(json["max_tokens"], 64);
    }

    #[test]
    fn test_response_parses_without_usage() {
        let raw = r#"{
            "id": "gen-1",
            "model": "openai/gpt-4o-mini",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "hi"}}]
        }"#;
        let response: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.first_content(), Some("hi"));
        assert_eq!(response.usage.total_tokens, 0);
    }

    #[test]
    fn test_classify_error() {
        let err = classify_error(429, r#"{"error": {"message": "slow down"}}"#);
        assert!(matches!(err, GenerationError::RateLimited(ref m) if m == "slow down"));

        let err = classify_error(502, "bad gateway");
        assert!(matches!(err, GenerationError::ApiError { code: 502, ref message } if message == "bad gateway"));
    }

    #[test]
    fn test_client_trims_base() {
        let client = ChatClient::new("https://openrouter.ai/api/v1/", None, "m");
        assert_eq!(client.api_base(), "https://openrouter.ai/api/v1");
        assert_eq!(client.default_model(), "m");
        assert!(!client.has_api_key());
    }
}
