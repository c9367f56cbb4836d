//! Per-file content generation.
//!
//! The scheduler only knows [`ContentGenerator`]; what the result payload
//! contains is opaque to it.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::client::{ChatProvider, ChatRequest, Message};
use crate::error::GenerationError;
use crate::storage::SharedRateLimiter;

/// Longest file excerpt sent to the model, in characters.
pub const MAX_CONTENT_CHARS: usize = 24_000;

const SYSTEM_PROMPT: &str = "You document source repositories. Given one file, \
reply with a concise technical summary: its purpose, the main types or \
functions it defines, and how it relates to the rest of the project. \
Reply in plain text.";

/// Turns one file into an analysis result.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, path: &str, content: &str) -> Result<Value, GenerationError>;
}

/// Summarizes a file through a chat model.
pub struct FileSummarizer<P> {
    provider: P,
    model: String,
    max_tokens: u32,
}

impl<P: ChatProvider> FileSummarizer<P> {
    pub fn new(provider: P, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens: 800,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
impl<P: ChatProvider> ContentGenerator for FileSummarizer<P> {
    async fn generate(&self, path: &str, content: &str) -> Result<Value, GenerationError> {
        let (excerpt, truncated) = truncate_chars(content, MAX_CONTENT_CHARS);
        let request = ChatRequest::new(
            self.model.clone(),
            vec![
                Message::system(SYSTEM_PROMPT),
                Message::user(format!("File: {}\n\n{}", path, excerpt)),
            ],
        )
        .with_temperature(0.2)
        .with_max_tokens(self.max_tokens);

        let response = self.provider.complete(request).await?;
        let summary = response
            .first_content()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(GenerationError::EmptyResponse)?;

        debug!(path = %path, model = %response.model, tokens = response.usage.total_tokens, "Generated summary");

        Ok(json!({
            "path": path,
            "summary": summary,
            "model": response.model,
            "truncated": truncated,
            "tokens": response.usage.total_tokens,
        }))
    }
}

/// Spaces calls to an inner generator using a limiter shared through the store.
pub struct RateLimitedGenerator {
    inner: Arc<dyn ContentGenerator>,
    limiter: SharedRateLimiter,
}

impl RateLimitedGenerator {
    pub fn new(inner: Arc<dyn ContentGenerator>, limiter: SharedRateLimiter) -> Self {
        Self { inner, limiter }
    }
}

#[async_trait]
impl ContentGenerator for RateLimitedGenerator {
    async fn generate(&self, path: &str, content: &str) -> Result<Value, GenerationError> {
        self.limiter.acquire().await?;
        self.inner.generate(path, content).await
    }
}

/// Cuts `text` to at most `max` characters on a char boundary.
fn truncate_chars(text: &str, max: usize) -> (&str, bool) {
    match text.char_indices().nth(max) {
        Some((idx, _)) => (&text[..idx], true),
        None => (text, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::{ChatResponse, Choice, Usage};
    use crate::storage::{KvStore, MemoryStore};
    use std::sync::Mutex;
    use std::time::Duration;

    struct MockChat {
        reply: String,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl MockChat {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatProvider for MockChat {
        async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, GenerationError> {
            self.requests.lock().expect("lock poisoned").push(request);
            Ok(ChatResponse {
                id: "gen-1".to_string(),
                model: "mock-model".to_string(),
                choices: vec![Choice {
                    index: 0,
                    message: Message {
                        role: "assistant".to_string(),
                        content: self.reply.clone(),
                    },
                    finish_reason: Some("stop".to_string()),
                }],
                usage: Usage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                },
            })
        }
    }

    #[tokio::test]
    async fn test_summarizer_builds_result() {
        let summarizer = FileSummarizer::new(MockChat::new("  Entry point.  "), "m");
        let result = summarizer.generate("src/main.rs", "fn main() {}").await.unwrap();

        assert_eq!(result["path"], "src/main.rs");
        assert_eq!(result["summary"], "Entry point.");
        assert_eq!(result["model"], "mock-model");
        assert_eq!(result["truncated"], false);

        let requests = summarizer.provider.requests.lock().unwrap();
        assert_eq!(requests[0].model, "m");
        assert!(requests[0].messages[1].content.contains("fn main() {}"));
    }

    #[tokio::test]
    async fn test_summarizer_rejects_blank_reply() {
        let summarizer = FileSummarizer::new(MockChat::new("   "), "m");
        let err = summarizer.generate("a.js", "x").await.unwrap_err();
        assert!(matches!(err, GenerationError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_long_content_is_truncated() {
        let summarizer = FileSummarizer::new(MockChat::new("ok"), "m");
        let content = "é".repeat(MAX_CONTENT_CHARS + 10);
        let result = summarizer.generate("big.txt", &content).await.unwrap();
        assert_eq!(result["truncated"], true);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), ("hello", false));
        assert_eq!(truncate_chars("héllo", 2), ("hé", true));
    }

    #[tokio::test]
    async fn test_rate_limited_generator_records_call() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let limiter =
            SharedRateLimiter::new(store.clone(), "digest:ratelimit:gen", Duration::from_millis(1));
        let inner: Arc<dyn ContentGenerator> =
            Arc::new(FileSummarizer::new(MockChat::new("ok"), "m"));
        let generator = RateLimitedGenerator::new(inner, limiter);

        generator.generate("a.js", "x").await.unwrap();
        assert!(store.get("digest:ratelimit:gen").await.unwrap().is_some());
    }
}
