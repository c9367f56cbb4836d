//! Content generation for individual files.
//!
//! The scheduler invokes a [`ContentGenerator`] once per job. The default
//! implementation summarizes the file through an OpenAI-compatible
//! chat-completions endpoint, optionally spaced by a [`RateLimitedGenerator`]
//! whose last-call timestamp lives in the shared store.
//!
//! ```ignore
//! use repo_digest::llm::{ChatClient, FileSummarizer};
//!
//! let summarizer = FileSummarizer::new(ChatClient::from_config(&config), &config.generation_model);
//! let result = summarizer.generate("src/lib.rs", &content).await?;
//! ```

pub mod client;
pub mod generator;

pub use client::{ChatClient, ChatProvider, ChatRequest, ChatResponse, Choice, Message, Usage};
pub use generator::{ContentGenerator, FileSummarizer, RateLimitedGenerator, MAX_CONTENT_CHARS};
