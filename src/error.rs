//! Error types for repo-digest operations.
//!
//! Defines one error enum per subsystem:
//! - Remote fetches (retry/backoff primitive)
//! - Shared key-value store access
//! - Repository listing and checkout
//! - Enqueueing and scheduling
//! - Artifact assembly and persistence
//! - Content generation
//! - Configuration loading

use thiserror::Error;

/// Errors that can occur while fetching remote content.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Every attempt failed; the last failure is kept for context.
    #[error("Fetch of '{target}' failed after {attempts} attempts: {last_error}")]
    FetchExhausted {
        target: String,
        attempts: u32,
        last_error: String,
    },

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("HTTP {status} from '{target}'")]
    HttpStatus { target: String, status: u16 },

    #[error("Failed to decode response from '{target}': {reason}")]
    Decode { target: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while talking to the shared store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Redis operation failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt record at key '{key}': {reason}")]
    CorruptRecord { key: String, reason: String },
}

/// Errors that can occur while walking or mirroring a remote repository.
#[derive(Debug, Error)]
pub enum ListError {
    #[error("Listing '{path}' failed: {source}")]
    Remote {
        path: String,
        #[source]
        source: FetchError,
    },

    #[error("Traversal exceeded maximum depth {max_depth} at '{path}'")]
    DepthExceeded { path: String, max_depth: usize },

    #[error("Traversal exceeded maximum of {max_nodes} entries")]
    TooManyNodes { max_nodes: usize },

    #[error("Unsafe path in listing: '{0}'")]
    UnsafePath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort an enqueue call.
#[derive(Debug, Error)]
pub enum EnqueueError {
    #[error("Repository listing failed: {0}")]
    Listing(#[from] ListError),

    #[error("Fingerprint lookup for '{path}' failed: {source}")]
    Fingerprint {
        path: String,
        #[source]
        source: FetchError,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors surfaced by a scheduling pass.
///
/// Per-job failures are never reported here; they are recorded on the job.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Unauthorized trigger")]
    Unauthorized,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Job {0} not found")]
    JobNotFound(String),

    #[error("Group finalization failed: {0}")]
    Artifact(#[from] ArtifactError),
}

/// Errors raised by the content-generation collaborator.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation request failed: {0}")]
    RequestFailed(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Rate limited by provider: {0}")]
    RateLimited(String),

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Empty response from model")]
    EmptyResponse,

    #[error("Rate limiter error: {0}")]
    RateLimiter(#[from] StoreError),
}

/// Errors that can occur while finalizing a group.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Metadata fetch failed: {0}")]
    Metadata(#[from] FetchError),

    #[error("Completed job {job_id} has no result")]
    MissingResult { job_id: String },

    #[error("Artifact write failed for '{name}': {reason}")]
    WriteFailed { name: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

impl FetchError {
    /// Builds the terminal error once the retry loop gives up.
    pub fn exhausted(target: impl Into<String>, attempts: u32, last: &FetchError) -> Self {
        FetchError::FetchExhausted {
            target: target.into(),
            attempts,
            last_error: last.to_string(),
        }
    }
}
