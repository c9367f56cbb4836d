//! Runtime configuration.
//!
//! Every scheduling pass is a short-lived invocation, so configuration is
//! resolved once per process from defaults, the environment and CLI flags,
//! then passed by value into the components that need it.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::github::GITHUB_API_BASE;

/// Tunables for retrying remote fetches.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay unit; the wait after attempt `n` is `base_delay * 2^n`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Backoff applied after the given failed attempt (counted from 1).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor)
    }
}

/// Guards against pathological repository trees.
#[derive(Debug, Clone, PartialEq)]
pub struct TraversalLimits {
    /// Maximum directory nesting below the starting path.
    pub max_depth: usize,
    /// Maximum number of entries (files and directories) visited.
    pub max_nodes: usize,
}

impl Default for TraversalLimits {
    fn default() -> Self {
        Self {
            max_depth: 32,
            max_nodes: 20_000,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Store settings
    /// Redis connection URL.
    pub redis_url: String,
    /// Prefix applied to every key written to the store.
    pub key_prefix: String,

    // Provider settings
    /// Base URL of the repository provider REST API.
    pub github_api_base: String,
    /// Bearer token for the repository provider.
    pub github_token: Option<String>,
    /// Git ref listed and fingerprinted by the enqueuer.
    pub git_ref: String,
    pub retry: RetryPolicy,
    pub traversal: TraversalLimits,

    // Scheduling settings
    /// Age after which an in-progress job is presumed abandoned.
    pub stale_after: Duration,
    /// Maximum job executions started by one pass.
    pub batch_size: usize,
    /// Shared secret expected from the periodic trigger.
    pub trigger_secret: Option<String>,

    // Generation settings
    /// OpenAI-compatible API base for the content generator.
    pub generation_api_base: String,
    pub generation_api_key: Option<String>,
    pub generation_model: String,
    /// Minimum spacing between generation calls across all invocations.
    pub generation_min_interval: Duration,

    // Output settings
    /// Directory where finalized artifacts are written.
    pub artifact_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "digest".to_string(),

            github_api_base: GITHUB_API_BASE.to_string(),
            github_token: None,
            git_ref: "HEAD".to_string(),
            retry: RetryPolicy::default(),
            traversal: TraversalLimits::default(),

            stale_after: Duration::from_secs(6 * 60),
            batch_size: 50,
            trigger_secret: None,

            generation_api_base: "https://openrouter.ai/api/v1".to_string(),
            generation_api_key: None,
            generation_model: "openai/gpt-4o-mini".to_string(),
            generation_min_interval: Duration::ZERO,

            artifact_dir: PathBuf::from("./artifacts"),
        }
    }
}

impl AppConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `REDIS_URL`: Redis connection URL (default: redis://localhost:6379)
    /// - `DIGEST_KEY_PREFIX`: store key prefix (default: digest)
    /// - `GITHUB_API_BASE`: provider API base (default: https://api.github.com)
    /// - `GITHUB_TOKEN`: provider bearer token
    /// - `DIGEST_GIT_REF`: ref to list (default: HEAD)
    /// - `DIGEST_RETRY_MAX_ATTEMPTS`: fetch attempts (default: 5)
    /// - `DIGEST_RETRY_BASE_DELAY_MS`: backoff unit in ms (default: 1000)
    /// - `DIGEST_MAX_DEPTH`: traversal depth guard (default: 32)
    /// - `DIGEST_MAX_NODES`: traversal node guard (default: 20000)
    /// - `DIGEST_STALE_AFTER_SECS`: staleness threshold (default: 360)
    /// - `DIGEST_BATCH_SIZE`: jobs per pass (default: 50)
    /// - `TRIGGER_SECRET`: shared secret for the periodic trigger
    /// - `DIGEST_GENERATION_API_BASE`, `DIGEST_GENERATION_MODEL`
    /// - `OPENROUTER_API_KEY`: generation API key
    /// - `DIGEST_GENERATION_MIN_INTERVAL_MS`: spacing between generation calls
    /// - `DIGEST_ARTIFACT_DIR`: artifact output directory (default: ./artifacts)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("REDIS_URL") {
            config.redis_url = val;
        }
        if let Ok(val) = std::env::var("DIGEST_KEY_PREFIX") {
            config.key_prefix = val;
        }

        if let Ok(val) = std::env::var("GITHUB_API_BASE") {
            config.github_api_base = val.trim_end_matches('/').to_string();
        }
        config.github_token = std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty());
        if let Ok(val) = std::env::var("DIGEST_GIT_REF") {
            config.git_ref = val;
        }
        if let Ok(val) = std::env::var("DIGEST_RETRY_MAX_ATTEMPTS") {
            config.retry.max_attempts = parse_env_value(&val, "DIGEST_RETRY_MAX_ATTEMPTS")?;
        }
        if let Ok(val) = std::env::var("DIGEST_RETRY_BASE_DELAY_MS") {
            let ms: u64 = parse_env_value(&val, "DIGEST_RETRY_BASE_DELAY_MS")?;
            config.retry.base_delay = Duration::from_millis(ms);
        }
        if let Ok(val) = std::env::var("DIGEST_MAX_DEPTH") {
            config.traversal.max_depth = parse_env_value(&val, "DIGEST_MAX_DEPTH")?;
        }
        if let Ok(val) = std::env::var("DIGEST_MAX_NODES") {
            config.traversal.max_nodes = parse_env_value(&val, "DIGEST_MAX_NODES")?;
        }

        if let Ok(val) = std::env::var("DIGEST_STALE_AFTER_SECS") {
            let secs: u64 = parse_env_value(&val, "DIGEST_STALE_AFTER_SECS")?;
            config.stale_after = Duration::from_secs(secs);
        }
        if let Ok(val) = std::env::var("DIGEST_BATCH_SIZE") {
            config.batch_size = parse_env_value(&val, "DIGEST_BATCH_SIZE")?;
        }
        config.trigger_secret = std::env::var("TRIGGER_SECRET").ok().filter(|s| !s.is_empty());

        if let Ok(val) = std::env::var("DIGEST_GENERATION_API_BASE") {
            config.generation_api_base = val.trim_end_matches('/').to_string();
        }
        if let Ok(val) = std::env::var("DIGEST_GENERATION_MODEL") {
            config.generation_model = val;
        }
        config.generation_api_key = std::env::var("OPENROUTER_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());
        if let Ok(val) = std::env::var("DIGEST_GENERATION_MIN_INTERVAL_MS") {
            let ms: u64 = parse_env_value(&val, "DIGEST_GENERATION_MIN_INTERVAL_MS")?;
            config.generation_min_interval = Duration::from_millis(ms);
        }

        if let Ok(val) = std::env::var("DIGEST_ARTIFACT_DIR") {
            config.artifact_dir = PathBuf::from(val);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "retry.max_attempts must be greater than 0".to_string(),
            ));
        }
        if self.stale_after.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "stale_after must be greater than 0".to_string(),
            ));
        }
        if self.traversal.max_depth == 0 || self.traversal.max_nodes == 0 {
            return Err(ConfigError::ValidationFailed(
                "traversal limits must be greater than 0".to_string(),
            ));
        }
        if self.key_prefix.is_empty() || self.key_prefix.contains('*') {
            return Err(ConfigError::ValidationFailed(
                "key_prefix must be non-empty and contain no glob characters".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = url.into();
        self
    }

    pub fn with_github_token(mut self, token: Option<String>) -> Self {
        self.github_token = token;
        self
    }

    pub fn with_git_ref(mut self, git_ref: impl Into<String>) -> Self {
        self.git_ref = git_ref.into();
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = dir.into();
        self
    }
}

/// Parses an environment variable value to the specified type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}
