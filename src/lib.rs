//! repo-digest: fan a repository out into per-file jobs and assemble a digest.
//!
//! Jobs, group membership and fingerprints live in a shared key-value store
//! (Redis in production). Externally triggered, stateless scheduling passes
//! execute jobs, reclaim work abandoned by crashed invocations and finalize
//! each group into one combined artifact exactly once.

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod fetch;
pub mod github;
pub mod ingest;
pub mod llm;
pub mod metrics;
pub mod scheduler;
pub mod storage;

// Re-export commonly used error types
pub use error::{
    ArtifactError, ConfigError, EnqueueError, FetchError, GenerationError, ListError,
    SchedulerError, StoreError,
};
