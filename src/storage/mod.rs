//! Shared key-value storage.
//!
//! All coordination state (jobs, group membership, fingerprints, rate-limit
//! timestamps) lives in an external key-value store so that independent,
//! short-lived invocations observe the same state.
//!
//! # Overview
//!
//! - **KvStore**: the async trait every component is written against
//! - **RedisStore**: production implementation on a Redis connection manager
//! - **MemoryStore**: in-process implementation for tests and dry runs
//! - **SharedRateLimiter**: call spacing whose state is kept in the store
//!
//! # Usage
//!
//! ```rust,ignore
//! use repo_digest::storage::{KvStore, RedisStore};
//! use std::sync::Arc;
//!
//! let store: Arc<dyn KvStore> = Arc::new(RedisStore::connect("redis://localhost:6379").await?);
//! store.set("digest:hello", "world").await?;
//! ```

pub mod kv;
pub mod memory;
pub mod rate_limit;
pub mod redis_store;

pub use kv::{decode, get_json, set_json, KvStore};
pub use memory::MemoryStore;
pub use rate_limit::SharedRateLimiter;
pub use redis_store::RedisStore;
