//! Network primitives for talking to the repository provider.
//!
//! - **retry_with_backoff**: bounded retry loop with exponential backoff
//! - **HttpFetcher**: authenticated GET returning text, JSON, or a file on disk

pub mod http;
pub mod retry;

pub use http::HttpFetcher;
pub use retry::retry_with_backoff;
