//! Repository ingestion.
//!
//! - **classify**: extension-based file categories
//! - **fingerprint**: last-seen revision per file, for change detection
//! - **enqueue**: one group of `queued` jobs per changed file set

pub mod classify;
pub mod enqueue;
pub mod fingerprint;

pub use classify::{classify, FileCategory};
pub use enqueue::{EnqueueReport, Enqueuer};
pub use fingerprint::FingerprintStore;
