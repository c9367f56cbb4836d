//! Remote repository access.
//!
//! - **RepoProvider**: the seam every component uses to reach the provider
//! - **GitHubClient**: GitHub REST implementation (contents + commits APIs)
//! - **RepoLister**: recursive listing and local checkout with traversal guards

pub mod client;
pub mod lister;
pub mod types;

pub use client::{GitHubClient, GITHUB_API_BASE};
pub use lister::RepoLister;
pub use types::{EntryKind, FileRef, RemoteEntry, RepoCoordinate, RepoProvider};
