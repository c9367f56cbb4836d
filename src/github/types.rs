//! Types shared by the repository provider, lister and enqueuer.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// Identifies a remote repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoCoordinate {
    /// Repository owner (user or organization).
    pub owner: String,
    /// Repository name.
    pub repo: String,
}

impl RepoCoordinate {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Parses `owner/repo`.
    pub fn parse(full_name: &str) -> Option<Self> {
        let (owner, repo) = full_name.trim().split_once('/')?;
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return None;
        }
        Some(Self::new(owner, repo))
    }

    /// Get the full repository path.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

impl fmt::Display for RepoCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// A single remote file: where it lives in the tree and where to fetch it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    /// Path relative to the repository root.
    pub path: String,
    /// URL returning the raw file content.
    pub url: String,
}

impl FileRef {
    pub fn new(path: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            url: url.into(),
        }
    }
}

/// Kind of entry returned by a directory listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
    /// Symlinks, submodules and anything else; never traversed.
    #[serde(other)]
    Other,
}

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub name: String,
    pub path: String,
    /// Raw content URL; absent for directories.
    #[serde(default)]
    pub download_url: Option<String>,
}

impl RemoteEntry {
    pub fn file(path: impl Into<String>, url: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            kind: EntryKind::File,
            name: path.rsplit('/').next().unwrap_or_default().to_string(),
            path,
            download_url: Some(url.into()),
        }
    }

    pub fn dir(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            kind: EntryKind::Dir,
            name: path.rsplit('/').next().unwrap_or_default().to_string(),
            path,
            download_url: None,
        }
    }
}

/// Remote repository content provider.
///
/// Every method that touches the network goes through the retry primitive
/// in the production implementation.
#[async_trait]
pub trait RepoProvider: Send + Sync {
    /// Lists the direct children of `path` (empty string for the root).
    async fn list_dir(
        &self,
        repo: &RepoCoordinate,
        path: &str,
    ) -> Result<Vec<RemoteEntry>, FetchError>;

    /// Returns the latest revision identifier for a file.
    async fn latest_fingerprint(
        &self,
        repo: &RepoCoordinate,
        path: &str,
    ) -> Result<String, FetchError>;

    /// Fetches a file's content as text.
    async fn fetch_text(&self, file: &FileRef) -> Result<String, FetchError>;

    /// Downloads a file's raw bytes to `dest`.
    async fn download(&self, file: &FileRef, dest: &Path) -> Result<(), FetchError>;

    /// Returns repository-level metadata for the artifact.
    async fn repo_metadata(&self, repo: &RepoCoordinate) -> Result<serde_json::Value, FetchError>;
}
