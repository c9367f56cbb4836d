//! Last-seen content fingerprint per `(repository, path)`.
//!
//! A change-detection cache only: a stale entry causes redundant work,
//! never a wrong artifact.

use std::sync::Arc;

use crate::error::StoreError;
use crate::github::RepoCoordinate;
use crate::storage::KvStore;

#[derive(Clone)]
pub struct FingerprintStore {
    store: Arc<dyn KvStore>,
    prefix: String,
}

impl FingerprintStore {
    pub fn new(store: Arc<dyn KvStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    fn key(&self, repo: &RepoCoordinate, path: &str) -> String {
        format!("{}:fp:{}/{}:{}", self.prefix, repo.owner, repo.repo, path)
    }

    pub async fn get(&self, repo: &RepoCoordinate, path: &str) -> Result<Option<String>, StoreError> {
        self.store.get(&self.key(repo, path)).await
    }

    pub async fn set(
        &self,
        repo: &RepoCoordinate,
        path: &str,
        fingerprint: &str,
    ) -> Result<(), StoreError> {
        self.store.set(&self.key(repo, path), fingerprint).await
    }

    /// Number of fingerprints recorded for a repository.
    pub async fn count(&self, repo: &RepoCoordinate) -> Result<usize, StoreError> {
        let prefix = format!("{}:fp:{}/{}:", self.prefix, repo.owner, repo.repo);
        Ok(self.store.scan_prefix(&prefix).await?.len())
    }
}
