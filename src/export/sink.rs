//! Destinations for finalized artifacts.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

use super::artifact::Artifact;
use crate::error::ArtifactError;

/// Where and what was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub name: String,
    pub location: String,
    /// Hex SHA-256 of the written document.
    pub checksum: String,
    pub size_bytes: u64,
}

/// Accepts a finalized artifact and makes it retrievable later.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn store(&self, artifact: &Artifact) -> Result<StoredArtifact, ArtifactError>;
}

/// Writes artifacts as JSON files under a directory.
pub struct FsArtifactSink {
    base_path: PathBuf,
}

impl FsArtifactSink {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", name))
    }

    /// Reads back a stored artifact document.
    pub async fn load(&self, name: &str) -> Result<serde_json::Value, ArtifactError> {
        let data = fs::read(self.artifact_path(name)).await?;
        Ok(serde_json::from_slice(&data)?)
    }
}

pub(crate) fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[async_trait]
impl ArtifactSink for FsArtifactSink {
    async fn store(&self, artifact: &Artifact) -> Result<StoredArtifact, ArtifactError> {
        fs::create_dir_all(&self.base_path).await?;

        let data = artifact.to_json()?;
        let checksum = compute_checksum(&data);
        let path = self.artifact_path(&artifact.name);
        // Readers never observe a half-written file.
        let tmp = self
            .base_path
            .join(format!(".{}.{}.tmp", artifact.name, uuid::Uuid::new_v4()));

        let write = async {
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
            fs::rename(&tmp, &path).await
        };
        if let Err(e) = write.await {
            let _ = fs::remove_file(&tmp).await;
            return Err(ArtifactError::WriteFailed {
                name: artifact.name.clone(),
                reason: e.to_string(),
            });
        }

        info!(
            artifact = %artifact.name,
            path = %path.display(),
            files = artifact.file_count(),
            checksum = %checksum,
            "Artifact written"
        );

        Ok(StoredArtifact {
            name: artifact.name.clone(),
            location: path.display().to_string(),
            checksum,
            size_bytes: data.len() as u64,
        })
    }
}

/// Keeps artifacts in memory; used by tests and dry runs.
#[derive(Default)]
pub struct MemoryArtifactSink {
    artifacts: Mutex<Vec<Artifact>>,
}

impl MemoryArtifactSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn artifacts(&self) -> Vec<Artifact> {
        self.artifacts.lock().await.clone()
    }
}

#[async_trait]
impl ArtifactSink for MemoryArtifactSink {
    async fn store(&self, artifact: &Artifact) -> Result<StoredArtifact, ArtifactError> {
        let data = artifact.to_json()?;
        self.artifacts.lock().await.push(artifact.clone());
        Ok(StoredArtifact {
            name: artifact.name.clone(),
            location: format!("memory://{}", artifact.name),
            checksum: compute_checksum(&data),
            size_bytes: data.len() as u64,
        })
    }
}
