//! Recursive repository listing and checkout.
//!
//! Traversal is depth-first over an explicit stack, bounded by
//! [`TraversalLimits`]. Any listing failure aborts the whole walk.

use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};

use super::types::{EntryKind, FileRef, RemoteEntry, RepoCoordinate, RepoProvider};
use crate::config::TraversalLimits;
use crate::error::ListError;

/// Walks remote repository trees through a [`RepoProvider`].
pub struct RepoLister<'a> {
    provider: &'a dyn RepoProvider,
    limits: TraversalLimits,
}

/// Budget shared by one traversal.
struct Walk {
    visited: usize,
    limits: TraversalLimits,
}

impl Walk {
    fn new(limits: TraversalLimits) -> Self {
        Self { visited: 0, limits }
    }

    fn count(&mut self, entries: usize) -> Result<(), ListError> {
        self.visited += entries;
        if self.visited > self.limits.max_nodes {
            return Err(ListError::TooManyNodes {
                max_nodes: self.limits.max_nodes,
            });
        }
        Ok(())
    }

    fn check_depth(&self, path: &str, depth: usize) -> Result<(), ListError> {
        if depth > self.limits.max_depth {
            return Err(ListError::DepthExceeded {
                path: path.to_string(),
                max_depth: self.limits.max_depth,
            });
        }
        Ok(())
    }
}

impl<'a> RepoLister<'a> {
    pub fn new(provider: &'a dyn RepoProvider, limits: TraversalLimits) -> Self {
        Self { provider, limits }
    }

    async fn list_one(
        &self,
        repo: &RepoCoordinate,
        path: &str,
    ) -> Result<Vec<RemoteEntry>, ListError> {
        self.provider
            .list_dir(repo, path)
            .await
            .map_err(|source| ListError::Remote {
                path: path.to_string(),
                source,
            })
    }

    /// Returns every regular file reachable under `subpath`.
    ///
    /// Directories contribute no entries themselves. Order is unspecified.
    pub async fn list_files(
        &self,
        repo: &RepoCoordinate,
        subpath: Option<&str>,
    ) -> Result<Vec<FileRef>, ListError> {
        let root = normalize(subpath.unwrap_or(""));
        let mut walk = Walk::new(self.limits.clone());
        let mut files = Vec::new();
        let mut stack = vec![(root, 0usize)];

        while let Some((dir, depth)) = stack.pop() {
            let entries = self.list_one(repo, &dir).await?;
            walk.count(entries.len())?;

            for entry in entries {
                match entry.kind {
                    EntryKind::File => match entry.download_url {
                        Some(url) => files.push(FileRef::new(entry.path, url)),
                        None => debug!(path = %entry.path, "Skipping file without download URL"),
                    },
                    EntryKind::Dir => {
                        walk.check_depth(&entry.path, depth + 1)?;
                        stack.push((entry.path, depth + 1));
                    }
                    EntryKind::Other => {
                        debug!(path = %entry.path, "Skipping non-regular entry");
                    }
                }
            }
        }

        info!(repo = %repo, files = files.len(), "Listed repository files");
        Ok(files)
    }

    /// Mirrors the remote subtree at `subpath` into `dest`.
    ///
    /// Each local directory is created before anything beneath it is
    /// written. Returns the number of files downloaded.
    pub async fn checkout(
        &self,
        repo: &RepoCoordinate,
        subpath: Option<&str>,
        dest: &Path,
    ) -> Result<usize, ListError> {
        let root = normalize(subpath.unwrap_or(""));
        let mut walk = Walk::new(self.limits.clone());
        let mut downloaded = 0usize;
        let mut stack = vec![(root.clone(), 0usize)];

        tokio::fs::create_dir_all(dest).await?;

        while let Some((dir, depth)) = stack.pop() {
            let entries = self.list_one(repo, &dir).await?;
            walk.count(entries.len())?;

            for entry in entries {
                match entry.kind {
                    EntryKind::Dir => {
                        walk.check_depth(&entry.path, depth + 1)?;
                        let local = dest.join(relative_to(&root, &entry.path)?);
                        tokio::fs::create_dir_all(&local).await?;
                        stack.push((entry.path, depth + 1));
                    }
                    EntryKind::File => {
                        let Some(url) = entry.download_url else {
                            continue;
                        };
                        let local = dest.join(relative_to(&root, &entry.path)?);
                        let file = FileRef::new(entry.path, url);
                        self.provider
                            .download(&file, &local)
                            .await
                            .map_err(|source| ListError::Remote {
                                path: file.path.clone(),
                                source,
                            })?;
                        downloaded += 1;
                    }
                    EntryKind::Other => {}
                }
            }
        }

        info!(repo = %repo, files = downloaded, dest = %dest.display(), "Checkout complete");
        Ok(downloaded)
    }
}

fn normalize(path: &str) -> String {
    path.trim_matches('/').to_string()
}

/// Maps a remote path under `root` to a safe relative local path.
fn relative_to(root: &str, remote: &str) -> Result<PathBuf, ListError> {
    let rel = if root.is_empty() {
        remote
    } else {
        remote
            .strip_prefix(root)
            .map(|r| r.trim_start_matches('/'))
            .ok_or_else(|| ListError::UnsafePath(remote.to_string()))?
    };

    let rel_path = PathBuf::from(rel);
    let safe = !rel.is_empty()
        && rel_path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if !safe {
        return Err(ListError::UnsafePath(remote.to_string()));
    }
    Ok(rel_path)
}
