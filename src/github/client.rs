//! GitHub REST implementation of [`RepoProvider`].

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::types::{FileRef, RemoteEntry, RepoCoordinate, RepoProvider};
use crate::config::{AppConfig, RetryPolicy};
use crate::error::FetchError;
use crate::fetch::HttpFetcher;

/// GitHub REST API base URL.
pub const GITHUB_API_BASE: &str = "https://api.github.com";

#[derive(Debug, Deserialize)]
struct CommitSummary {
    sha: String,
}

/// Repository provider backed by the GitHub contents and commits APIs.
#[derive(Clone)]
pub struct GitHubClient {
    fetcher: HttpFetcher,
    api_base: String,
    git_ref: String,
}

impl GitHubClient {
    pub fn new(
        api_base: impl Into<String>,
        token: Option<String>,
        git_ref: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            fetcher: HttpFetcher::new(token, policy),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            git_ref: git_ref.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.github_api_base,
            config.github_token.clone(),
            &config.git_ref,
            config.retry.clone(),
        )
    }

    fn contents_url(&self, repo: &RepoCoordinate, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}?ref={}",
            self.api_base,
            repo.owner,
            repo.repo,
            encode_path(path),
            urlencoding::encode(&self.git_ref)
        )
    }

    fn commits_url(&self, repo: &RepoCoordinate, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/commits?path={}&sha={}&per_page=1",
            self.api_base,
            repo.owner,
            repo.repo,
            urlencoding::encode(path),
            urlencoding::encode(&self.git_ref)
        )
    }
}

#[async_trait]
impl RepoProvider for GitHubClient {
    async fn list_dir(
        &self,
        repo: &RepoCoordinate,
        path: &str,
    ) -> Result<Vec<RemoteEntry>, FetchError> {
        let url = self.contents_url(repo, path);
        // A file path returns an object rather than an array.
        let raw: Value = self.fetcher.fetch_json(&url).await?;
        match raw {
            Value::Array(_) => serde_json::from_value(raw).map_err(|e| FetchError::Decode {
                target: url,
                reason: e.to_string(),
            }),
            Value::Object(_) => {
                let entry: RemoteEntry =
                    serde_json::from_value(raw).map_err(|e| FetchError::Decode {
                        target: url,
                        reason: e.to_string(),
                    })?;
                Ok(vec![entry])
            }
            _ => Err(FetchError::Decode {
                target: url,
                reason: "unexpected listing shape".to_string(),
            }),
        }
    }

    async fn latest_fingerprint(
        &self,
        repo: &RepoCoordinate,
        path: &str,
    ) -> Result<String, FetchError> {
        let url = self.commits_url(repo, path);
        let commits: Vec<CommitSummary> = self.fetcher.fetch_json(&url).await?;
        commits
            .into_iter()
            .next()
            .map(|c| c.sha)
            .ok_or_else(|| FetchError::Decode {
                target: url,
                reason: "no commits touch this path".to_string(),
            })
    }

    async fn fetch_text(&self, file: &FileRef) -> Result<String, FetchError> {
        self.fetcher.fetch_text(&file.url).await
    }

    async fn download(&self, file: &FileRef, dest: &Path) -> Result<(), FetchError> {
        self.fetcher.download_to(&file.url, dest).await
    }

    async fn repo_metadata(&self, repo: &RepoCoordinate) -> Result<Value, FetchError> {
        let url = format!("{}/repos/{}/{}", self.api_base, repo.owner, repo.repo);
        let raw: Value = self.fetcher.fetch_json(&url).await?;
        Ok(summarize_repo(repo, &self.git_ref, &raw))
    }
}

/// Keeps the repository fields worth carrying into an artifact.
fn summarize_repo(repo: &RepoCoordinate, git_ref: &str, raw: &Value) -> Value {
    json!({
        "owner": repo.owner,
        "repo": repo.repo,
        "ref": git_ref,
        "full_name": raw.get("full_name").cloned().unwrap_or(Value::Null),
        "description": raw.get("description").cloned().unwrap_or(Value::Null),
        "default_branch": raw.get("default_branch").cloned().unwrap_or(Value::Null),
        "language": raw.get("language").cloned().unwrap_or(Value::Null),
        "topics": raw.get("topics").cloned().unwrap_or_else(|| json!([])),
        "stars": raw.get("stargazers_count").cloned().unwrap_or(Value::Null),
        "html_url": raw.get("html_url").cloned().unwrap_or(Value::Null),
    })
}

/// Percent-encodes each path segment, keeping the separators.
fn encode_path(path: &str) -> String {
    path.trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| urlencoding::encode(s).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GitHubClient {
        GitHubClient::new(GITHUB_API_BASE, None, "main", RetryPolicy::default())
    }

    #[test]
    fn test_encode_path() {
        assert_eq!(encode_path(""), "");
        assert_eq!(encode_path("/src/lib.rs/"), "src/lib.rs");
        assert_eq!(encode_path("docs/my file.md"), "docs/my%20file.md");
    }

    #[test]
    fn test_contents_url() {
        let repo = RepoCoordinate::new("octo", "demo");
        assert_eq!(
            client().contents_url(&repo, "dir"),
            "https://api.github.com/repos/octo/demo/contents/dir?ref=main"
        );
        assert_eq!(
            client().contents_url(&repo, ""),
            "https://api.github.com/repos/octo/demo/contents/?ref=main"
        );
    }

    #[test]
    fn test_commits_url_encodes_path() {
        let repo = RepoCoordinate::new("octo", "demo");
        assert_eq!(
            client().commits_url(&repo, "dir/c.json"),
            "https://api.github.com/repos/octo/demo/commits?path=dir%2Fc.json&sha=main&per_page=1"
        );
    }

    #[test]
    fn test_summarize_repo() {
        let repo = RepoCoordinate::new("octo", "demo");
        let raw = json!({
            "full_name": "octo/demo",
            "description": "A demo",
            "default_branch": "main",
            "language": "Rust",
            "stargazers_count": 42,
            "private": false
        });
        let meta = summarize_repo(&repo, "main", &raw);
        assert_eq!(meta["full_name"], "octo/demo");
        assert_eq!(meta["stars"], 42);
        assert_eq!(meta["topics"], json!([]));
        assert!(meta.get("private").is_none());
    }
}
