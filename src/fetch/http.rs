//! HTTP fetcher wrapping `reqwest` in the retry loop.
//!
//! Two flavors are provided: [`HttpFetcher::fetch_text`] returns the decoded
//! body, [`HttpFetcher::download_to`] writes the raw bytes to a file.

use std::path::Path;
use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use super::retry::retry_with_backoff;
use crate::config::RetryPolicy;
use crate::error::FetchError;

const USER_AGENT: &str = "repo-digest/0.1";

/// Authenticated HTTP client with bounded retries.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    token: Option<String>,
    policy: RetryPolicy,
}

impl HttpFetcher {
    /// Creates a fetcher with a 60 second per-request timeout.
    pub fn new(token: Option<String>, policy: RetryPolicy) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_else(|_| Client::new()),
            token,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn request(&self, url: &str) -> RequestBuilder {
        let mut request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
            .header("X-GitHub-Api-Version", "2022-11-28");

        if let Some(ref token) = self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        request
    }

    async fn send_once(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        let response = self
            .request(url)
            .send()
            .await
            .map_err(|e| FetchError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                target: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    /// Fetches `url` and returns the body as text.
    pub async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        retry_with_backoff(&self.policy, url, |_| async move {
            let response = self.send_once(url).await?;
            response.text().await.map_err(|e| FetchError::Decode {
                target: url.to_string(),
                reason: e.to_string(),
            })
        })
        .await
    }

    /// Fetches `url` and deserializes the JSON body.
    ///
    /// A body that does not decode is retried like any other failure.
    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        retry_with_backoff(&self.policy, url, |_| async move {
            let response = self.send_once(url).await?;
            response.json::<T>().await.map_err(|e| FetchError::Decode {
                target: url.to_string(),
                reason: e.to_string(),
            })
        })
        .await
    }

    /// Downloads `url` and writes the raw bytes to `dest`.
    ///
    /// The parent directory of `dest` must already exist.
    pub async fn download_to(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        let bytes = retry_with_backoff(&self.policy, url, |_| async move {
            let response = self.send_once(url).await?;
            response.bytes().await.map_err(|e| FetchError::Decode {
                target: url.to_string(),
                reason: e.to_string(),
            })
        })
        .await?;

        tokio::fs::write(dest, &bytes).await?;
        tracing::debug!(url = %url, dest = %dest.display(), bytes = bytes.len(), "Downloaded file");
        Ok(())
    }
}
