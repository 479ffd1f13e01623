//! Gantry package index client
//!
//! A simple, type-safe HTTP client for the package index the deploy
//! stage publishes to. The index exposes two operations the pipeline
//! cares about:
//!
//! - an existence probe (`GET /<package>/<version>/`) used to honor
//!   `skip_existing`, and
//! - a multipart upload (`POST /`) with basic auth, where HTTP 409
//!   means the exact version is already published and the upload is a
//!   no-op rather than a failure.
//!
//! # Example
//!
//! ```no_run
//! use gantry_index::{IndexApi, IndexClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = IndexClient::new("https://index.example.org/legacy");
//!
//!     if client.exists("brahe", "0.2.0").await? {
//!         println!("version already published, nothing to do");
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;

pub use error::{ClientError, Result};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::path::Path;
use tracing::{debug, info};

/// Decoded credential pair handed to the index
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Outcome of an upload attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Artifacts were accepted by the index
    Uploaded,
    /// The exact version already exists; nothing was published
    AlreadyExists,
}

/// Operations the deploy stage needs from a package index
///
/// Abstracted so the stage executor can be tested against an
/// in-memory fake.
#[async_trait]
pub trait IndexApi: Send + Sync {
    /// Whether the exact package version is already published
    async fn exists(&self, package: &str, version: &str) -> Result<bool>;

    /// Uploads artifact files for a package version
    async fn upload(
        &self,
        package: &str,
        version: &str,
        artifacts: &[std::path::PathBuf],
        credentials: &Credentials,
    ) -> Result<UploadOutcome>;
}

/// HTTP client for the package index
#[derive(Debug, Clone)]
pub struct IndexClient {
    /// Base URL of the index (e.g., "https://index.example.org/legacy")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl IndexClient {
    /// Create a new index client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the index upload endpoint
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    /// Create a new index client with a custom HTTP client
    ///
    /// This allows configuring timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the index
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn read_artifact(path: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(path).await.map_err(|e| ClientError::Artifact {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl IndexApi for IndexClient {
    async fn exists(&self, package: &str, version: &str) -> Result<bool> {
        let url = format!("{}/{}/{}/", self.base_url, package, version);
        debug!("Probing index for existing version: {}", url);

        let response = self.client.get(&url).send().await?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                Err(ClientError::api_error(status.as_u16(), message))
            }
        }
    }

    async fn upload(
        &self,
        package: &str,
        version: &str,
        artifacts: &[std::path::PathBuf],
        credentials: &Credentials,
    ) -> Result<UploadOutcome> {
        let mut form = reqwest::multipart::Form::new()
            .text("name", package.to_string())
            .text("version", version.to_string());

        for path in artifacts {
            let bytes = Self::read_artifact(path).await?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "artifact".to_string());
            form = form.part(
                "content",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            );
        }

        info!(
            "Uploading {} artifact(s) for {} {} to {}",
            artifacts.len(),
            package,
            version,
            self.base_url
        );

        let response = self
            .client
            .post(&self.base_url)
            .basic_auth(&credentials.username, Some(&credentials.password))
            .multipart(form)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(UploadOutcome::Uploaded),
            StatusCode::CONFLICT => Ok(UploadOutcome::AlreadyExists),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ClientError::Auth {
                status: response.status().as_u16(),
            }),
            status => {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                Err(ClientError::api_error(status.as_u16(), message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = IndexClient::new("https://index.example.org/legacy");
        assert_eq!(client.base_url(), "https://index.example.org/legacy");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = IndexClient::new("https://index.example.org/legacy/");
        assert_eq!(client.base_url(), "https://index.example.org/legacy");
    }

    #[test]
    fn test_client_with_custom_client() {
        let http_client = Client::new();
        let client = IndexClient::with_client("https://index.example.org", http_client);
        assert_eq!(client.base_url(), "https://index.example.org");
    }
}
