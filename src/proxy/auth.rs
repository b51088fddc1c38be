//! Ambient GCP credential lookup
//!
//! Tokens are short-lived and refreshed by the platform, so each request
//! fetches a fresh one; nothing is cached here. The token never leaves the
//! proxy process towards the browser.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, SplatError};

/// GCE/Cloud Run metadata server token endpoint
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Source of bearer tokens for the upstream API
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Fetch a fresh access token
    async fn access_token(&self) -> Result<String>;
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
}

/// Token provider backed by the ambient platform credentials.
///
/// On GCE/Cloud Run the metadata server answers directly; on a developer
/// machine it does not exist, so `gcloud auth print-access-token` is used
/// instead.
pub struct GcloudTokenProvider {
    client: reqwest::Client,
}

impl GcloudTokenProvider {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            // The metadata server is link-local; fail fast when absent
            .connect_timeout(Duration::from_millis(500))
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| SplatError::ConfigError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    async fn from_metadata_server(&self) -> Result<String> {
        let response = self
            .client
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| SplatError::FetchError {
                path: "metadata token".to_string(),
                source: e,
            })?;

        if !response.status().is_success() {
            return Err(SplatError::HttpStatusError {
                path: "metadata token".to_string(),
                status: response.status().as_u16(),
            });
        }

        let token: MetadataToken =
            response.json().await.map_err(|e| SplatError::FetchError {
                path: "metadata token".to_string(),
                source: e,
            })?;
        Ok(token.access_token)
    }

    async fn from_gcloud(&self) -> Result<String> {
        let output = tokio::process::Command::new("gcloud")
            .args(["auth", "print-access-token"])
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SplatError::ToolNotFound("gcloud".to_string())
                } else {
                    SplatError::FsError(e)
                }
            })?;

        if !output.status.success() {
            return Err(SplatError::ConfigError(format!(
                "gcloud auth print-access-token failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(SplatError::ConfigError(
                "Failed to get Google access token (ADC not configured)".to_string(),
            ));
        }
        Ok(token)
    }
}

#[async_trait]
impl TokenProvider for GcloudTokenProvider {
    async fn access_token(&self) -> Result<String> {
        match self.from_metadata_server().await {
            Ok(token) => Ok(token),
            Err(e) => {
                debug!("Metadata server unavailable ({e}), falling back to gcloud");
                self.from_gcloud().await
            }
        }
    }
}
