//! Proxy configuration

use crate::error::{Result, SplatError};

pub const DEFAULT_LOCATION: &str = "us-central1";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Configuration for the Vertex AI proxy
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// GCP project id (`VERTEX_PROJECT_ID` or `GOOGLE_CLOUD_PROJECT`)
    pub project: String,
    /// Vertex location (`VERTEX_LOCATION`)
    pub location: String,
    /// Model used when the request does not name one (`VERTEX_MODEL`)
    pub default_model: String,
    /// Base URL override for the upstream API, used in tests
    pub endpoint_override: Option<String>,
}

impl ProxyConfig {
    /// Resolve the configuration from the environment.
    ///
    /// A missing project id is a startup error; location and model fall back
    /// to defaults.
    pub fn from_env() -> Result<Self> {
        let project = std::env::var("VERTEX_PROJECT_ID")
            .or_else(|_| std::env::var("GOOGLE_CLOUD_PROJECT"))
            .map_err(|_| {
                SplatError::ConfigError(
                    "Missing VERTEX_PROJECT_ID (or GOOGLE_CLOUD_PROJECT)".to_string(),
                )
            })?;

        let location =
            std::env::var("VERTEX_LOCATION").unwrap_or_else(|_| DEFAULT_LOCATION.to_string());
        let default_model =
            std::env::var("VERTEX_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Ok(Self {
            project,
            location,
            default_model,
            endpoint_override: None,
        })
    }

    /// Full `generateContent` URL for the given model
    pub fn generate_url(&self, model: &str) -> String {
        let base = match &self.endpoint_override {
            Some(base) => base.clone(),
            None => format!("https://{}-aiplatform.googleapis.com", self.location),
        };
        format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:generateContent",
            base, self.project, self.location, model
        )
    }
}
