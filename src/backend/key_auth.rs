//! Hosted Gemini API backend authenticated with an API key
//!
//! Sends the prompt and the screenshot as an inline image part to
//! `models/{model}:generateContent` and returns the first candidate's text.

use super::content::{first_candidate, user_content, NoCandidate};
use super::transport::{Transport, TransportError};
use super::{sniff_mime, BackendClient};
use crate::config::KeyAuthConfig;
use crate::error::{AnalysisError, ClueError};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// API-key authenticated Gemini client
pub struct KeyAuthClient {
    api_key: String,
    model: String,
    endpoint: String,
    timeout: Duration,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for KeyAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyAuthClient")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl KeyAuthClient {
    /// Create a new client; fails if no API key is configured
    pub fn new(config: &KeyAuthConfig, transport: Arc<dyn Transport>) -> Result<Self, ClueError> {
        let api_key = config.api_key.trim();
        if api_key.is_empty() {
            return Err(ClueError::Config(
                "GEMINI_API_KEY environment variable not set.\n  Set it with: export GEMINI_API_KEY='your-api-key'"
                    .into(),
            ));
        }

        let endpoint = config.endpoint.trim_end_matches('/').to_string();
        if !endpoint.starts_with("https://") && !endpoint.starts_with("http://") {
            return Err(ClueError::Config(format!(
                "key_auth endpoint must start with http:// or https://, got: {}",
                endpoint
            )));
        }

        tracing::info!(
            "Configured key-auth backend: model={}, timeout={}s",
            config.model,
            config.timeout_secs
        );

        Ok(Self {
            api_key: api_key.to_string(),
            model: config.model.clone(),
            endpoint,
            timeout: Duration::from_secs(config.timeout_secs),
            transport,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint, self.model
        )
    }
}

impl BackendClient for KeyAuthClient {
    fn analyze(&self, image: &[u8], prompt: &str) -> Result<String, AnalysisError> {
        let body = json!({
            "contents": [user_content(prompt, image, sniff_mime(image))]
        });

        tracing::debug!(
            "Sending {} byte image to {} ({})",
            image.len(),
            self.model,
            self.endpoint
        );

        let response = self
            .transport
            .post_json(
                &self.url(),
                &[("x-goog-api-key", self.api_key.as_str())],
                &body,
                self.timeout,
            )
            .map_err(|e: TransportError| AnalysisError::Provider(e.to_string()))?;

        let text = first_candidate(&response).map_err(|e| match e {
            NoCandidate::Blocked(reason) => {
                AnalysisError::Provider(format!("Prompt blocked by provider: {}", reason))
            }
            NoCandidate::Missing => {
                AnalysisError::Provider("Response contained no candidates".into())
            }
        })?;

        let answer = text.answer.concat();
        if answer.trim().is_empty() {
            return Err(AnalysisError::Provider("Empty response from Gemini".into()));
        }

        Ok(answer)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
