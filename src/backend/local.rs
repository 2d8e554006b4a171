//! Local Ollama backend
//!
//! Talks to an Ollama server's `/api/generate` endpoint with a base64 image
//! and `stream: false`. No authentication. Reachability is checked once at
//! construction so a stopped server is reported at startup.

use super::transport::Transport;
use super::BackendClient;
use crate::config::LocalConfig;
use crate::error::{AnalysisError, ClueError};
use base64::Engine;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Ollama client
pub struct LocalClient {
    /// Base URL, e.g. "http://localhost:11434"
    url: String,
    model: String,
    timeout: Duration,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for LocalClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalClient")
            .field("url", &self.url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl LocalClient {
    /// Create a new client, probing the server for liveness
    pub fn new(config: &LocalConfig, transport: Arc<dyn Transport>) -> Result<Self, ClueError> {
        let url = config.url.trim_end_matches('/').to_string();

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ClueError::Config(format!(
                "Ollama URL must start with http:// or https://, got: {}",
                url
            )));
        }

        let probe_timeout = Duration::from_secs(config.probe_timeout_secs);
        if let Err(e) = transport.get(&format!("{}/api/tags", url), probe_timeout) {
            tracing::debug!("Ollama liveness probe failed: {}", e);
            return Err(ClueError::Config(format!(
                "Cannot connect to Ollama at {}\n  Make sure Ollama is running: ollama serve",
                url
            )));
        }

        tracing::info!(
            "Configured local backend: url={}, model={}, timeout={}s",
            url,
            config.model,
            config.timeout_secs
        );

        Ok(Self {
            url,
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            transport,
        })
    }
}

impl BackendClient for LocalClient {
    fn analyze(&self, image: &[u8], prompt: &str) -> Result<String, AnalysisError> {
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "images": [base64::engine::general_purpose::STANDARD.encode(image)],
            "stream": false
        });

        tracing::debug!("Sending {} byte image to Ollama ({})", image.len(), self.model);

        let response = self
            .transport
            .post_json(&format!("{}/api/generate", self.url), &[], &body, self.timeout)
            .map_err(|e| AnalysisError::Provider(e.to_string()))?;

        response
            .get("response")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                AnalysisError::Provider(format!("Response missing 'response' field: {}", response))
            })
    }

    fn name(&self) -> &'static str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
