//! Screenshot analysis backends
//!
//! Provides analysis via:
//! - Hosted Gemini API with an API key ([`key_auth`])
//! - Local Ollama server, no auth ([`local`])
//! - Code Assist endpoint with a refreshable OAuth token ([`oauth`])
//!
//! The backend is selected once at startup. Construction validates
//! everything that can be checked early (keys, reachability, credential
//! file) so failures surface before the first hotkey press.

pub mod content;
pub mod credential;
pub mod key_auth;
pub mod local;
pub mod oauth;
pub mod transport;

use crate::config::{BackendConfig, BackendKind};
use crate::error::{AnalysisError, ClueError};
use std::sync::Arc;
use transport::{Transport, UreqTransport};

/// Trait for vision backends
///
/// `analyze` blocks until the provider answers or its timeout expires; the
/// pipeline calls it from a background task.
pub trait BackendClient: Send + Sync {
    /// Send an image and a prompt, returning the model's textual answer
    fn analyze(&self, image: &[u8], prompt: &str) -> Result<String, AnalysisError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;

    /// Model the backend sends requests to
    fn model(&self) -> &str;
}

/// Factory function to create the configured backend
pub fn create_backend(config: &BackendConfig) -> Result<Box<dyn BackendClient>, ClueError> {
    create_backend_with(config, Arc::new(UreqTransport::new()))
}

/// Create the configured backend on top of a specific transport
pub fn create_backend_with(
    config: &BackendConfig,
    transport: Arc<dyn Transport>,
) -> Result<Box<dyn BackendClient>, ClueError> {
    tracing::info!(
        "Creating backend: kind={}, model={}",
        config.kind,
        config.active_model()
    );

    match config.kind {
        BackendKind::KeyAuth => Ok(Box::new(key_auth::KeyAuthClient::new(
            &config.key_auth,
            transport,
        )?)),
        BackendKind::Local => Ok(Box::new(local::LocalClient::new(&config.local, transport)?)),
        BackendKind::Oauth => Ok(Box::new(oauth::OAuthClient::new(&config.oauth, transport)?)),
    }
}

/// Guess the image MIME type from its magic bytes, defaulting to PNG
pub fn sniff_mime(image: &[u8]) -> &'static str {
    if image.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if image.starts_with(b"RIFF") && image.get(8..12) == Some(&b"WEBP"[..]) {
        "image/webp"
    } else {
        "image/png"
    }
}
