//! Code Assist backend authenticated with a refreshable OAuth token
//!
//! The access token lives in a credential file shared with other tools. Each
//! `analyze` call resolves a usable token first:
//!
//! - token still valid (`now < expires_at`): used as is, no I/O
//! - token expired: one refresh_token grant against the Google token
//!   endpoint, then the whole credential is written back to disk before the
//!   generate request goes out
//!
//! Refresh failures abort the call with [`AnalysisError::Auth`]. Nothing is
//! retried here.

use super::content::{first_candidate, user_content, NoCandidate};
use super::credential::{now_ms, Credential, CredentialStore};
use super::transport::Transport;
use super::{sniff_mime, BackendClient};
use crate::config::OAuthConfig;
use crate::error::{AnalysisError, ClueError};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Google OAuth 2.0 token endpoint
pub const TOKEN_REFRESH_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Lifetime assumed when the token endpoint omits `expires_in`
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Returned when the model answered with candidates but no text
pub const NO_RESPONSE: &str = "No response from model";

/// OAuth-authenticated Code Assist client
pub struct OAuthClient {
    credential: Mutex<Credential>,
    store: CredentialStore,
    model: String,
    endpoint: String,
    api_version: String,
    client_id: String,
    client_secret: String,
    timeout: Duration,
    refresh_timeout: Duration,
    session_id: String,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for OAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClient")
            .field("store", &self.store)
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("api_version", &self.api_version)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

impl OAuthClient {
    /// Create a new client, loading the credential file
    ///
    /// Fails if the file is missing or does not parse. Client id and secret
    /// are only needed once a refresh happens, so they are not checked here.
    pub fn new(config: &OAuthConfig, transport: Arc<dyn Transport>) -> Result<Self, ClueError> {
        let path = config.credentials_path().ok_or_else(|| {
            ClueError::Config("Cannot determine OAuth credential file location".into())
        })?;
        let store = CredentialStore::new(path);
        let credential = store.load()?;

        if credential.project_id.trim().is_empty() {
            return Err(ClueError::Config(format!(
                "OAuth credentials in {} have an empty project_id",
                store.path().display()
            )));
        }

        let endpoint = config.endpoint.trim_end_matches('/').to_string();
        let session_id = uuid::Uuid::new_v4().to_string();

        tracing::info!(
            "Configured OAuth backend: model={}, project={}, token {}",
            config.model,
            credential.project_id,
            if credential.is_valid() { "valid" } else { "expired" }
        );

        Ok(Self {
            credential: Mutex::new(credential),
            store,
            model: config.model.clone(),
            endpoint,
            api_version: config.api_version.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            refresh_timeout: Duration::from_secs(config.refresh_timeout_secs),
            session_id,
            transport,
        })
    }

    /// Return a usable access token and the project it belongs to,
    /// refreshing and persisting first if the stored one has expired
    fn access_token(&self) -> Result<(String, String), AnalysisError> {
        let mut credential = self
            .credential
            .lock()
            .map_err(|_| AnalysisError::Auth("Credential lock poisoned".into()))?;

        if credential.is_valid_at(now_ms()) {
            return Ok((
                credential.access_token.clone(),
                credential.project_id.clone(),
            ));
        }

        tracing::info!("OAuth access token expired, refreshing");
        let refreshed = self.refresh(&credential)?;

        self.store.save(&refreshed).map_err(|e| {
            AnalysisError::Auth(format!(
                "Failed to save refreshed credentials to {}: {}",
                self.store.path().display(),
                e
            ))
        })?;
        *credential = refreshed;

        tracing::debug!(
            "OAuth token refreshed, valid for {}s",
            (credential.expires_at - now_ms()) / 1000
        );

        Ok((
            credential.access_token.clone(),
            credential.project_id.clone(),
        ))
    }

    /// Run the refresh_token grant and build the updated credential
    fn refresh(&self, current: &Credential) -> Result<Credential, AnalysisError> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(AnalysisError::Auth(
                "OAuth token expired and no client_id/client_secret configured to refresh it. Set CLUE_OAUTH_CLIENT_ID and CLUE_OAUTH_CLIENT_SECRET"
                    .into(),
            ));
        }

        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", current.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .transport
            .post_form(TOKEN_REFRESH_ENDPOINT, &form, self.refresh_timeout)
            .map_err(|e| AnalysisError::Auth(format!("Token refresh failed: {}", e)))?;

        let access_token = response
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                AnalysisError::Auth("Token refresh response missing access_token".into())
            })?;

        let expires_in = response
            .get("expires_in")
            .and_then(Value::as_i64)
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS);

        let mut updated = current.clone();
        updated.access_token = access_token.to_string();
        updated.expires_at = now_ms().saturating_add(expires_in.saturating_mul(1000));

        // Google may rotate the refresh token
        if let Some(rotated) = response.get("refresh_token").and_then(Value::as_str) {
            if !rotated.is_empty() {
                updated.refresh_token = rotated.to_string();
            }
        }

        Ok(updated)
    }

    fn url(&self) -> String {
        format!("{}/{}:generateContent", self.endpoint, self.api_version)
    }
}

impl BackendClient for OAuthClient {
    fn analyze(&self, image: &[u8], prompt: &str) -> Result<String, AnalysisError> {
        let (token, project) = self.access_token()?;

        let body = json!({
            "model": self.model,
            "project": project,
            "user_prompt_id": uuid::Uuid::new_v4().to_string(),
            "request": {
                "contents": [user_content(prompt, image, sniff_mime(image))],
                "generationConfig": {
                    "thinkingConfig": { "includeThoughts": true }
                },
                "session_id": self.session_id
            }
        });

        tracing::debug!("Sending {} byte image to {} ({})", image.len(), self.model, self.url());

        let bearer = format!("Bearer {}", token);
        let response = self
            .transport
            .post_json(
                &self.url(),
                &[("Authorization", bearer.as_str())],
                &body,
                self.timeout,
            )
            .map_err(|e| AnalysisError::Provider(e.to_string()))?;

        let inner = response.get("response").unwrap_or(&Value::Null);
        let text = first_candidate(inner).map_err(|e| match e {
            NoCandidate::Blocked(reason) => {
                AnalysisError::Provider(format!("Prompt blocked by provider: {}", reason))
            }
            NoCandidate::Missing => AnalysisError::Provider("No candidates in response".into()),
        })?;

        for thought in &text.thoughts {
            tracing::debug!("Model thought: {}", thought);
        }

        if text.answer.is_empty() {
            return Ok(NO_RESPONSE.to_string());
        }

        Ok(text.answer.join("\n"))
    }

    fn name(&self) -> &'static str {
        "oauth"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::super::transport::mock::MockTransport;
    use super::super::transport::TransportError;
    use super::*;
    use std::path::{Path, PathBuf};

    fn write_credential(dir: &Path, expires_at: i64) -> PathBuf {
        let path = dir.join("oauth_creds.json");
        let credential = Credential {
            access_token: "old-token".into(),
            refresh_token: "refresh-1".into(),
            expires_at,
            provider: "google".into(),
            project_id: "proj-42".into(),
        };
        CredentialStore::new(&path).save(&credential).unwrap();
        path
    }

    fn config(path: &Path) -> OAuthConfig {
        OAuthConfig {
            credentials: Some(path.to_path_buf()),
            client_id: "client".into(),
            client_secret: "secret".into(),
            ..OAuthConfig::default()
        }
    }

    fn answer(parts: Value) -> Value {
        json!({ "response": { "candidates": [{ "content": { "parts": parts } }] } })
    }

    #[test]
    fn test_missing_credential_file_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir.path().join("nope.json"));
        let err = OAuthClient::new(&cfg, Arc::new(MockTransport::new())).unwrap_err();
        assert!(matches!(err, ClueError::Config(_)));
    }

    #[test]
    fn test_valid_token_skips_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_credential(dir.path(), now_ms() + 3_600_000);

        let transport = Arc::new(MockTransport::new());
        transport.push(Ok(answer(json!([{ "text": "Fine." }]))));

        let client = OAuthClient::new(&config(&path), transport.clone()).unwrap();
        assert_eq!(client.analyze(b"img", "p").unwrap(), "Fine.");

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].url,
            "https://cloudcode-pa.googleapis.com/v1internal:generateContent"
        );
        assert_eq!(
            calls[0].headers,
            vec![("Authorization".to_string(), "Bearer old-token".to_string())]
        );
    }

    #[test]
    fn test_expired_token_refreshes_once_and_persists_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_credential(dir.path(), now_ms() - 1_000);

        let snapshot_path = path.clone();
        let transport = Arc::new(MockTransport::new().with_snapshot(move || {
            std::fs::read_to_string(&snapshot_path).unwrap_or_default()
        }));
        transport.push(Ok(json!({
            "access_token": "new-token",
            "expires_in": 1800,
            "token_type": "Bearer"
        })));
        transport.push(Ok(answer(json!([{ "text": "Done." }]))));

        let client = OAuthClient::new(&config(&path), transport.clone()).unwrap();
        let before = now_ms();
        assert_eq!(client.analyze(b"img", "p").unwrap(), "Done.");

        let calls = transport.calls();
        assert_eq!(calls.len(), 2);

        let refresh = &calls[0];
        assert_eq!(refresh.url, TOKEN_REFRESH_ENDPOINT);
        assert_eq!(refresh.timeout, Duration::from_secs(30));
        assert!(refresh
            .form
            .contains(&("grant_type".to_string(), "refresh_token".to_string())));
        assert!(refresh
            .form
            .contains(&("refresh_token".to_string(), "refresh-1".to_string())));
        assert!(refresh.snapshot.as_ref().unwrap().contains("old-token"));

        // The new token was on disk by the time the generate request went out
        let generate = &calls[1];
        assert!(generate.snapshot.as_ref().unwrap().contains("new-token"));
        assert_eq!(
            generate.headers,
            vec![("Authorization".to_string(), "Bearer new-token".to_string())]
        );

        let stored = CredentialStore::new(&path).load().unwrap();
        assert_eq!(stored.access_token, "new-token");
        assert_eq!(stored.refresh_token, "refresh-1");
        assert!(stored.expires_at >= before + 1_800_000);
        assert!(stored.expires_at <= now_ms() + 1_800_000);

        // A second call uses the refreshed token without another refresh
        transport.push(Ok(answer(json!([{ "text": "Again." }]))));
        assert_eq!(client.analyze(b"img", "p").unwrap(), "Again.");
        assert_eq!(transport.calls().len(), 3);
    }

    #[test]
    fn test_rotated_refresh_token_is_stored() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_credential(dir.path(), 0);

        let transport = Arc::new(MockTransport::new());
        transport.push(Ok(json!({
            "access_token": "new-token",
            "refresh_token": "refresh-2"
        })));
        transport.push(Ok(answer(json!([{ "text": "ok" }]))));

        let client = OAuthClient::new(&config(&path), transport).unwrap();
        client.analyze(b"img", "p").unwrap();

        let stored = CredentialStore::new(&path).load().unwrap();
        assert_eq!(stored.refresh_token, "refresh-2");
    }

    #[test]
    fn test_huge_expires_in_saturates() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_credential(dir.path(), 0);

        let transport = Arc::new(MockTransport::new());
        transport.push(Ok(json!({
            "access_token": "new-token",
            "expires_in": i64::MAX
        })));
        transport.push(Ok(answer(json!([{ "text": "ok" }]))));

        let client = OAuthClient::new(&config(&path), transport).unwrap();
        assert_eq!(client.analyze(b"img", "p").unwrap(), "ok");

        let stored = CredentialStore::new(&path).load().unwrap();
        assert_eq!(stored.expires_at, i64::MAX);
        assert!(stored.is_valid());
    }

    #[test]
    fn test_refresh_failure_is_auth_error_without_generate() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_credential(dir.path(), 0);

        let transport = Arc::new(MockTransport::new());
        transport.push(Err(TransportError::Status(
            400,
            r#"{"error":"invalid_grant"}"#.into(),
        )));

        let client = OAuthClient::new(&config(&path), transport.clone()).unwrap();
        let err = client.analyze(b"img", "p").unwrap_err();
        assert!(matches!(err, AnalysisError::Auth(_)));
        assert!(err.to_string().contains("invalid_grant"));
        assert_eq!(transport.calls().len(), 1);

        // Stored credential untouched
        let stored = CredentialStore::new(&path).load().unwrap();
        assert_eq!(stored.access_token, "old-token");
    }

    #[test]
    fn test_missing_client_secret_is_auth_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_credential(dir.path(), 0);
        let cfg = OAuthConfig {
            client_secret: String::new(),
            ..config(&path)
        };

        let transport = Arc::new(MockTransport::new());
        let client = OAuthClient::new(&cfg, transport.clone()).unwrap();
        let err = client.analyze(b"img", "p").unwrap_err();
        assert!(matches!(err, AnalysisError::Auth(_)));
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn test_request_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_credential(dir.path(), now_ms() + 3_600_000);

        let transport = Arc::new(MockTransport::new());
        transport.push(Ok(answer(json!([{ "text": "a" }]))));
        transport.push(Ok(answer(json!([{ "text": "b" }]))));

        let client = OAuthClient::new(&config(&path), transport.clone()).unwrap();
        client.analyze(b"img", "Describe").unwrap();
        client.analyze(b"img", "Describe").unwrap();

        let calls = transport.calls();
        let first = calls[0].body.as_ref().unwrap();
        let second = calls[1].body.as_ref().unwrap();

        assert_eq!(first["model"], "gemini-2.5-flash");
        assert_eq!(first["project"], "proj-42");
        assert_eq!(first["request"]["contents"][0]["parts"][0]["text"], "Describe");
        assert_eq!(
            first["request"]["generationConfig"]["thinkingConfig"]["includeThoughts"],
            true
        );
        // Session id is stable per client, request id is fresh per call
        assert_eq!(first["request"]["session_id"], second["request"]["session_id"]);
        assert_ne!(first["user_prompt_id"], second["user_prompt_id"]);
    }

    #[test]
    fn test_thoughts_are_dropped_and_parts_joined_by_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_credential(dir.path(), now_ms() + 3_600_000);

        let transport = Arc::new(MockTransport::new());
        transport.push(Ok(answer(json!([
            { "text": "Let me look...", "thought": true },
            { "text": "Line one" },
            { "text": "Line two" }
        ]))));

        let client = OAuthClient::new(&config(&path), transport).unwrap();
        assert_eq!(client.analyze(b"img", "p").unwrap(), "Line one\nLine two");
    }

    #[test]
    fn test_no_candidates_is_provider_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_credential(dir.path(), now_ms() + 3_600_000);

        let transport = Arc::new(MockTransport::new());
        transport.push(Ok(json!({ "response": { "candidates": [] } })));

        let client = OAuthClient::new(&config(&path), transport).unwrap();
        let err = client.analyze(b"img", "p").unwrap_err();
        assert!(matches!(err, AnalysisError::Provider(_)));
    }

    #[test]
    fn test_candidates_without_text_return_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_credential(dir.path(), now_ms() + 3_600_000);

        let transport = Arc::new(MockTransport::new());
        transport.push(Ok(answer(json!([{ "text": "only thinking", "thought": true }]))));

        let client = OAuthClient::new(&config(&path), transport).unwrap();
        assert_eq!(client.analyze(b"img", "p").unwrap(), NO_RESPONSE);
    }
}
