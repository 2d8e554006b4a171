//! OAuth credential file
//!
//! JSON with `access_token`, `refresh_token`, `expires_at` (epoch ms),
//! `provider` and `project_id`. The file is rewritten as a whole after every
//! token refresh, via a temp file in the same directory and a rename.

use crate::error::ClueError;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Stored OAuth credential
///
/// The access token is valid while the current time is before `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    /// Absolute expiry as Unix timestamp in milliseconds
    pub expires_at: i64,
    #[serde(default = "default_provider")]
    pub provider: String,
    pub project_id: String,
}

fn default_provider() -> String {
    "google".to_string()
}

impl Credential {
    /// Whether the access token can still be used at `now_ms`
    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        now_ms < self.expires_at
    }

    /// Whether the access token can still be used now
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(now_ms())
    }
}

/// Current time as Unix milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Location of the credential file on disk
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the credential file
    pub fn load(&self) -> Result<Credential, ClueError> {
        tracing::debug!("Loading OAuth credentials from {:?}", self.path);

        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            ClueError::Config(format!(
                "Cannot read OAuth credentials at {}: {}",
                self.path.display(),
                e
            ))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            ClueError::Config(format!(
                "Invalid OAuth credentials in {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    /// Replace the credential file with `credential`
    pub fn save(&self, credential: &Credential) -> std::io::Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let json = serde_json::to_vec_pretty(credential)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        tracing::debug!("OAuth credentials written to {:?}", self.path);
        Ok(())
    }
}
