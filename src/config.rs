//! Configuration loading and types for clue
//!
//! Configuration is loaded in layers:
//! 1. Built-in defaults
//! 2. Config file (~/.config/clue/config.toml)
//! 3. Environment variables (CLUE_*, GEMINI_*, OLLAMA_*)
//! 4. CLI arguments (highest priority)
//!
//! The resulting [`Config`] is built once at startup and handed to each
//! component by reference.

use crate::error::ClueError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = r#"# Clue Configuration
#
# Location: ~/.config/clue/config.toml
# All settings can be overridden via environment variables or CLI flags

# State file for external integrations (Waybar, polybar, etc.)
# Use "auto" for $XDG_RUNTIME_DIR/clue/state, a custom path, or "disabled"
state_file = "auto"

[hotkey]
# Key pressed while all modifiers are held
key = "F"

# Modifier keys that must be held. Unsided names (CMD, SHIFT, CTRL, ALT)
# match both the left and right key.
modifiers = ["CMD", "SHIFT"]

# Disable to drive clue from compositor keybindings via `clue trigger`
# enabled = true

[capture]
# "window" captures the focused window and falls back to the full screen
# when it cannot be located; "screen" always captures the full screen
target = "window"

[backend]
# Which provider analyzes screenshots: "key-auth", "local" or "oauth"
kind = "key-auth"

# Prompt sent with every screenshot
# prompt = "Analyze this screenshot..."

[backend.key_auth]
# API key (or set GEMINI_API_KEY)
# api_key = ""
model = "gemini-3-flash-preview"

[backend.local]
# Ollama server (or set OLLAMA_URL / OLLAMA_MODEL)
url = "http://localhost:11434"
model = "qwen3-vl:8b"

[backend.oauth]
# OAuth credential file: access_token, refresh_token, expires_at,
# provider, project_id. Rewritten after every token refresh.
# credentials = "~/.config/clue/oauth_creds.json"
model = "gemini-2.5-flash"
# client_id = ""
# client_secret = ""
"#;

/// Default prompt sent with each screenshot
pub const DEFAULT_PROMPT: &str = "Analyze this screenshot and help me understand what I'm looking at.
If it appears to be a problem or question, provide a clear, helpful answer.
If it's code, explain what it does or identify any issues.
Be concise but thorough.";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Optional path to state file for external integrations
    /// "auto" resolves to the runtime directory; "disabled" turns it off
    #[serde(default)]
    pub state_file: Option<String>,

    #[serde(default)]
    pub hotkey: HotkeyConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub backend: BackendConfig,
}

/// Hotkey detection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HotkeyConfig {
    /// Action key name, e.g. "F", "S", "F12"
    #[serde(default = "default_hotkey_key")]
    pub key: String,

    /// Modifier keys that must be held when the action key goes down
    #[serde(default = "default_hotkey_modifiers")]
    pub modifiers: Vec<String>,

    /// Enable built-in hotkey detection (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// What a capture covers
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaptureTarget {
    /// Focused window, full screen if no window can be located
    #[default]
    Window,
    /// Entire screen
    Screen,
}

impl CaptureTarget {
    pub fn parse(name: &str) -> Result<Self, ClueError> {
        match name.trim().to_lowercase().as_str() {
            "window" | "active" => Ok(CaptureTarget::Window),
            "screen" | "full" => Ok(CaptureTarget::Screen),
            other => Err(ClueError::Config(format!(
                "Unknown capture target '{}'. Use 'window' or 'screen'",
                other
            ))),
        }
    }
}

/// Screenshot configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CaptureConfig {
    #[serde(default)]
    pub target: CaptureTarget,
}

/// Which provider analyzes screenshots
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Hosted Gemini API authenticated with an API key
    #[default]
    #[serde(alias = "gemini")]
    KeyAuth,
    /// Local Ollama server, no auth
    #[serde(alias = "ollama")]
    Local,
    /// Code Assist endpoint authenticated with a refreshable OAuth token
    #[serde(alias = "oauth2")]
    Oauth,
}

impl BackendKind {
    /// Parse a backend name as accepted in env vars and CLI flags
    pub fn parse(name: &str) -> Result<Self, ClueError> {
        match name.trim().to_lowercase().as_str() {
            "key-auth" | "key_auth" | "gemini" => Ok(BackendKind::KeyAuth),
            "local" | "ollama" => Ok(BackendKind::Local),
            "oauth" | "oauth2" => Ok(BackendKind::Oauth),
            other => Err(ClueError::Config(format!(
                "Unknown backend '{}'. Use 'key-auth', 'local' or 'oauth'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::KeyAuth => write!(f, "key-auth"),
            BackendKind::Local => write!(f, "local"),
            BackendKind::Oauth => write!(f, "oauth"),
        }
    }
}

/// Analysis backend configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,

    /// Prompt sent along with every screenshot
    #[serde(default = "default_prompt")]
    pub prompt: String,

    #[serde(default)]
    pub key_auth: KeyAuthConfig,

    #[serde(default)]
    pub local: LocalConfig,

    #[serde(default)]
    pub oauth: OAuthConfig,
}

/// Hosted API settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KeyAuthConfig {
    /// API key; required when this backend is selected
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_key_auth_model")]
    pub model: String,

    #[serde(default = "default_key_auth_endpoint")]
    pub endpoint: String,

    /// Analyze request timeout in seconds
    #[serde(default = "default_analyze_timeout")]
    pub timeout_secs: u64,
}

/// Local inference server settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocalConfig {
    #[serde(default = "default_local_url")]
    pub url: String,

    #[serde(default = "default_local_model")]
    pub model: String,

    /// Analyze request timeout in seconds
    #[serde(default = "default_analyze_timeout")]
    pub timeout_secs: u64,

    /// Startup liveness probe timeout in seconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

/// OAuth-authenticated endpoint settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OAuthConfig {
    /// Credential file path; defaults to oauth_creds.json in the config dir
    #[serde(default)]
    pub credentials: Option<PathBuf>,

    #[serde(default = "default_oauth_model")]
    pub model: String,

    #[serde(default = "default_oauth_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_oauth_api_version")]
    pub api_version: String,

    /// OAuth client used for the refresh_token grant
    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,

    /// Analyze request timeout in seconds
    #[serde(default = "default_analyze_timeout")]
    pub timeout_secs: u64,

    /// Token refresh timeout in seconds
    #[serde(default = "default_refresh_timeout")]
    pub refresh_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_hotkey_key() -> String {
    "F".to_string()
}

fn default_hotkey_modifiers() -> Vec<String> {
    vec!["CMD".to_string(), "SHIFT".to_string()]
}

fn default_prompt() -> String {
    DEFAULT_PROMPT.to_string()
}

fn default_key_auth_model() -> String {
    "gemini-3-flash-preview".to_string()
}

fn default_key_auth_endpoint() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_local_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_local_model() -> String {
    "qwen3-vl:8b".to_string()
}

fn default_oauth_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_oauth_endpoint() -> String {
    "https://cloudcode-pa.googleapis.com".to_string()
}

fn default_oauth_api_version() -> String {
    "v1internal".to_string()
}

fn default_analyze_timeout() -> u64 {
    120
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_refresh_timeout() -> u64 {
    30
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            key: default_hotkey_key(),
            modifiers: default_hotkey_modifiers(),
            enabled: true,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            prompt: default_prompt(),
            key_auth: KeyAuthConfig::default(),
            local: LocalConfig::default(),
            oauth: OAuthConfig::default(),
        }
    }
}

impl Default for KeyAuthConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_key_auth_model(),
            endpoint: default_key_auth_endpoint(),
            timeout_secs: default_analyze_timeout(),
        }
    }
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            url: default_local_url(),
            model: default_local_model(),
            timeout_secs: default_analyze_timeout(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            credentials: None,
            model: default_oauth_model(),
            endpoint: default_oauth_endpoint(),
            api_version: default_oauth_api_version(),
            client_id: String::new(),
            client_secret: String::new(),
            timeout_secs: default_analyze_timeout(),
            refresh_timeout_secs: default_refresh_timeout(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hotkey: HotkeyConfig::default(),
            capture: CaptureConfig::default(),
            backend: BackendConfig::default(),
            state_file: Some("auto".to_string()),
        }
    }
}

impl OAuthConfig {
    /// Credential file location, falling back to the config directory
    pub fn credentials_path(&self) -> Option<PathBuf> {
        self.credentials
            .as_deref()
            .map(expand_home)
            .or_else(|| Config::config_dir().map(|d| d.join("oauth_creds.json")))
    }
}

impl BackendConfig {
    /// Model name used by the selected backend
    pub fn active_model(&self) -> &str {
        match self.kind {
            BackendKind::KeyAuth => &self.key_auth.model,
            BackendKind::Local => &self.local.model,
            BackendKind::Oauth => &self.oauth.model,
        }
    }

    /// Override the model of the selected backend
    pub fn set_active_model(&mut self, model: String) {
        match self.kind {
            BackendKind::KeyAuth => self.key_auth.model = model,
            BackendKind::Local => self.local.model = model,
            BackendKind::Oauth => self.oauth.model = model,
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Get the config directory path
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "clue").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the runtime directory for ephemeral files (state)
    pub fn runtime_dir() -> PathBuf {
        // Use XDG_RUNTIME_DIR if available, otherwise fall back to the temp dir
        std::env::var("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir())
            .join("clue")
    }

    /// Resolve the state file path from config
    /// Returns None if state_file is not configured or explicitly disabled
    pub fn resolve_state_file(&self) -> Option<PathBuf> {
        self.state_file
            .as_ref()
            .and_then(|path| match path.to_lowercase().as_str() {
                "disabled" | "none" | "off" | "false" => None,
                "auto" => Some(Self::runtime_dir().join("state")),
                _ => Some(expand_home(Path::new(path))),
            })
    }

    /// Check that the selected backend has the settings it needs
    ///
    /// Only cheap, local checks happen here. Reachability and credential
    /// parsing are verified when the backend client is constructed.
    pub fn validate(&self) -> Result<(), ClueError> {
        match self.backend.kind {
            BackendKind::KeyAuth => {
                if self.backend.key_auth.api_key.trim().is_empty() {
                    return Err(ClueError::Config(
                        "GEMINI_API_KEY is not set.\n  Set it with: export GEMINI_API_KEY='your-api-key'\n  or add api_key under [backend.key_auth] in the config file"
                            .into(),
                    ));
                }
            }
            BackendKind::Local => {
                let url = &self.backend.local.url;
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(ClueError::Config(format!(
                        "OLLAMA_URL must start with http:// or https://, got: {}",
                        url
                    )));
                }
            }
            BackendKind::Oauth => {
                if self.backend.oauth.credentials_path().is_none() {
                    return Err(ClueError::Config(
                        "No OAuth credential file configured. Set CLUE_OAUTH_CREDENTIALS".into(),
                    ));
                }
            }
        }

        if self.backend.prompt.trim().is_empty() {
            return Err(ClueError::Config("Analysis prompt must not be empty".into()));
        }

        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env<F>(&mut self, var: F) -> Result<(), ClueError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(kind) = var("CLUE_BACKEND") {
            self.backend.kind = BackendKind::parse(&kind)?;
        }
        if let Some(prompt) = var("CLUE_PROMPT") {
            self.backend.prompt = prompt;
        }
        if let Some(key) = var("CLUE_HOTKEY") {
            self.hotkey.key = key;
        }
        if let Some(target) = var("CLUE_CAPTURE_TARGET") {
            self.capture.target = CaptureTarget::parse(&target)?;
        }
        if let Some(api_key) = var("GEMINI_API_KEY") {
            self.backend.key_auth.api_key = api_key;
        }
        if let Some(model) = var("GEMINI_MODEL") {
            self.backend.key_auth.model = model;
        }
        if let Some(url) = var("OLLAMA_URL") {
            self.backend.local.url = url;
        }
        if let Some(model) = var("OLLAMA_MODEL") {
            self.backend.local.model = model;
        }
        if let Some(path) = var("CLUE_OAUTH_CREDENTIALS") {
            self.backend.oauth.credentials = Some(PathBuf::from(path));
        }
        if let Some(model) = var("CLUE_OAUTH_MODEL") {
            self.backend.oauth.model = model;
        }
        if let Some(client_id) = var("CLUE_OAUTH_CLIENT_ID") {
            self.backend.oauth.client_id = client_id;
        }
        if let Some(client_secret) = var("CLUE_OAUTH_CLIENT_SECRET") {
            self.backend.oauth.client_secret = client_secret;
        }
        Ok(())
    }

    /// Render the effective configuration with secrets masked
    pub fn to_masked_toml(&self) -> Result<String, ClueError> {
        let mut masked = self.clone();
        mask(&mut masked.backend.key_auth.api_key);
        mask(&mut masked.backend.oauth.client_secret);
        toml::to_string_pretty(&masked)
            .map_err(|e| ClueError::Config(format!("Failed to serialize config: {}", e)))
    }
}

fn mask(secret: &mut String) {
    if !secret.is_empty() {
        *secret = "********".to_string();
    }
}

/// Expand a leading `~/` to the home directory
fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

/// Load configuration from file and environment, with defaults for missing values
pub fn load_config(path: Option<&Path>) -> Result<Config, ClueError> {
    // Start with defaults
    let mut config = Config::default();

    // Determine config file path
    let config_path = path.map(PathBuf::from).or_else(Config::default_path);

    // Load from file if it exists
    if let Some(ref path) = config_path {
        if path.exists() {
            tracing::debug!("Loading config from {:?}", path);
            let contents = std::fs::read_to_string(path)
                .map_err(|e| ClueError::Config(format!("Failed to read config: {}", e)))?;

            config = toml::from_str(&contents)
                .map_err(|e| ClueError::Config(format!("Invalid config: {}", e)))?;
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
        }
    }

    // Override from environment variables; empty values count as unset
    config.apply_env(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))?;

    Ok(config)
}
