//! Error types for clue
//!
//! Uses thiserror for ergonomic error definitions with clear messages
//! that guide users toward fixing common issues.

use thiserror::Error;

/// Top-level error type for the clue application
#[derive(Error, Debug)]
pub enum ClueError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Hotkey error: {0}")]
    Hotkey(#[from] HotkeyError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to hotkey detection
#[derive(Error, Debug)]
pub enum HotkeyError {
    #[error("Unknown key name: '{0}'. Try: F, S, F12, CMD, SHIFT, CTRL, ALT")]
    UnknownKey(String),

    #[error("Hotkey listener failed: {0}")]
    Listen(String),
}

/// Errors raised by the screen capture collaborator
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No screenshot tool found. Install grim, gnome-screenshot, scrot or ImageMagick.")]
    NoTool,

    #[error("Screenshot failed: {0}")]
    Failed(String),

    #[error("Screenshot IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by [`crate::backend::BackendClient::analyze`]
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Non-success HTTP status, malformed body, empty result, timeout
    #[error("Provider error: {0}")]
    Provider(String),

    /// Access token refresh failed
    #[error("Authentication error: {0}")]
    Auth(String),
}

/// Result type alias using ClueError
pub type Result<T> = std::result::Result<T, ClueError>;
