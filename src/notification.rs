//! Platform-specific desktop notifications
//!
//! Provides a unified interface for sending desktop notifications on
//! different platforms:
//! - Linux: Uses notify-send (libnotify)
//! - macOS: Uses osascript (AppleScript)
//!
//! Notifications are best-effort. Failures are logged at debug level and
//! never propagate.

use std::path::Path;
#[cfg(any(target_os = "linux", target_os = "macos"))]
use std::process::{Command, Stdio};

/// Application name shown by the notification daemon
const APP_NAME: &str = "Clue";

/// Send a desktop notification, optionally with an image as its icon.
///
/// Spawns the notifier and returns immediately.
pub fn send(title: &str, body: &str, icon: Option<&Path>) {
    #[cfg(target_os = "linux")]
    send_linux(title, body, icon);

    #[cfg(target_os = "macos")]
    {
        // osascript notifications cannot carry a custom image
        let _ = icon;
        send_macos(title, body);
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        tracing::debug!("Notifications not supported on this platform");
        let _ = (title, body, icon); // Suppress unused warnings
    }
}

/// Arguments for notify-send
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn notify_send_args(title: &str, body: &str, icon: Option<&Path>) -> Vec<String> {
    let mut args = vec![
        format!("--app-name={}", APP_NAME),
        "--expire-time=3000".to_string(),
    ];
    if let Some(icon) = icon {
        args.push(format!("--icon={}", icon.display()));
    }
    args.push(title.to_string());
    args.push(body.to_string());
    args
}

/// Send a notification on Linux using notify-send
#[cfg(target_os = "linux")]
fn send_linux(title: &str, body: &str, icon: Option<&Path>) {
    let result = Command::new("notify-send")
        .args(notify_send_args(title, body, icon))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();

    if let Err(e) = result {
        tracing::debug!("Failed to send notification: {}", e);
    }
}

/// AppleScript source for a notification
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn applescript(title: &str, body: &str) -> String {
    let escaped_title = title.replace('\\', "\\\\").replace('"', "\\\"");
    let escaped_body = body.replace('\\', "\\\\").replace('"', "\\\"");

    format!(
        r#"display notification "{}" with title "{}""#,
        escaped_body, escaped_title
    )
}

/// Send a notification on macOS via osascript
#[cfg(target_os = "macos")]
fn send_macos(title: &str, body: &str) {
    let result = Command::new("osascript")
        .args(["-e", &applescript(title, body)])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();

    if let Err(e) = result {
        tracing::debug!("Failed to send notification: {}", e);
    }
}
