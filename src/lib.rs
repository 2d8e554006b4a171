//! Clue: hotkey-triggered screenshot analysis
//!
//! This library provides the core functionality for:
//! - Detecting a global key combination via rdev (macOS, X11, Windows)
//! - Capturing the screen via screencapture/grim/gnome-screenshot/scrot/import
//! - Analyzing the screenshot with a vision model (Gemini API key, local
//!   Ollama, or the OAuth-authenticated Code Assist endpoint)
//! - Rendering the markdown answer into styled segments for display
//!
//! # Architecture
//!
//! ```text
//!   ┌──────────────┐  Triggered   ┌─────────────────────────────────────┐
//!   │    Hotkey    │ ───────────▶ │          Daemon (UI context)        │
//!   │    (rdev)    │   (mpsc)     │  State: Idle / busy / Error         │
//!   └──────────────┘              └─────────────────────────────────────┘
//!                                        │ spawn_blocking      ▲
//!                                        │ (one run at a time) │ UiCommand
//!                                        ▼                     │ (mpsc)
//!          ┌─────────────────────────────────────────────────────────────┐
//!          │                        Pipeline run                         │
//!          │  Capturing ──▶ Notifying ──▶ Analyzing ──▶ Rendering        │
//!          │      │                           │             │            │
//!          │      ▼                           ▼             ▼            │
//!          │  ┌─────────┐             ┌──────────────┐  ┌──────────┐     │
//!          │  │ Capture │             │   Backend    │  │  Render  │     │
//!          │  │  tool   │             │ key-auth /   │  │ markdown │     │
//!          │  └─────────┘             │ local/oauth  │  │  subset  │     │
//!          │                          └──────────────┘  └──────────┘     │
//!          └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any failure in a run is shown as `Error: {message}` in place of the
//! response. The screenshot is deleted at the end of every run that
//! captured one.

pub mod backend;
pub mod capture;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod display;
pub mod error;
pub mod hotkey;
pub mod notification;
pub mod pipeline;
pub mod render;
pub mod state;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use daemon::Daemon;
pub use error::{ClueError, Result};
pub use render::{render, render_lines, Style, StyledSegment};
