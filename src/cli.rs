// Command-line interface definitions for clue
//
// This module is separate so it can be used by both the binary (main.rs)
// and build.rs for generating man pages.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "clue")]
#[command(author, version, about = "Hotkey-triggered screenshot analysis with vision AI")]
#[command(long_about = "
Clue captures your screen when you press a hotkey, sends the screenshot to a
vision-capable AI model and shows the answer, formatted, in your terminal.

BACKENDS:
  key-auth  Hosted Gemini API (set GEMINI_API_KEY)
  local     Ollama server (OLLAMA_URL, default http://localhost:11434)
  oauth     Code Assist endpoint with a refreshable OAuth credential file

USAGE:
  Run: clue (to start the daemon)
  Press Cmd+Shift+F (default) to capture and analyze the screen.
  Or bind 'clue trigger' to a compositor shortcut.
")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<std::path::PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Override backend (key-auth, local, oauth)
    #[arg(long, value_name = "KIND")]
    pub backend: Option<String>,

    /// Override the selected backend's model
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Override hotkey action key (e.g., F, S, F12)
    #[arg(long, value_name = "KEY")]
    pub hotkey: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run as daemon (default if no command specified)
    Daemon,

    /// Analyze an existing image file and print the response
    Analyze {
        /// Path to image file (PNG or JPEG)
        image: std::path::PathBuf,

        /// Prompt to send instead of the configured one
        #[arg(long, value_name = "TEXT")]
        prompt: Option<String>,
    },

    /// Capture and analyze the screen once, without the daemon
    Capture,

    /// Ask the running daemon to capture (sends SIGUSR1)
    Trigger,

    /// Show current configuration
    Config,

    /// Show daemon status (for Waybar/polybar integration)
    Status {
        /// Output format: "text" (default) or "json" (for Waybar)
        #[arg(long, default_value = "text")]
        format: String,
    },
}
