//! Clue - hotkey-triggered screenshot analysis
//!
//! Run with `clue` or `clue daemon` to start the daemon.
//! Use `clue analyze <image>` to analyze an existing screenshot.
//! Use `clue capture` to capture and analyze once without the daemon.

use anyhow::Context;
use clap::Parser;
use clue::backend;
use clue::config::{self, BackendKind, Config};
use clue::display::{DisplaySurface, TerminalSurface, TITLE};
use clue::pipeline;
use clue::{daemon, Cli, Commands};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("clue={},warn", log_level))),
        )
        .with_target(false)
        .init();

    // Load configuration
    let mut config = config::load_config(cli.config.as_deref())?;

    // Apply CLI overrides
    if let Some(kind) = cli.backend {
        config.backend.kind = BackendKind::parse(&kind)?;
    }
    if let Some(model) = cli.model {
        config.backend.set_active_model(model);
    }
    if let Some(hotkey) = cli.hotkey {
        config.hotkey.key = hotkey;
    }

    match cli.command.unwrap_or(Commands::Daemon) {
        Commands::Daemon => {
            config.validate()?;
            let mut daemon = daemon::Daemon::new(config);
            daemon.run().await?;
        }

        Commands::Analyze { image, prompt } => {
            if let Some(prompt) = prompt {
                config.backend.prompt = prompt;
            }
            config.validate()?;
            analyze_file(&config, &image).await?;
        }

        Commands::Capture => {
            config.validate()?;
            if daemon::run_once(&config).await?.is_some() {
                std::process::exit(1);
            }
        }

        Commands::Trigger => {
            send_trigger()?;
        }

        Commands::Config => {
            show_config(&config, cli.config.as_deref())?;
        }

        Commands::Status { format } => {
            run_status(&config, &format)?;
        }
    }

    Ok(())
}

/// Analyze an image file and print the styled response
async fn analyze_file(config: &Config, path: &Path) -> anyhow::Result<()> {
    let image = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    tracing::info!("Loaded {:?} ({} bytes)", path, image.len());

    let backend_config = config.backend.clone();
    let lines = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let backend = backend::create_backend(&backend_config)?;
        Ok(pipeline::analyze_and_render(
            backend.as_ref(),
            &image,
            &backend_config.prompt,
        )?)
    })
    .await??;

    TerminalSurface::stdout().show_response(TITLE, &lines);
    Ok(())
}

/// Signal the running daemon to capture
fn send_trigger() -> anyhow::Result<()> {
    let pid_path = Config::runtime_dir().join("pid");
    let pid = std::fs::read_to_string(&pid_path)
        .map(|s| s.trim().to_string())
        .map_err(|_| anyhow::anyhow!("clue daemon is not running (no PID file at {:?})", pid_path))?;

    if pid.is_empty() || !pid.chars().all(|c| c.is_ascii_digit()) {
        anyhow::bail!("Invalid PID file at {:?}", pid_path);
    }

    let status = std::process::Command::new("kill")
        .args(["-USR1", &pid])
        .status()
        .context("Failed to run kill")?;

    if !status.success() {
        anyhow::bail!("clue daemon (pid {}) is not running", pid);
    }

    tracing::debug!("Sent SIGUSR1 to pid {}", pid);
    Ok(())
}

/// Run the status command - show current daemon state
fn run_status(config: &Config, format: &str) -> anyhow::Result<()> {
    let Some(state_path) = config.resolve_state_file() else {
        eprintln!("Error: state_file is not configured.");
        eprintln!();
        eprintln!("To enable status monitoring, add to your config.toml:");
        eprintln!();
        eprintln!("  state_file = \"auto\"");
        std::process::exit(1);
    };

    let state = std::fs::read_to_string(&state_path).unwrap_or_else(|_| "stopped".to_string());
    let state = state.trim();

    if format == "json" {
        println!("{}", format_state_json(state));
    } else {
        println!("{}", state);
    }
    Ok(())
}

/// Format state as JSON for Waybar consumption
fn format_state_json(state: &str) -> String {
    let (text, class, tooltip) = match state {
        "idle" => ("🔍", "idle", "Clue ready - press the hotkey to analyze the screen"),
        "capturing" | "notifying" => ("📸", "capturing", "Capturing screen..."),
        "analyzing" => ("⏳", "analyzing", "Analyzing..."),
        "rendering" => ("📝", "rendering", "Rendering response..."),
        "error" => ("⚠", "error", "Last analysis failed"),
        "stopped" => ("", "stopped", "Clue not running"),
        _ => ("?", "unknown", "Unknown state"),
    };

    serde_json::json!({ "text": text, "class": class, "tooltip": tooltip }).to_string()
}

/// Show current configuration
fn show_config(config: &Config, path: Option<&Path>) -> anyhow::Result<()> {
    println!("# Effective configuration (secrets masked)\n");
    print!("{}", config.to_masked_toml()?);

    println!("\n# ---");
    println!(
        "# Config file: {:?}",
        path.map(PathBuf::from)
            .or_else(Config::default_path)
            .unwrap_or_else(|| PathBuf::from("(not found)"))
    );
    if let Some(resolved) = config.resolve_state_file() {
        println!("# State file: {:?}", resolved);
    }
    if config.backend.kind == BackendKind::Oauth {
        if let Some(creds) = config.backend.oauth.credentials_path() {
            println!("# OAuth credentials: {:?}", creds);
        }
    }

    Ok(())
}
