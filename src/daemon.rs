//! Daemon module - main event loop orchestration
//!
//! The event loop is the UI context. It receives hotkey triggers, spawns one
//! detached background run per accepted trigger, and applies the
//! [`UiCommand`]s those runs send back to the display surface.
//!
//! Runs are serialized: a trigger arriving while a run is in progress is
//! logged and ignored.

use crate::backend::{self, BackendClient};
use crate::capture::{self, CaptureService};
use crate::config::Config;
use crate::display::{self, DisplaySurface, TerminalSurface, UiCommand, UiSender};
use crate::error::{ClueError, Result};
use crate::hotkey::{self, HotkeyEvent};
use crate::pipeline::{self, Pipeline};
use crate::state::State;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;

/// Write state to file for external integrations (e.g., Waybar)
fn write_state_file(path: &Path, state: &str) {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!("Failed to create state file directory: {}", e);
            return;
        }
    }

    if let Err(e) = std::fs::write(path, state) {
        tracing::warn!("Failed to write state file: {}", e);
    } else {
        tracing::trace!("State file updated: {}", state);
    }
}

/// Remove state file on shutdown
fn cleanup_state_file(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!("Failed to remove state file: {}", e);
        }
    }
}

/// Write PID file so `kill -USR1` can trigger a capture
fn write_pid_file() -> Option<PathBuf> {
    let pid_path = Config::runtime_dir().join("pid");

    if let Some(parent) = pid_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!("Failed to create PID file directory: {}", e);
            return None;
        }
    }

    let pid = std::process::id();
    if let Err(e) = std::fs::write(&pid_path, pid.to_string()) {
        tracing::warn!("Failed to write PID file: {}", e);
        return None;
    }

    tracing::debug!("PID file written: {:?} (pid={})", pid_path, pid);
    Some(pid_path)
}

/// Remove PID file on shutdown
fn cleanup_pid_file(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!("Failed to remove PID file: {}", e);
        }
    }
}

/// Build the backend off the async runtime; construction may probe the network
async fn build_backend(config: &Config) -> Result<Arc<dyn BackendClient>> {
    let backend_config = config.backend.clone();
    let backend = tokio::task::spawn_blocking(move || backend::create_backend(&backend_config))
        .await
        .map_err(|e| ClueError::Config(format!("Backend setup task failed: {}", e)))??;
    Ok(Arc::from(backend))
}

/// Build the pipeline for `config`
pub async fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let backend = build_backend(config).await?;
    let capture: Arc<dyn CaptureService> =
        Arc::new(capture::create_capture_service(config.capture.target)?);
    Ok(Pipeline::new(capture, backend, config.backend.prompt.clone()))
}

/// Start a run if none is in progress
///
/// Returns false when the trigger was ignored.
pub fn accept_trigger(state: &mut State) -> bool {
    if state.is_busy() {
        tracing::info!("Run in progress ({}), ignoring trigger", state);
        return false;
    }
    *state = State::Idle.advance(crate::state::Phase::Capturing);
    true
}

/// Run the pipeline on a detached background unit
///
/// A panic inside the run is reported as a failed run instead of leaving the
/// loop stuck in a busy state.
pub fn spawn_run(pipeline: &Pipeline, ui: &UiSender) {
    let pipeline = pipeline.clone();
    let run_ui = ui.clone();
    let handle = tokio::task::spawn_blocking(move || pipeline.run(&run_ui));

    let ui = ui.clone();
    tokio::spawn(async move {
        if let Err(e) = handle.await {
            tracing::error!("Run aborted: {}", e);
            let message = format!("Error: Run aborted: {}", abort_reason(e));
            pipeline::show_error(&ui, &message);
            pipeline::post(
                &ui,
                UiCommand::Finished {
                    error: Some(message),
                },
            );
        }
    });
}

/// Panic message of an aborted run, if it carried one
fn abort_reason(error: tokio::task::JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }
    let payload = error.into_panic();
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic".to_string())
}

/// Apply one command from a run on the UI context
///
/// Display commands go to `surface`; phase and completion messages update
/// `state`. Returns true if the state changed.
pub fn handle_ui_command(
    state: &mut State,
    surface: &mut dyn DisplaySurface,
    command: UiCommand,
) -> bool {
    match command {
        UiCommand::Phase(phase) => {
            *state = state.advance(phase);
            tracing::debug!("Run state: {}", state);
            true
        }
        UiCommand::Finished { error } => {
            if let Some(started_at) = state.started_at() {
                tracing::debug!("Run took {:.2}s", started_at.elapsed().as_secs_f32());
            }
            *state = match error {
                Some(message) => State::Error { message },
                None => State::Idle,
            };
            true
        }
        other => {
            display::apply(surface, &other);
            false
        }
    }
}

/// Main daemon that orchestrates all components
pub struct Daemon {
    config: Config,
    state_file_path: Option<PathBuf>,
    pid_file_path: Option<PathBuf>,
}

impl Daemon {
    /// Create a new daemon with the given configuration
    pub fn new(config: Config) -> Self {
        let state_file_path = config.resolve_state_file();
        Self {
            config,
            state_file_path,
            pid_file_path: None,
        }
    }

    /// Update the state file if configured
    fn update_state(&self, state: &State) {
        if let Some(ref path) = self.state_file_path {
            write_state_file(path, state.name());
        }
    }

    /// Run the daemon main loop
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!("Starting clue daemon");

        // Validate everything before listening for keys
        let pipeline = build_pipeline(&self.config).await?;

        self.pid_file_path = write_pid_file();

        let mut sigusr1 = signal(SignalKind::user_defined1()).map_err(|e| {
            ClueError::Config(format!("Failed to set up SIGUSR1 handler: {}", e))
        })?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(|e| {
            ClueError::Config(format!("Failed to set up SIGTERM handler: {}", e))
        })?;

        if let Some(ref path) = self.state_file_path {
            tracing::info!("State file: {:?}", path);
        }

        // Initialize hotkey listener (if enabled)
        let mut hotkey_listener = if self.config.hotkey.enabled {
            Some(hotkey::create_listener(&self.config.hotkey)?)
        } else {
            tracing::info!(
                "Built-in hotkey disabled, use 'clue trigger' or 'clue capture' (pid file: {:?})",
                Config::runtime_dir().join("pid")
            );
            None
        };

        let mut hotkey_rx = if let Some(ref mut listener) = hotkey_listener {
            Some(listener.start().await?)
        } else {
            None
        };

        if self.config.hotkey.enabled {
            tracing::info!(
                "Listening for hotkey: {} + {}",
                self.config.hotkey.modifiers.join(" + "),
                self.config.hotkey.key
            );
        }

        let (ui_tx, mut ui_rx) = mpsc::unbounded_channel::<UiCommand>();
        let mut surface = TerminalSurface::stdout();
        let mut state = State::Idle;
        self.update_state(&state);

        // Main event loop
        loop {
            tokio::select! {
                // Handle hotkey events (only if hotkey listener is enabled)
                Some(HotkeyEvent::Triggered) = async {
                    match &mut hotkey_rx {
                        Some(rx) => rx.recv().await,
                        None => std::future::pending().await,
                    }
                } => {
                    tracing::debug!("Hotkey triggered, state = {}", state);
                    if accept_trigger(&mut state) {
                        self.update_state(&state);
                        spawn_run(&pipeline, &ui_tx);
                    }
                }

                // External trigger (compositor keybinding, scripts)
                _ = sigusr1.recv() => {
                    tracing::debug!("Received SIGUSR1, state = {}", state);
                    if accept_trigger(&mut state) {
                        self.update_state(&state);
                        spawn_run(&pipeline, &ui_tx);
                    }
                }

                // Display updates and progress from background runs
                Some(command) = ui_rx.recv() => {
                    if handle_ui_command(&mut state, &mut surface, command) {
                        self.update_state(&state);
                    }
                }

                // Handle graceful shutdown (SIGINT from Ctrl+C)
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received SIGINT, shutting down...");
                    break;
                }

                // Handle graceful shutdown (SIGTERM from systemctl stop)
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, shutting down...");
                    break;
                }
            }
        }

        // Cleanup
        if let Some(mut listener) = hotkey_listener {
            listener.stop().await?;
        }

        if let Some(ref path) = self.state_file_path {
            cleanup_state_file(path);
        }

        if let Some(ref path) = self.pid_file_path {
            cleanup_pid_file(path);
        }

        tracing::info!("Daemon stopped");

        Ok(())
    }
}

/// Run a single capture immediately and wait for it to finish
///
/// Returns the error message shown, if the run failed.
pub async fn run_once(config: &Config) -> Result<Option<String>> {
    let pipeline = build_pipeline(config).await?;
    let (ui_tx, ui_rx) = mpsc::unbounded_channel();
    let mut surface = TerminalSurface::stdout();

    let mut state = State::Idle;
    accept_trigger(&mut state);
    spawn_run(&pipeline, &ui_tx);
    drop(ui_tx);

    Ok(drain_until_finished(&mut state, &mut surface, ui_rx).await)
}

/// Apply commands until the run reports completion
async fn drain_until_finished(
    state: &mut State,
    surface: &mut dyn DisplaySurface,
    mut ui_rx: mpsc::UnboundedReceiver<UiCommand>,
) -> Option<String> {
    while let Some(command) = ui_rx.recv().await {
        let finished = match &command {
            UiCommand::Finished { error } => Some(error.clone()),
            _ => None,
        };
        handle_ui_command(state, surface, command);
        if let Some(error) = finished {
            return error;
        }
    }
    Some("Error: run ended without reporting".to_string())
}
