//! State machine for a clue pipeline run
//!
//! Idle → Capturing → Notifying → Analyzing → Rendering → Idle,
//! or → Error → Idle from any step.

use std::time::Instant;

/// Application state
#[derive(Debug, Clone, PartialEq)]
pub enum State {
    /// Waiting for hotkey press
    Idle,

    /// Screenshot tool running
    Capturing {
        /// When the run started
        started_at: Instant,
    },

    /// "Analyzing..." indicator being posted
    Notifying { started_at: Instant },

    /// Waiting on the backend
    Analyzing { started_at: Instant },

    /// Formatting and displaying the response
    Rendering { started_at: Instant },

    /// Run failed; the error is on screen
    Error { message: String },
}

/// Step of a run without its data, as reported by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Capturing,
    Notifying,
    Analyzing,
    Rendering,
}

impl State {
    /// Create a new idle state
    pub fn new() -> Self {
        State::Idle
    }

    /// Check if in idle state
    pub fn is_idle(&self) -> bool {
        matches!(self, State::Idle)
    }

    /// Check if a run is in progress
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            State::Capturing { .. }
                | State::Notifying { .. }
                | State::Analyzing { .. }
                | State::Rendering { .. }
        )
    }

    /// Enter `phase`, keeping the run's start time
    pub fn advance(&self, phase: Phase) -> State {
        let started_at = self.started_at().unwrap_or_else(Instant::now);
        match phase {
            Phase::Capturing => State::Capturing { started_at },
            Phase::Notifying => State::Notifying { started_at },
            Phase::Analyzing => State::Analyzing { started_at },
            Phase::Rendering => State::Rendering { started_at },
        }
    }

    /// Start time of the current run, if one is in progress
    pub fn started_at(&self) -> Option<Instant> {
        match self {
            State::Capturing { started_at }
            | State::Notifying { started_at }
            | State::Analyzing { started_at }
            | State::Rendering { started_at } => Some(*started_at),
            State::Idle | State::Error { .. } => None,
        }
    }

    /// Lowercase name written to the state file
    pub fn name(&self) -> &'static str {
        match self {
            State::Idle => "idle",
            State::Capturing { .. } => "capturing",
            State::Notifying { .. } => "notifying",
            State::Analyzing { .. } => "analyzing",
            State::Rendering { .. } => "rendering",
            State::Error { .. } => "error",
        }
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::Idle => write!(f, "Idle"),
            State::Capturing { .. } => write!(f, "Capturing"),
            State::Notifying { .. } => write!(f, "Notifying"),
            State::Analyzing { started_at } => {
                write!(f, "Analyzing ({:.1}s)", started_at.elapsed().as_secs_f32())
            }
            State::Rendering { .. } => write!(f, "Rendering"),
            State::Error { message } => {
                // Use chars() to handle multi-byte UTF-8 characters
                let preview = if message.chars().count() > 40 {
                    format!("{}...", message.chars().take(40).collect::<String>())
                } else {
                    message.clone()
                };
                write!(f, "Error: {}", preview)
            }
        }
    }
}
