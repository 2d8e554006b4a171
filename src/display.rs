//! Display surface for notifications and responses
//!
//! Display calls happen only on the UI context (the daemon's event loop).
//! Background runs never touch the surface directly; they send
//! [`UiCommand`]s over a channel and the loop applies them in order.

use crate::notification;
use crate::render::{Line, Style};
use crate::state::Phase;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Title of a normal response window
pub const TITLE: &str = "Clue";

/// Title of a failed run's window
pub const ERROR_TITLE: &str = "Clue - Error";

/// Message posted while the backend is working
pub const ANALYZING: &str = "Analyzing...";

/// Where notifications and rendered responses go
pub trait DisplaySurface {
    /// Post a transient indicator; does not block
    fn show_notification(&mut self, text: &str, thumbnail: Option<&Path>);

    /// Show a rendered response, replacing any notification
    fn show_response(&mut self, title: &str, lines: &[Line]);

    /// Remove the notification. A no-op when nothing is shown.
    fn hide(&mut self);
}

/// Message from a background run to the UI context
#[derive(Debug, Clone, PartialEq)]
pub enum UiCommand {
    ShowNotification {
        text: String,
        thumbnail: Option<PathBuf>,
    },
    ShowResponse {
        title: String,
        lines: Vec<Line>,
    },
    Hide,
    /// The run entered a new step
    Phase(Phase),
    /// The run is over; `error` is set if it failed
    Finished { error: Option<String> },
}

/// Sending half of the UI channel, one clone per run
pub type UiSender = mpsc::UnboundedSender<UiCommand>;

/// Apply a display command to `surface`
///
/// Returns false for bookkeeping messages the surface does not handle.
pub fn apply(surface: &mut dyn DisplaySurface, command: &UiCommand) -> bool {
    match command {
        UiCommand::ShowNotification { text, thumbnail } => {
            surface.show_notification(text, thumbnail.as_deref())
        }
        UiCommand::ShowResponse { title, lines } => surface.show_response(title, lines),
        UiCommand::Hide => surface.hide(),
        UiCommand::Phase(_) | UiCommand::Finished { .. } => return false,
    }
    true
}

/// Prints responses to a terminal and posts desktop notifications
pub struct TerminalSurface<W: Write> {
    out: W,
    color: bool,
    desktop_notifications: bool,
    /// A status line is on screen and not yet cleared
    notification_visible: bool,
}

impl TerminalSurface<std::io::Stdout> {
    /// Surface on stdout, colored when stdout is a terminal
    pub fn stdout() -> Self {
        use std::io::IsTerminal;
        let color = std::io::stdout().is_terminal();
        Self::new(std::io::stdout(), color, true)
    }
}

impl<W: Write> TerminalSurface<W> {
    pub fn new(out: W, color: bool, desktop_notifications: bool) -> Self {
        Self {
            out,
            color,
            desktop_notifications,
            notification_visible: false,
        }
    }

    pub fn is_notification_visible(&self) -> bool {
        self.notification_visible
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_styled(&mut self, style: Style, text: &str) -> std::io::Result<()> {
        match (self.color, ansi_code(style)) {
            (true, Some(code)) => write!(self.out, "\x1b[{}m{}\x1b[0m", code, text),
            _ => write!(self.out, "{}", text),
        }
    }

    fn write_response(&mut self, title: &str, lines: &[Line]) -> std::io::Result<()> {
        let title_style = if title == ERROR_TITLE { Style::Bold } else { Style::H1 };
        self.write_styled(title_style, title)?;
        writeln!(self.out)?;
        writeln!(self.out)?;

        for line in lines {
            for segment in line {
                self.write_styled(segment.style, &segment.text)?;
            }
            writeln!(self.out)?;
        }

        writeln!(self.out)?;
        self.out.flush()
    }
}

/// SGR parameters for each style; plain text is left alone
fn ansi_code(style: Style) -> Option<&'static str> {
    match style {
        Style::Plain => None,
        Style::H1 => Some("1;4;97"),
        Style::H2 => Some("1;97"),
        Style::H3 => Some("1"),
        Style::Bold => Some("1"),
        Style::Italic => Some("3"),
        Style::InlineCode => Some("36"),
        Style::CodeBlock => Some("32"),
    }
}

impl<W: Write> DisplaySurface for TerminalSurface<W> {
    fn show_notification(&mut self, text: &str, thumbnail: Option<&Path>) {
        tracing::info!("{}", text);

        if self.desktop_notifications {
            notification::send(TITLE, text, thumbnail);
        }

        let written = if self.color {
            write!(self.out, "\r\x1b[2K\x1b[2m{}\x1b[0m", text)
        } else {
            write!(self.out, "{}", text)
        };
        if let Err(e) = written.and_then(|()| self.out.flush()) {
            tracing::debug!("Failed to write status line: {}", e);
        }
        self.notification_visible = true;
    }

    fn show_response(&mut self, title: &str, lines: &[Line]) {
        self.hide();
        if let Err(e) = self.write_response(title, lines) {
            tracing::warn!("Failed to write response: {}", e);
        }
    }

    fn hide(&mut self) {
        if !self.notification_visible {
            return;
        }
        self.notification_visible = false;

        let cleared = if self.color {
            write!(self.out, "\r\x1b[2K")
        } else {
            writeln!(self.out)
        };
        if let Err(e) = cleared.and_then(|()| self.out.flush()) {
            tracing::debug!("Failed to clear status line: {}", e);
        }
    }
}
