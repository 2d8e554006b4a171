//! Global hotkey support using rdev
//!
//! Captures keyboard events process-wide on a dedicated thread and feeds
//! them through a [`HotkeyMonitor`]. On macOS this requires Accessibility
//! permission for the terminal or app bundle running clue.

use super::{HotkeyEvent, HotkeyListener, HotkeyMonitor};
use crate::config::HotkeyConfig;
use crate::error::HotkeyError;
use rdev::{listen, Event, EventType, Key};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// rdev-based hotkey listener
pub struct RdevListener {
    action_key: Key,
    modifier_groups: Vec<Vec<Key>>,
    running: Arc<AtomicBool>,
    thread_handle: Option<std::thread::JoinHandle<()>>,
}

impl RdevListener {
    /// Create a new rdev listener for the configured hotkey
    pub fn new(config: &HotkeyConfig) -> Result<Self, HotkeyError> {
        let action_key = parse_key_name(&config.key)
            .ok_or_else(|| HotkeyError::UnknownKey(config.key.clone()))?;

        let modifier_groups = config
            .modifiers
            .iter()
            .map(|name| {
                parse_modifier_group(name).ok_or_else(|| HotkeyError::UnknownKey(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            "Hotkey resolved: action={:?}, modifiers={:?}",
            action_key,
            modifier_groups
        );

        Ok(Self {
            action_key,
            modifier_groups,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        })
    }
}

#[async_trait::async_trait]
impl HotkeyListener for RdevListener {
    async fn start(&mut self) -> Result<mpsc::Receiver<HotkeyEvent>, HotkeyError> {
        let (tx, rx) = mpsc::channel(32);
        let mut monitor = HotkeyMonitor::new(self.action_key, self.modifier_groups.clone());
        let running = self.running.clone();
        running.store(true, Ordering::SeqCst);

        let thread_handle = std::thread::Builder::new()
            .name("clue-hotkey".into())
            .spawn(move || {
                let callback = move |event: Event| {
                    if !running.load(Ordering::SeqCst) {
                        return;
                    }

                    match event.event_type {
                        EventType::KeyPress(key) => {
                            if let Some(hotkey_event) = monitor.on_key_down(&key) {
                                tracing::debug!("Hotkey triggered");
                                // Never block the OS event hook
                                if let Err(e) = tx.try_send(hotkey_event) {
                                    tracing::warn!("Dropping hotkey event: {}", e);
                                }
                            }
                        }
                        EventType::KeyRelease(key) => monitor.on_key_up(&key),
                        _ => {}
                    }
                };

                // Blocks until an error occurs or the process exits
                if let Err(e) = listen(callback) {
                    tracing::error!("rdev listen error: {:?}", e);
                    tracing::warn!(
                        "Global hotkey capture failed. On macOS grant Accessibility permission in \
                         System Settings > Privacy & Security > Accessibility. \
                         Alternatively bind `clue trigger` to a key in your desktop environment."
                    );
                }
            })
            .map_err(|e| HotkeyError::Listen(e.to_string()))?;

        self.thread_handle = Some(thread_handle);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), HotkeyError> {
        self.running.store(false, Ordering::SeqCst);
        // rdev has no way to break out of listen(); the thread ends with the process
        self.thread_handle.take();
        Ok(())
    }
}

/// Parse a modifier name into the physical keys that count as that modifier
///
/// Unsided names match both sides: `SHIFT` is left or right shift.
fn parse_modifier_group(name: &str) -> Option<Vec<Key>> {
    let keys = match name.to_uppercase().as_str() {
        "CMD" | "COMMAND" | "META" | "SUPER" | "WIN" => vec![Key::MetaLeft, Key::MetaRight],
        "SHIFT" => vec![Key::ShiftLeft, Key::ShiftRight],
        "CTRL" | "CONTROL" => vec![Key::ControlLeft, Key::ControlRight],
        "ALT" | "OPT" | "OPTION" => vec![Key::Alt, Key::AltGr],
        _ => vec![parse_key_name(name)?],
    };
    Some(keys)
}

/// Parse a key name string to an rdev Key
fn parse_key_name(name: &str) -> Option<Key> {
    match name.to_uppercase().as_str() {
        // Function keys
        "F1" => Some(Key::F1),
        "F2" => Some(Key::F2),
        "F3" => Some(Key::F3),
        "F4" => Some(Key::F4),
        "F5" => Some(Key::F5),
        "F6" => Some(Key::F6),
        "F7" => Some(Key::F7),
        "F8" => Some(Key::F8),
        "F9" => Some(Key::F9),
        "F10" => Some(Key::F10),
        "F11" => Some(Key::F11),
        "F12" => Some(Key::F12),

        // Sided modifiers
        "LEFTALT" | "LEFTOPT" | "LEFTOPTION" => Some(Key::Alt),
        "RIGHTALT" | "RIGHTOPT" | "RIGHTOPTION" => Some(Key::AltGr),
        "LEFTCTRL" | "LEFTCONTROL" => Some(Key::ControlLeft),
        "RIGHTCTRL" | "RIGHTCONTROL" => Some(Key::ControlRight),
        "LEFTSHIFT" => Some(Key::ShiftLeft),
        "RIGHTSHIFT" => Some(Key::ShiftRight),
        "LEFTMETA" | "LEFTCMD" | "LEFTCOMMAND" => Some(Key::MetaLeft),
        "RIGHTMETA" | "RIGHTCMD" | "RIGHTCOMMAND" => Some(Key::MetaRight),

        // Special keys
        "ESCAPE" | "ESC" => Some(Key::Escape),
        "SPACE" => Some(Key::Space),
        "TAB" => Some(Key::Tab),
        "ENTER" | "RETURN" => Some(Key::Return),
        "INSERT" => Some(Key::Insert),
        "PAUSE" => Some(Key::Pause),
        "SCROLLLOCK" => Some(Key::ScrollLock),
        "PRINTSCREEN" => Some(Key::PrintScreen),

        // Letters
        "A" => Some(Key::KeyA),
        "B" => Some(Key::KeyB),
        "C" => Some(Key::KeyC),
        "D" => Some(Key::KeyD),
        "E" => Some(Key::KeyE),
        "F" => Some(Key::KeyF),
        "G" => Some(Key::KeyG),
        "H" => Some(Key::KeyH),
        "I" => Some(Key::KeyI),
        "J" => Some(Key::KeyJ),
        "K" => Some(Key::KeyK),
        "L" => Some(Key::KeyL),
        "M" => Some(Key::KeyM),
        "N" => Some(Key::KeyN),
        "O" => Some(Key::KeyO),
        "P" => Some(Key::KeyP),
        "Q" => Some(Key::KeyQ),
        "R" => Some(Key::KeyR),
        "S" => Some(Key::KeyS),
        "T" => Some(Key::KeyT),
        "U" => Some(Key::KeyU),
        "V" => Some(Key::KeyV),
        "W" => Some(Key::KeyW),
        "X" => Some(Key::KeyX),
        "Y" => Some(Key::KeyY),
        "Z" => Some(Key::KeyZ),

        _ => None,
    }
}
