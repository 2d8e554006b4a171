//! Hotkey detection module
//!
//! [`HotkeyMonitor`] is the edge-detection state machine: it tracks which
//! modifier groups are held and reports a trigger when the action key goes
//! down while every group is held. It is independent of any key source so
//! it can be driven by the rdev listener or by tests.
//!
//! The production listener uses rdev, which works on macOS (Accessibility
//! permission required), X11 and Windows.

pub mod rdev_listener;

use crate::config::HotkeyConfig;
use crate::error::HotkeyError;
use tokio::sync::mpsc;

/// Events emitted by the hotkey listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyEvent {
    /// Action key pressed while all modifiers were held
    Triggered,
}

/// A modifier and whether it is currently held
///
/// A group matches several physical keys, e.g. left and right shift.
#[derive(Debug, Clone)]
struct ModifierGroup<K> {
    keys: Vec<K>,
    held: bool,
}

/// Modifier tracking and trigger detection for one key combination
#[derive(Debug, Clone)]
pub struct HotkeyMonitor<K> {
    action: K,
    modifiers: Vec<ModifierGroup<K>>,
}

impl<K: PartialEq> HotkeyMonitor<K> {
    /// Create a monitor for `action` pressed while each group in `modifiers` is held
    pub fn new(action: K, modifiers: Vec<Vec<K>>) -> Self {
        Self {
            action,
            modifiers: modifiers
                .into_iter()
                .map(|keys| ModifierGroup { keys, held: false })
                .collect(),
        }
    }

    /// Feed a key-down event
    ///
    /// Repeated downs on a held modifier are no-ops. Platform auto-repeat of
    /// the action key is not filtered, so each delivered down can trigger.
    pub fn on_key_down(&mut self, key: &K) -> Option<HotkeyEvent> {
        if let Some(group) = self.group_mut(key) {
            group.held = true;
            return None;
        }

        if *key == self.action && self.modifiers_held() {
            return Some(HotkeyEvent::Triggered);
        }

        None
    }

    /// Feed a key-up event
    pub fn on_key_up(&mut self, key: &K) {
        if let Some(group) = self.group_mut(key) {
            group.held = false;
        }
    }

    /// True when every modifier group is currently held
    pub fn modifiers_held(&self) -> bool {
        self.modifiers.iter().all(|g| g.held)
    }

    /// Held flags, in configuration order
    pub fn held(&self) -> Vec<bool> {
        self.modifiers.iter().map(|g| g.held).collect()
    }

    fn group_mut(&mut self, key: &K) -> Option<&mut ModifierGroup<K>> {
        self.modifiers.iter_mut().find(|g| g.keys.contains(key))
    }
}

/// Trait for hotkey detection implementations
#[async_trait::async_trait]
pub trait HotkeyListener: Send {
    /// Start listening for hotkey events
    /// Returns a channel receiver for events
    async fn start(&mut self) -> Result<mpsc::Receiver<HotkeyEvent>, HotkeyError>;

    /// Stop listening and clean up
    async fn stop(&mut self) -> Result<(), HotkeyError>;
}

/// Factory function to create the hotkey listener
pub fn create_listener(config: &HotkeyConfig) -> Result<Box<dyn HotkeyListener>, HotkeyError> {
    Ok(Box::new(rdev_listener::RdevListener::new(config)?))
}
