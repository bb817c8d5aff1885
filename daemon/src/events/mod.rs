//! Events module for listener activity
//!
//! Provides structured notifications for listener start/stop and hotkey
//! dispatch. Events are broadcast; nobody has to listen.

use serde::{Deserialize, Serialize};

/// Events emitted by the hotkey handler and its listener thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ListenerEvent {
    /// Every live hotkey was registered and the event loop is running
    Started {
        /// Number of hotkeys registered by the sweep
        hotkeys: usize,
    },

    /// A registered hotkey was pressed and its callback invoked
    HotkeyFired {
        /// Registry index of the definition
        index: usize,
        /// Human-readable combination, e.g. `Ctrl+Alt+Q`
        chord: String,
    },

    /// The listener released its registrations and exited
    Stopped,
}

impl std::fmt::Display for ListenerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerEvent::Started { hotkeys } => {
                write!(f, "LISTENER_STARTED ({} hotkeys)", hotkeys)
            }
            ListenerEvent::HotkeyFired { index, chord } => {
                write!(f, "HOTKEY_FIRED #{} {}", index, chord)
            }
            ListenerEvent::Stopped => write!(f, "LISTENER_STOPPED"),
        }
    }
}
