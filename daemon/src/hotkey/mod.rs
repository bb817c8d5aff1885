//! Global hotkey registration and dispatch
//!
//! A `HotkeyHandler` owns a registry of key combinations and runs a
//! listener thread that binds them with the OS and invokes their callbacks
//! when pressed.

mod error;
mod handler;
mod keys;
mod listener;
mod registry;

pub use error::{Error, Result, Status};
pub use handler::{HotkeyHandler, StopOutcome, DEFAULT_GRACE_PERIOD, LISTENER_THREAD_NAME};
pub use keys::{
    flags_to_modifiers, key_code_for_char, modifiers_to_flags, Chord, HotkeyFlags, Modifiers,
};
pub use listener::{registration_token, ListenerExit, TOKEN_PREFIX};
pub use registry::{Callback, HotkeyDefinition, Registry};
