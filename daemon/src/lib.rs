//! hotkeyd: global hotkey registration and dispatch
//!
//! - `hotkey`: registry, listener thread and the `HotkeyHandler` controller
//! - `platform`: OS surfaces (Win32) and an in-process simulated desktop
//! - `lifecycle`: cross-process guard and shutdown signals
//! - `state` / `events`: listener phases and broadcast notifications
//! - `config` / `tasks`: the daemon's task file and the actions it binds

pub mod config;
pub mod events;
pub mod hotkey;
pub mod lifecycle;
pub mod platform;
pub mod state;
pub mod tasks;
