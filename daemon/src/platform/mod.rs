//! Operating-system primitives needed by the hotkey listener
//!
//! The listener only talks to the host through the traits in this module:
//! a `Platform` creates message surfaces and hands out process-wide unique
//! identifiers, a `Surface` binds key combinations and yields messages on
//! the listener thread, and a `SurfaceRemote` lets other threads reach a
//! running surface.
//!
//! - Windows: hidden window + `RegisterHotKey` + global atoms
//! - Everywhere: an in-process simulated desktop (`sim`)

use std::sync::Arc;

use crate::hotkey::{Modifiers, Result};

pub mod sim;

#[cfg(target_os = "windows")]
pub mod windows;

/// Identifier binding a surface and a key combination (a global atom on Windows)
pub type HotkeyId = u16;

/// Messages delivered to a surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceMessage {
    /// A registered hotkey was pressed
    Hotkey(HotkeyId),
    /// The surface was destroyed and the loop should end
    Destroy,
    /// Retrieving the next message failed
    Failed(String),
}

/// Factory for message surfaces and owner of the identifier table
pub trait Platform: Send + Sync {
    /// Register the surface class (tolerating an existing registration) and
    /// create one hidden surface. Must be called on the thread that will
    /// pump the surface's messages.
    fn create_surface(&self, visible: bool) -> Result<Box<dyn Surface>>;

    /// Obtain the unique identifier for `token`, creating it or finding an
    /// existing one.
    fn acquire_id(&self, token: &str) -> Option<HotkeyId>;

    /// Release one reference to an identifier obtained from `acquire_id`.
    fn release_id(&self, id: HotkeyId);
}

/// A message-receiving surface owned by the listener thread
pub trait Surface {
    /// Bind `id` to this surface for the given combination.
    fn register(&mut self, id: HotkeyId, modifiers: Modifiers, key: u16)
        -> std::result::Result<(), String>;

    /// Remove a binding made by `register`.
    fn unregister(&mut self, id: HotkeyId);

    /// Block until the next message addressed to this surface.
    fn next_message(&mut self) -> SurfaceMessage;

    /// Handle usable from other threads
    fn remote(&self) -> Arc<dyn SurfaceRemote>;

    /// Destroy the surface and unregister its class.
    fn destroy(self: Box<Self>);
}

/// Cross-thread handle to a running surface
pub trait SurfaceRemote: Send + Sync {
    /// Best-effort unregistration from a foreign thread
    fn unregister(&self, id: HotkeyId) -> bool;

    /// Ask the surface to close; its loop then receives `Destroy`.
    fn request_close(&self);
}

/// The native backend for this host
pub fn native() -> Result<Arc<dyn Platform>> {
    #[cfg(target_os = "windows")]
    {
        Ok(Arc::new(windows::Win32Platform::new()))
    }

    #[cfg(not(target_os = "windows"))]
    {
        Err(crate::hotkey::Error::Unsupported)
    }
}
