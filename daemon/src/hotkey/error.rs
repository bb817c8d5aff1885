//! Error types for hotkey registration and dispatch

use std::fmt;

use super::keys::Chord;

/// Convenient result type for the hotkey core
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while starting, stopping or mutating the handler
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("failed to register hotkey window class: {0}")]
    Class(String),

    #[error("failed to create hotkey window: {0}")]
    Window(String),

    #[error("no hotkey entry found")]
    NoEntry,

    #[error("failed to register hotkey {chord}: {reason}")]
    RegisterHotkey { chord: Chord, reason: String },

    #[error("failed to launch listener thread: {0}")]
    ListenerLaunch(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("global hotkeys are not supported on this platform")]
    Unsupported,
}

/// Status taxonomy with stable numeric codes, used in logs and exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok = 0,
    ClassError = 1,
    WindowError = 2,
    NoEntry = 3,
    RegHotkeyError = 4,
    ListenerLaunchError = 5,
    Internal = 6,
}

impl Status {
    /// Numeric code of this status
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

impl Error {
    /// Map this error onto the status taxonomy
    pub fn status(&self) -> Status {
        match self {
            Error::Class(_) => Status::ClassError,
            Error::Window(_) => Status::WindowError,
            Error::NoEntry => Status::NoEntry,
            Error::RegisterHotkey { .. } => Status::RegHotkeyError,
            Error::ListenerLaunch(_) => Status::ListenerLaunchError,
            Error::Internal(_) | Error::Unsupported => Status::Internal,
        }
    }
}

impl<T> From<&Result<T>> for Status {
    fn from(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Status::Ok,
            Err(e) => e.status(),
        }
    }
}
