//! Process-level lifecycle: the cross-process guard and shutdown signals

mod guard;
mod shutdown;

pub use guard::{ProcessGuard, DEFAULT_GUARD_NAME};
pub use shutdown::ShutdownSignal;
