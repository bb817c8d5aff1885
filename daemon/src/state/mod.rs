//! Listener phase state machine
//!
//! Tracks one listener session through its phases:
//! - NotCreated: worker spawned, no surface yet
//! - Created: hidden surface exists
//! - Running: every live hotkey registered, event loop active
//! - Terminating: stop requested or loop ended
//! - Destroyed: registrations released, surface gone

mod machine;

pub use machine::{ListenerStateMachine, Phase};
