//! Listener phase tracking
//!
//! Every listener session walks NotCreated -> Created -> Running ->
//! Terminating -> Destroyed, or drops straight to Destroyed when surface
//! creation or the registration sweep fails. The machine is shared between
//! the listener thread, which drives it, and the controller, which reads it
//! and marks the session Terminating when it asks the listener to stop.

use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::events::ListenerEvent;

/// Phases of a listener session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Thread spawned, no surface yet
    #[default]
    NotCreated,
    /// Surface exists, hotkeys not yet registered
    Created,
    /// All hotkeys registered, event loop running
    Running,
    /// Asked to stop or event loop ended, releasing registrations
    Terminating,
    /// Surface gone, nothing registered
    Destroyed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::NotCreated => write!(f, "NotCreated"),
            Phase::Created => write!(f, "Created"),
            Phase::Running => write!(f, "Running"),
            Phase::Terminating => write!(f, "Terminating"),
            Phase::Destroyed => write!(f, "Destroyed"),
        }
    }
}

impl Phase {
    /// Whether `next` may follow this phase
    pub fn can_transition_to(self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Phase::NotCreated, Phase::Created)
                | (Phase::NotCreated, Phase::Destroyed)
                | (Phase::Created, Phase::Running)
                | (Phase::Created, Phase::Destroyed)
                | (Phase::Running, Phase::Terminating)
                | (Phase::Running, Phase::Destroyed)
                | (Phase::Terminating, Phase::Destroyed)
        )
    }
}

struct Inner {
    phase: Phase,
    entered_at: Instant,
}

/// Phase machine for one listener session
pub struct ListenerStateMachine {
    inner: Mutex<Inner>,
    /// Channel for emitting listener events
    event_tx: broadcast::Sender<ListenerEvent>,
}

impl ListenerStateMachine {
    /// Create a new machine in NotCreated
    pub fn new(event_tx: broadcast::Sender<ListenerEvent>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                phase: Phase::NotCreated,
                entered_at: Instant::now(),
            }),
            event_tx,
        }
    }

    /// Get the current phase
    pub fn phase(&self) -> Phase {
        self.inner.lock().phase
    }

    /// Move to `next`. Returns whether the phase changed.
    ///
    /// Staying in the same phase is a silent no-op; any other transition
    /// that is not allowed is logged and ignored.
    pub fn transition_to(&self, next: Phase) -> bool {
        let mut inner = self.inner.lock();
        let prev = inner.phase;
        if prev == next {
            return false;
        }
        if !prev.can_transition_to(next) {
            warn!(from = %prev, to = %next, "invalid listener phase transition ignored");
            return false;
        }

        let duration_ms = inner.entered_at.elapsed().as_millis() as u64;
        info!(from = %prev, to = %next, duration_ms, "listener phase transition");
        inner.phase = next;
        inner.entered_at = Instant::now();
        drop(inner);

        if next == Phase::Destroyed && matches!(prev, Phase::Running | Phase::Terminating) {
            self.emit(ListenerEvent::Stopped);
        }
        true
    }

    /// Enter Running after a sweep that registered `hotkeys` entries
    pub fn mark_running(&self, hotkeys: usize) -> bool {
        let changed = self.transition_to(Phase::Running);
        if changed {
            self.emit(ListenerEvent::Started { hotkeys });
        }
        changed
    }

    /// Emit an event to any subscribers
    pub fn emit(&self, event: ListenerEvent) {
        debug!(%event, "emitting listener event");
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_state_machine() -> (ListenerStateMachine, broadcast::Receiver<ListenerEvent>) {
        let (tx, rx) = broadcast::channel(16);
        (ListenerStateMachine::new(tx), rx)
    }

    #[test]
    fn test_initial_phase() {
        let (sm, _) = create_state_machine();
        assert_eq!(sm.phase(), Phase::NotCreated);
    }

    #[test]
    fn test_full_session() {
        let (sm, mut rx) = create_state_machine();
        assert!(sm.transition_to(Phase::Created));
        assert!(sm.mark_running(2));
        assert!(sm.transition_to(Phase::Terminating));
        assert!(sm.transition_to(Phase::Destroyed));

        assert_eq!(rx.try_recv().unwrap(), ListenerEvent::Started { hotkeys: 2 });
        assert_eq!(rx.try_recv().unwrap(), ListenerEvent::Stopped);
    }

    #[test]
    fn test_failed_sweep_emits_nothing() {
        let (sm, mut rx) = create_state_machine();
        assert!(sm.transition_to(Phase::Created));
        assert!(sm.transition_to(Phase::Destroyed));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_same_phase_is_noop() {
        let (sm, _) = create_state_machine();
        sm.transition_to(Phase::Created);
        assert!(!sm.transition_to(Phase::Created));
        assert_eq!(sm.phase(), Phase::Created);
    }

    #[test]
    fn test_invalid_transitions_ignored() {
        let (sm, _) = create_state_machine();
        assert!(!sm.transition_to(Phase::Running));
        assert!(!sm.transition_to(Phase::Terminating));
        assert_eq!(sm.phase(), Phase::NotCreated);

        sm.transition_to(Phase::Destroyed);
        assert!(!sm.transition_to(Phase::Created));
        assert_eq!(sm.phase(), Phase::Destroyed);
    }

    #[test]
    fn test_emit_without_subscribers() {
        let (tx, rx) = broadcast::channel(4);
        drop(rx);
        let sm = ListenerStateMachine::new(tx);
        sm.emit(ListenerEvent::Stopped);
    }
}
