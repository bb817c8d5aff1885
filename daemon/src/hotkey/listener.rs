//! Listener thread body
//!
//! Creates the hidden surface, registers every live hotkey, reports the
//! outcome once over the init channel, then pumps surface messages and
//! dispatches callbacks until the surface is closed. Everything the OS was
//! given is handed back before the thread ends.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::events::ListenerEvent;
use crate::platform::{HotkeyId, Platform, Surface, SurfaceMessage, SurfaceRemote};
use crate::state::{ListenerStateMachine, Phase};

use super::error::{Error, Result};
use super::keys::Chord;
use super::registry::Registry;

/// Prefix of the strings turned into registration identifiers
pub const TOKEN_PREFIX: &str = "hotkeyd";

/// What the init channel carries: a handle to the running surface or the
/// reason the listener could not get there
pub(crate) type InitResult = Result<Arc<dyn SurfaceRemote>>;

/// How a listener thread ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerExit {
    /// The surface was closed and the loop ended normally
    Closed,
    /// Retrieving the next message failed
    QueueFailed(String),
    /// The listener never reached its event loop
    InitFailed(Error),
    /// The thread panicked outside a callback
    Panicked,
}

/// Token naming the identifier for a chord, e.g. `hotkeyd-00030051`
pub fn registration_token(chord: Chord) -> String {
    format!("{}-{:08X}", TOKEN_PREFIX, chord.packed())
}

/// Everything the listener thread needs, moved onto it at spawn
pub(crate) struct Listener {
    pub platform: Arc<dyn Platform>,
    pub registry: Arc<Mutex<Registry>>,
    pub machine: Arc<ListenerStateMachine>,
    pub visible: bool,
}

impl Listener {
    /// Run one listener session to completion.
    ///
    /// `init_tx` receives exactly one message.
    pub fn run(self, init_tx: Sender<InitResult>) -> ListenerExit {
        let mut surface = match self.platform.create_surface(self.visible) {
            Ok(surface) => surface,
            Err(e) => {
                error!(error = %e, "failed to create hotkey surface");
                self.machine.transition_to(Phase::Destroyed);
                let _ = init_tx.send(Err(e.clone()));
                return ListenerExit::InitFailed(e);
            }
        };
        self.machine.transition_to(Phase::Created);

        let (session, hotkeys) = match self.register_all(surface.as_mut()) {
            Ok(registered) => registered,
            Err(e) => {
                error!(error = %e, "hotkey registration failed");
                surface.destroy();
                self.machine.transition_to(Phase::Destroyed);
                let _ = init_tx.send(Err(e.clone()));
                return ListenerExit::InitFailed(e);
            }
        };

        self.machine.mark_running(hotkeys);
        info!(hotkeys, "hotkey listener running");
        let _ = init_tx.send(Ok(surface.remote()));

        let exit = self.event_loop(surface.as_mut());

        self.machine.transition_to(Phase::Terminating);
        self.teardown(surface.as_mut(), session);
        surface.destroy();
        self.machine.transition_to(Phase::Destroyed);
        info!(?exit, "hotkey listener stopped");
        exit
    }

    /// Register every live definition in index order. All or nothing.
    ///
    /// Returns the session the ids were recorded under and their count.
    fn register_all(&self, surface: &mut dyn Surface) -> Result<(u64, usize)> {
        let mut registry = self.registry.lock();
        let session = registry.begin_session();
        let live: Vec<(usize, Chord)> = registry
            .iter()
            .enumerate()
            .filter(|(_, def)| def.is_live())
            .map(|(index, def)| (index, def.chord()))
            .collect();

        let mut registered: Vec<usize> = Vec::with_capacity(live.len());
        for (index, chord) in live {
            let token = registration_token(chord);
            let reason = match self.platform.acquire_id(&token) {
                None => format!("no identifier available for {}", token),
                Some(id) => match surface.register(id, chord.modifiers, chord.key) {
                    Ok(()) => {
                        debug!(index, %chord, id, "hotkey registered");
                        registry.set_id(index, id);
                        registered.push(index);
                        continue;
                    }
                    Err(reason) => {
                        self.platform.release_id(id);
                        reason
                    }
                },
            };

            warn!(
                index,
                %chord,
                %reason,
                rollback = registered.len(),
                "rolling back hotkey registrations"
            );
            for done in registered.iter().rev() {
                if let Some(id) = registry.clear_id(*done) {
                    surface.unregister(id);
                    self.platform.release_id(id);
                }
            }
            return Err(Error::RegisterHotkey { chord, reason });
        }

        Ok((session, registered.len()))
    }

    fn event_loop(&self, surface: &mut dyn Surface) -> ListenerExit {
        loop {
            match surface.next_message() {
                SurfaceMessage::Hotkey(id) => self.dispatch(id),
                SurfaceMessage::Destroy => return ListenerExit::Closed,
                SurfaceMessage::Failed(reason) => {
                    warn!(%reason, "hotkey message retrieval failed");
                    return ListenerExit::QueueFailed(reason);
                }
            }
        }
    }

    fn dispatch(&self, id: HotkeyId) {
        let target = {
            let registry = self.registry.lock();
            registry
                .find_by_id(id)
                .map(|(index, def)| (index, def.chord(), def.dispatch_target()))
        };
        let Some((index, chord, (callback, param))) = target else {
            debug!(id, "ignoring hotkey with unknown id");
            return;
        };

        debug!(index, %chord, "dispatching hotkey");
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(&param))) {
            error!(
                index,
                %chord,
                panic = panic_message(payload.as_ref()),
                "hotkey callback panicked"
            );
        }
        self.machine.emit(ListenerEvent::HotkeyFired {
            index,
            chord: chord.to_string(),
        });
    }

    /// Unregister and release every id this session still has recorded,
    /// orphans included. Ids of a later session are left alone.
    fn teardown(&self, surface: &mut dyn Surface, session: u64) {
        let ids = self.registry.lock().drain_session(session);
        debug!(session, count = ids.len(), "releasing hotkey registrations");
        for id in ids {
            surface.unregister(id);
            self.platform.release_id(id);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
