//! Lifecycle controller owning the registry and the listener thread
//!
//! `start` spawns the listener and blocks until it reports whether every
//! hotkey was registered. `stop` asks it to close and waits a bounded time
//! for it to exit. Both run under the cross-process guard so concurrent
//! controllers never interleave their launch and shutdown sequences.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::events::ListenerEvent;
use crate::lifecycle::{ProcessGuard, DEFAULT_GUARD_NAME};
use crate::platform::{self, Platform, SurfaceRemote};
use crate::state::{ListenerStateMachine, Phase};

use super::error::{Error, Result};
use super::keys::Modifiers;
use super::listener::{Listener, ListenerExit};
use super::registry::{Callback, Registry};

/// How long `stop` waits for the listener before detaching it
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(3);

/// Name of the listener thread
pub const LISTENER_THREAD_NAME: &str = "hotkey-listener";

const EVENT_CAPACITY: usize = 64;

/// Result of a `stop` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing was running
    NotStarted,
    /// The listener exited within the grace period
    Stopped(ListenerExit),
    /// The listener did not exit in time and was left to finish on its own
    Detached,
}

struct Session {
    worker: JoinHandle<()>,
    exit_rx: Receiver<ListenerExit>,
    remote: Arc<dyn SurfaceRemote>,
    machine: Arc<ListenerStateMachine>,
}

/// Global hotkey handler
pub struct HotkeyHandler {
    platform: Arc<dyn Platform>,
    registry: Arc<Mutex<Registry>>,
    guard_name: String,
    grace_period: Duration,
    debug: bool,
    context: Option<String>,
    session: Option<Session>,
    /// Phase machine of the most recent session
    machine: Option<Arc<ListenerStateMachine>>,
    event_tx: broadcast::Sender<ListenerEvent>,
}

impl HotkeyHandler {
    /// Create a handler backed by `platform`
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            platform,
            registry: Arc::new(Mutex::new(Registry::new())),
            guard_name: DEFAULT_GUARD_NAME.to_string(),
            grace_period: DEFAULT_GRACE_PERIOD,
            debug: false,
            context: None,
            session: None,
            machine: None,
            event_tx,
        }
    }

    /// Create a handler on the host's native backend
    pub fn native() -> Result<Self> {
        Ok(Self::new(platform::native()?))
    }

    /// Use a different cross-process guard
    pub fn with_guard_name(mut self, name: impl Into<String>) -> Self {
        self.guard_name = name.into();
        self
    }

    /// Change how long `stop` waits for the listener
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Show the listener's surface instead of hiding it
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Add a hotkey definition and return its index.
    ///
    /// Meant to be called before `start` or after `stop`; a running listener
    /// only picks up changes on its next session.
    pub fn insert(
        &self,
        modifiers: Modifiers,
        key: u16,
        callback: Callback,
        param: impl Into<String>,
    ) -> usize {
        let param = param.into();
        let index = self.registry.lock().insert(modifiers, key, callback, param);
        debug!(index, %modifiers, key, "hotkey inserted");
        index
    }

    /// Delete the definition at `index`
    pub fn remove(&self, index: usize) -> Result<()> {
        self.registry.lock().remove(index)?;
        debug!(index, "hotkey removed");
        Ok(())
    }

    /// Index of the live definition for a combination
    pub fn find(&self, modifiers: Modifiers, key: u16) -> Option<usize> {
        self.registry.lock().find_by_chord(modifiers, key)
    }

    /// Lock the registry for inspection
    pub fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock()
    }

    /// Receive listener events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ListenerEvent> {
        self.event_tx.subscribe()
    }

    /// Whether a listener session is active
    pub fn is_started(&self) -> bool {
        self.session.is_some()
    }

    /// Phase of the current or most recent listener session
    pub fn phase(&self) -> Phase {
        self.machine
            .as_ref()
            .map(|machine| machine.phase())
            .unwrap_or_default()
    }

    /// Context passed to the `start` call that began the current session
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Launch the listener and register every live hotkey.
    ///
    /// Returns once the listener reports the outcome of its registration
    /// sweep. Calling it while started is a no-op. On failure nothing stays
    /// registered and the handler may be started again.
    pub fn start(&mut self, context: Option<String>) -> Result<()> {
        if self.session.is_some() {
            debug!("hotkey listener already started");
            return Ok(());
        }

        let live = self.registry.lock().live_count();
        if live == 0 {
            warn!("no hotkeys defined, not starting listener");
            return Err(Error::NoEntry);
        }

        let _guard = ProcessGuard::acquire(&self.guard_name)?;

        let machine = Arc::new(ListenerStateMachine::new(self.event_tx.clone()));
        self.machine = Some(Arc::clone(&machine));
        let listener = Listener {
            platform: Arc::clone(&self.platform),
            registry: Arc::clone(&self.registry),
            machine: Arc::clone(&machine),
            visible: self.debug,
        };

        let (init_tx, init_rx) = bounded(1);
        let (exit_tx, exit_rx) = bounded(1);
        let worker = thread::Builder::new()
            .name(LISTENER_THREAD_NAME.to_string())
            .spawn(move || {
                let exit = listener.run(init_tx);
                let _ = exit_tx.send(exit);
            })
            .map_err(|e| Error::ListenerLaunch(e.to_string()))?;

        match init_rx.recv() {
            Ok(Ok(remote)) => {
                info!(hotkeys = live, context = ?context, "hotkey listener started");
                self.context = context;
                self.session = Some(Session {
                    worker,
                    exit_rx,
                    remote,
                    machine,
                });
                Ok(())
            }
            Ok(Err(e)) => {
                if worker.join().is_err() {
                    warn!("hotkey listener panicked after reporting failure");
                }
                Err(e)
            }
            Err(_) => {
                let _ = worker.join();
                error!("hotkey listener exited without reporting initialization");
                Err(Error::Internal(
                    "listener exited without reporting initialization".into(),
                ))
            }
        }
    }

    /// Stop the listener and release its registrations.
    ///
    /// Waits up to the grace period for the listener to exit. A listener
    /// that does not is detached rather than killed; it finishes its
    /// teardown whenever its surface is finally closed.
    pub fn stop(&mut self) -> Result<StopOutcome> {
        let Some(session) = self.session.take() else {
            debug!("hotkey listener not started");
            return Ok(StopOutcome::NotStarted);
        };

        let _guard = match ProcessGuard::acquire(&self.guard_name) {
            Ok(guard) => guard,
            Err(e) => {
                self.session = Some(session);
                return Err(e);
            }
        };

        self.release_registrations(session.remote.as_ref());
        if session.machine.phase() == Phase::Running {
            session.machine.transition_to(Phase::Terminating);
        }
        session.remote.request_close();

        let Session {
            worker, exit_rx, ..
        } = session;
        let outcome = match exit_rx.recv_timeout(self.grace_period) {
            Ok(exit) => {
                if worker.join().is_err() {
                    warn!("hotkey listener panicked after reporting exit");
                }
                StopOutcome::Stopped(exit)
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = worker.join();
                StopOutcome::Stopped(ListenerExit::Panicked)
            }
            Err(RecvTimeoutError::Timeout) => {
                error!(
                    grace_ms = self.grace_period.as_millis() as u64,
                    "hotkey listener did not exit in time, detaching it"
                );
                drop(worker);
                StopOutcome::Detached
            }
        };

        self.context = None;
        info!(?outcome, "hotkey listener stopped");
        Ok(outcome)
    }

    /// Unregister what can be unregistered from this thread. Whatever
    /// fails stays recorded for the listener's own teardown.
    fn release_registrations(&self, remote: &dyn SurfaceRemote) {
        let mut registry = self.registry.lock();
        for index in registry.registered_indices() {
            let Some(id) = registry.get(index).and_then(|def| def.registration_id()) else {
                continue;
            };
            if remote.unregister(id) {
                self.platform.release_id(id);
                registry.clear_id(index);
            } else {
                debug!(
                    index,
                    id,
                    "unregister from caller thread failed, deferring to listener"
                );
            }
        }
    }
}

impl Drop for HotkeyHandler {
    fn drop(&mut self) {
        if self.session.is_none() {
            return;
        }
        match self.stop() {
            Ok(outcome) => debug!(?outcome, "hotkey handler dropped while started"),
            Err(e) => warn!(error = %e, "failed to stop hotkey listener on drop"),
        }
    }
}
