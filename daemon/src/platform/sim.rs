//! In-process simulated desktop
//!
//! Behaves like a tiny window system: a system-wide table of bound key
//! combinations shared by every surface, a reference-counted identifier
//! table, and one message queue per surface. Faults can be injected at each
//! step so the listener's failure paths can be exercised without a real OS.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::hotkey::{Chord, Error, Modifiers, Result};

use super::{HotkeyId, Platform, Surface, SurfaceMessage, SurfaceRemote};

/// First identifier handed out, matching the string-atom range on Windows
const FIRST_ID: HotkeyId = 0xC000;

/// Shared simulated desktop. Clones refer to the same desktop.
#[derive(Clone, Default)]
pub struct SimulatedDesktop {
    inner: Arc<Mutex<Desktop>>,
}

#[derive(Default)]
struct Desktop {
    next_surface: u64,
    surfaces: HashMap<u64, SurfaceEntry>,
    bindings: HashMap<Chord, (u64, HotkeyId)>,
    foreign: HashSet<Chord>,
    atoms: HashMap<String, (HotkeyId, usize)>,
    next_atom: HotkeyId,
    class_registered: bool,
    surfaces_created: usize,
    leaked_bindings: usize,
    registration_attempts: usize,
    faults: Faults,
}

struct SurfaceEntry {
    tx: Sender<SurfaceMessage>,
    visible: bool,
}

#[derive(Default)]
struct Faults {
    class: bool,
    window: bool,
    registration_at: Option<usize>,
    ignore_close: bool,
    remote_unregister: bool,
}

impl SimulatedDesktop {
    /// Create an empty desktop
    pub fn new() -> Self {
        Self::default()
    }

    /// Press a key combination. Returns whether a surface received it.
    pub fn press(&self, modifiers: Modifiers, key: u16) -> bool {
        let target = {
            let desk = self.inner.lock();
            desk.bindings
                .get(&Chord::new(modifiers, key))
                .and_then(|(surface, id)| desk.surfaces.get(surface).map(|s| (s.tx.clone(), *id)))
        };
        match target {
            Some((tx, id)) => {
                trace!(%id, "simulated hotkey press");
                tx.send(SurfaceMessage::Hotkey(id)).is_ok()
            }
            None => false,
        }
    }

    /// Deliver a raw hotkey message carrying `id` to every surface.
    pub fn inject(&self, id: HotkeyId) -> usize {
        self.broadcast(SurfaceMessage::Hotkey(id))
    }

    /// Make every surface's message retrieval fail once.
    pub fn break_message_queues(&self) -> usize {
        self.broadcast(SurfaceMessage::Failed("simulated message queue failure".into()))
    }

    /// Close every surface, even when close requests are being ignored.
    pub fn close_all(&self) -> usize {
        self.broadcast(SurfaceMessage::Destroy)
    }

    /// Pretend another process holds a binding for this combination.
    pub fn occupy(&self, modifiers: Modifiers, key: u16) {
        self.inner.lock().foreign.insert(Chord::new(modifiers, key));
    }

    /// Release a combination taken with `occupy`.
    pub fn vacate(&self, modifiers: Modifiers, key: u16) {
        self.inner.lock().foreign.remove(&Chord::new(modifiers, key));
    }

    /// Fail surface class registration
    pub fn fail_class(&self, fail: bool) {
        self.inner.lock().faults.class = fail;
    }

    /// Fail surface creation
    pub fn fail_window(&self, fail: bool) {
        self.inner.lock().faults.window = fail;
    }

    /// Fail the `n`th registration attempt counted from now (1-based).
    pub fn fail_registration_at(&self, n: Option<usize>) {
        let mut desk = self.inner.lock();
        desk.registration_attempts = 0;
        desk.faults.registration_at = n;
    }

    /// Drop close requests, leaving listeners blocked.
    pub fn ignore_close(&self, ignore: bool) {
        self.inner.lock().faults.ignore_close = ignore;
    }

    /// Refuse unregistration from threads other than the surface's own.
    pub fn fail_remote_unregister(&self, fail: bool) {
        self.inner.lock().faults.remote_unregister = fail;
    }

    /// Number of combinations bound to surfaces
    pub fn active_registrations(&self) -> usize {
        self.inner.lock().bindings.len()
    }

    /// Whether a surface currently holds this combination
    pub fn is_registered(&self, modifiers: Modifiers, key: u16) -> bool {
        self.inner
            .lock()
            .bindings
            .contains_key(&Chord::new(modifiers, key))
    }

    /// Surfaces that have not been destroyed yet
    pub fn live_surfaces(&self) -> usize {
        self.inner.lock().surfaces.len()
    }

    /// Surfaces created over the desktop's lifetime
    pub fn surfaces_created(&self) -> usize {
        self.inner.lock().surfaces_created
    }

    /// Whether any live surface is shown
    pub fn any_surface_visible(&self) -> bool {
        self.inner.lock().surfaces.values().any(|s| s.visible)
    }

    /// Identifiers with a non-zero reference count
    pub fn ids_in_use(&self) -> usize {
        self.inner.lock().atoms.len()
    }

    /// Whether the surface class is registered
    pub fn class_registered(&self) -> bool {
        self.inner.lock().class_registered
    }

    /// Bindings that were still held by a surface when it was destroyed
    pub fn leaked_bindings(&self) -> usize {
        self.inner.lock().leaked_bindings
    }

    fn broadcast(&self, msg: SurfaceMessage) -> usize {
        let senders: Vec<Sender<SurfaceMessage>> = self
            .inner
            .lock()
            .surfaces
            .values()
            .map(|s| s.tx.clone())
            .collect();
        senders
            .into_iter()
            .filter(|tx| tx.send(msg.clone()).is_ok())
            .count()
    }
}

impl Platform for SimulatedDesktop {
    fn create_surface(&self, visible: bool) -> Result<Box<dyn Surface>> {
        let mut desk = self.inner.lock();
        if desk.faults.class {
            return Err(Error::Class("simulated class registration failure".into()));
        }
        desk.class_registered = true;
        if desk.faults.window {
            desk.release_class();
            return Err(Error::Window("simulated window creation failure".into()));
        }

        let surface = desk.next_surface;
        desk.next_surface += 1;
        desk.surfaces_created += 1;
        let (tx, rx) = unbounded();
        desk.surfaces.insert(
            surface,
            SurfaceEntry {
                tx: tx.clone(),
                visible,
            },
        );
        debug!(surface, visible, "simulated surface created");

        Ok(Box::new(SimSurface {
            desktop: self.clone(),
            surface,
            tx,
            rx,
        }))
    }

    fn acquire_id(&self, token: &str) -> Option<HotkeyId> {
        let mut desk = self.inner.lock();
        if let Some((id, refs)) = desk.atoms.get_mut(token) {
            *refs += 1;
            return Some(*id);
        }
        let id = FIRST_ID.checked_add(desk.next_atom)?;
        desk.next_atom += 1;
        desk.atoms.insert(token.to_string(), (id, 1));
        Some(id)
    }

    fn release_id(&self, id: HotkeyId) {
        let mut desk = self.inner.lock();
        let token = desk
            .atoms
            .iter()
            .find(|(_, (atom, _))| *atom == id)
            .map(|(token, _)| token.clone());
        if let Some(token) = token {
            if let Some((_, refs)) = desk.atoms.get_mut(&token) {
                *refs -= 1;
                if *refs == 0 {
                    desk.atoms.remove(&token);
                }
            }
        }
    }
}

impl Desktop {
    fn unbind(&mut self, surface: u64, id: HotkeyId) -> bool {
        let before = self.bindings.len();
        self.bindings
            .retain(|_, (owner, bound)| !(*owner == surface && *bound == id));
        self.bindings.len() != before
    }

    /// The class goes away with the last surface using it
    fn release_class(&mut self) {
        if self.surfaces.is_empty() {
            self.class_registered = false;
        }
    }
}

struct SimSurface {
    desktop: SimulatedDesktop,
    surface: u64,
    tx: Sender<SurfaceMessage>,
    rx: Receiver<SurfaceMessage>,
}

impl Surface for SimSurface {
    fn register(
        &mut self,
        id: HotkeyId,
        modifiers: Modifiers,
        key: u16,
    ) -> std::result::Result<(), String> {
        let mut desk = self.desktop.inner.lock();
        desk.registration_attempts += 1;
        if desk.faults.registration_at == Some(desk.registration_attempts) {
            return Err("simulated registration failure".into());
        }
        let chord = Chord::new(modifiers, key);
        if desk.foreign.contains(&chord) || desk.bindings.contains_key(&chord) {
            return Err("hot key is already registered".into());
        }
        desk.bindings.insert(chord, (self.surface, id));
        Ok(())
    }

    fn unregister(&mut self, id: HotkeyId) {
        self.desktop.inner.lock().unbind(self.surface, id);
    }

    fn next_message(&mut self) -> SurfaceMessage {
        match self.rx.recv() {
            Ok(msg) => msg,
            Err(_) => SurfaceMessage::Failed("message queue closed".into()),
        }
    }

    fn remote(&self) -> Arc<dyn SurfaceRemote> {
        Arc::new(SimRemote {
            desktop: self.desktop.clone(),
            surface: self.surface,
            tx: self.tx.clone(),
        })
    }

    fn destroy(self: Box<Self>) {
        let mut desk = self.desktop.inner.lock();
        let before = desk.bindings.len();
        desk.bindings.retain(|_, (owner, _)| *owner != self.surface);
        let leaked = before - desk.bindings.len();
        if leaked > 0 {
            warn!(surface = self.surface, leaked, "simulated surface destroyed with bindings");
            desk.leaked_bindings += leaked;
        }
        desk.surfaces.remove(&self.surface);
        desk.release_class();
        debug!(surface = self.surface, "simulated surface destroyed");
    }
}

struct SimRemote {
    desktop: SimulatedDesktop,
    surface: u64,
    tx: Sender<SurfaceMessage>,
}

impl SurfaceRemote for SimRemote {
    fn unregister(&self, id: HotkeyId) -> bool {
        let mut desk = self.desktop.inner.lock();
        if desk.faults.remote_unregister {
            return false;
        }
        desk.unbind(self.surface, id)
    }

    fn request_close(&self) {
        if self.desktop.inner.lock().faults.ignore_close {
            debug!(surface = self.surface, "simulated close request ignored");
            return;
        }
        let _ = self.tx.send(SurfaceMessage::Destroy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CTRL_ALT: Modifiers = Modifiers::CONTROL.union(Modifiers::ALT);

    #[test]
    fn test_ids_are_reference_counted() {
        let desk = SimulatedDesktop::new();
        let a = desk.acquire_id("token-a").unwrap();
        assert_eq!(desk.acquire_id("token-a"), Some(a));
        let b = desk.acquire_id("token-b").unwrap();
        assert_ne!(a, b);
        assert_eq!(desk.ids_in_use(), 2);

        desk.release_id(a);
        assert_eq!(desk.ids_in_use(), 2);
        desk.release_id(a);
        desk.release_id(b);
        assert_eq!(desk.ids_in_use(), 0);
    }

    #[test]
    fn test_bindings_are_system_wide() {
        let desk = SimulatedDesktop::new();
        let mut first = desk.create_surface(false).unwrap();
        let mut second = desk.create_surface(false).unwrap();

        first.register(0xC000, CTRL_ALT, 0x51).unwrap();
        assert!(second.register(0xC001, CTRL_ALT, 0x51).is_err());

        desk.occupy(CTRL_ALT, 0x41);
        assert!(second.register(0xC002, CTRL_ALT, 0x41).is_err());
        desk.vacate(CTRL_ALT, 0x41);
        second.register(0xC002, CTRL_ALT, 0x41).unwrap();

        assert_eq!(desk.active_registrations(), 2);
        first.unregister(0xC000);
        assert!(!desk.is_registered(CTRL_ALT, 0x51));
    }

    #[test]
    fn test_press_reaches_owning_surface() {
        let desk = SimulatedDesktop::new();
        let mut surface = desk.create_surface(false).unwrap();
        surface.register(0xC000, CTRL_ALT, 0x51).unwrap();

        assert!(desk.press(CTRL_ALT, 0x51));
        assert!(!desk.press(CTRL_ALT, 0x41));
        assert_eq!(surface.next_message(), SurfaceMessage::Hotkey(0xC000));

        surface.remote().request_close();
        assert_eq!(surface.next_message(), SurfaceMessage::Destroy);
        surface.destroy();
        assert_eq!(desk.live_surfaces(), 0);
    }

    #[test]
    fn test_destroy_drops_bindings_and_class() {
        let desk = SimulatedDesktop::new();
        let mut first = desk.create_surface(false).unwrap();
        let mut second = desk.create_surface(false).unwrap();
        first.register(0xC000, CTRL_ALT, 0x51).unwrap();
        second.register(0xC001, CTRL_ALT, 0x41).unwrap();

        second.unregister(0xC001);
        second.destroy();
        assert_eq!(desk.leaked_bindings(), 0);
        // Still in use by the first surface
        assert!(desk.class_registered());

        first.destroy();
        assert_eq!(desk.leaked_bindings(), 1);
        assert_eq!(desk.active_registrations(), 0);
        assert!(!desk.class_registered());
    }

    #[test]
    fn test_injected_faults() {
        let desk = SimulatedDesktop::new();
        desk.fail_class(true);
        assert!(matches!(desk.create_surface(false), Err(Error::Class(_))));
        desk.fail_class(false);
        desk.fail_window(true);
        assert!(matches!(desk.create_surface(false), Err(Error::Window(_))));
        assert!(!desk.class_registered());
        desk.fail_window(false);

        let mut surface = desk.create_surface(true).unwrap();
        assert!(desk.any_surface_visible());
        desk.fail_registration_at(Some(2));
        surface.register(0xC000, CTRL_ALT, 0x51).unwrap();
        assert!(surface.register(0xC001, CTRL_ALT, 0x41).is_err());
        surface.register(0xC001, CTRL_ALT, 0x41).unwrap();

        desk.fail_remote_unregister(true);
        assert!(!surface.remote().unregister(0xC000));
        desk.fail_remote_unregister(false);
        assert!(surface.remote().unregister(0xC000));
    }
}
