//! Handler registry
//!
//! Hotkey definitions live in an append-only vector of slots. Removing a
//! definition only marks its slot as deleted, so indices handed out to
//! callers stay valid; the next insert recycles the lowest deleted slot.

use std::fmt;
use std::sync::Arc;

use crate::platform::HotkeyId;

use super::error::{Error, Result};
use super::keys::{Chord, Modifiers};

/// Callback invoked on the listener thread with the definition's parameter
pub type Callback = Arc<dyn Fn(&str) + Send + Sync>;

/// A single hotkey definition
#[derive(Clone)]
pub struct HotkeyDefinition {
    chord: Chord,
    callback: Callback,
    param: String,
    id: Option<Registration>,
    deleted: bool,
}

/// An id recorded by the listener session that registered it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Registration {
    id: HotkeyId,
    session: u64,
}

impl HotkeyDefinition {
    fn new(chord: Chord, callback: Callback, param: String) -> Self {
        Self {
            chord,
            callback,
            param,
            id: None,
            deleted: false,
        }
    }

    /// The key combination of this definition
    pub fn chord(&self) -> Chord {
        self.chord
    }

    /// Parameter handed to the callback
    pub fn param(&self) -> &str {
        &self.param
    }

    /// Identifier assigned while registered with the OS
    pub fn registration_id(&self) -> Option<HotkeyId> {
        self.id.map(|reg| reg.id)
    }

    /// Whether the slot holds a live definition
    pub fn is_live(&self) -> bool {
        !self.deleted
    }

    /// Callback and parameter, cloned out for invocation outside any lock
    pub(crate) fn dispatch_target(&self) -> (Callback, String) {
        (Arc::clone(&self.callback), self.param.clone())
    }
}

impl fmt::Debug for HotkeyDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HotkeyDefinition")
            .field("chord", &self.chord)
            .field("param", &self.param)
            .field("id", &self.id)
            .field("deleted", &self.deleted)
            .finish_non_exhaustive()
    }
}

/// Ordered collection of hotkey definitions indexed by slot
#[derive(Debug, Default)]
pub struct Registry {
    slots: Vec<HotkeyDefinition>,
    /// Ids still registered with the OS whose slot was recycled, or left
    /// behind by a session that has not torn down yet
    orphans: Vec<Registration>,
    /// Session whose ids new registrations are recorded under
    session: u64,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a definition and return its index.
    ///
    /// A deleted slot is recycled before duplicates are looked for, so a
    /// recycled slot may end up sharing its chord with another live entry.
    /// When a live entry already matches and no slot is free, its index is
    /// returned and nothing changes.
    pub fn insert(
        &mut self,
        modifiers: Modifiers,
        key: u16,
        callback: Callback,
        param: impl Into<String>,
    ) -> usize {
        let chord = Chord::new(modifiers, key);
        if let Some(index) = self.find_tombstone() {
            let slot = &mut self.slots[index];
            if let Some(id) = slot.id.take() {
                self.orphans.push(id);
            }
            *slot = HotkeyDefinition::new(chord, callback, param.into());
            return index;
        }
        if let Some(index) = self.find_by_chord(modifiers, key) {
            return index;
        }
        self.slots.push(HotkeyDefinition::new(chord, callback, param.into()));
        self.slots.len() - 1
    }

    /// Mark the slot at `index` as deleted.
    ///
    /// Does not touch an active OS registration; the listener releases it
    /// during teardown.
    pub fn remove(&mut self, index: usize) -> Result<()> {
        let slot = self.slots.get_mut(index).ok_or(Error::NoEntry)?;
        slot.deleted = true;
        Ok(())
    }

    /// Index of the first live definition matching the chord
    pub fn find_by_chord(&self, modifiers: Modifiers, key: u16) -> Option<usize> {
        let chord = Chord::new(modifiers, key);
        self.slots
            .iter()
            .position(|def| !def.deleted && def.chord == chord)
    }

    /// The live definition registered under `id`, with its index
    pub fn find_by_id(&self, id: HotkeyId) -> Option<(usize, &HotkeyDefinition)> {
        self.slots
            .iter()
            .enumerate()
            .find(|(_, def)| !def.deleted && def.registration_id() == Some(id))
    }

    /// Index of the first deleted slot
    pub fn find_tombstone(&self) -> Option<usize> {
        self.slots.iter().position(|def| def.deleted)
    }

    /// Definition stored at `index`, live or not
    pub fn get(&self, index: usize) -> Option<&HotkeyDefinition> {
        self.slots.get(index)
    }

    /// Number of slots, including deleted ones
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the registry has no slots at all
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of live definitions
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|def| !def.deleted).count()
    }

    /// Iterate over all slots in index order
    pub fn iter(&self) -> impl Iterator<Item = &HotkeyDefinition> {
        self.slots.iter()
    }

    /// Number of slots currently holding a registration id
    pub fn registered_count(&self) -> usize {
        self.slots.iter().filter(|def| def.id.is_some()).count() + self.orphans.len()
    }

    /// Start recording ids for a new listener session.
    ///
    /// Ids an earlier session still holds move to the orphan list, where
    /// only that session's teardown will find them.
    pub(crate) fn begin_session(&mut self) -> u64 {
        for def in &mut self.slots {
            if let Some(reg) = def.id.take() {
                self.orphans.push(reg);
            }
        }
        self.session += 1;
        self.session
    }

    pub(crate) fn set_id(&mut self, index: usize, id: HotkeyId) {
        self.slots[index].id = Some(Registration {
            id,
            session: self.session,
        });
    }

    pub(crate) fn clear_id(&mut self, index: usize) -> Option<HotkeyId> {
        self.slots[index].id.take().map(|reg| reg.id)
    }

    /// Take every id recorded by `session`, live, deleted or orphaned
    pub(crate) fn drain_session(&mut self, session: u64) -> Vec<HotkeyId> {
        let mut ids = Vec::new();
        for def in &mut self.slots {
            if def.id.is_some_and(|reg| reg.session == session) {
                ids.extend(def.id.take().map(|reg| reg.id));
            }
        }
        self.orphans.retain(|reg| {
            if reg.session == session {
                ids.push(reg.id);
                false
            } else {
                true
            }
        });
        ids
    }

    /// Indices of slots holding a registration id
    pub(crate) fn registered_indices(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, def)| def.id.is_some())
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Callback {
        Arc::new(|_: &str| {})
    }

    const CTRL_ALT: Modifiers = Modifiers::CONTROL.union(Modifiers::ALT);

    #[test]
    fn test_insert_appends_in_order() {
        let mut reg = Registry::new();
        assert_eq!(reg.insert(CTRL_ALT, 0x51, noop(), "q"), 0);
        assert_eq!(reg.insert(CTRL_ALT, 0x41, noop(), "a"), 1);
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.get(1).map(|d| d.param()), Some("a"));
    }

    #[test]
    fn test_insert_duplicate_returns_existing_index() {
        let mut reg = Registry::new();
        let first = reg.insert(CTRL_ALT, 0x51, noop(), "q");
        reg.insert(CTRL_ALT, 0x41, noop(), "a");
        let again = reg.insert(CTRL_ALT, 0x51, noop(), "other");
        assert_eq!(first, again);
        assert_eq!(reg.len(), 2);
        // The first definition is kept
        assert_eq!(reg.get(first).map(|d| d.param()), Some("q"));
    }

    #[test]
    fn test_remove_out_of_range() {
        let mut reg = Registry::new();
        reg.insert(CTRL_ALT, 0x51, noop(), "q");
        assert_eq!(reg.remove(5), Err(Error::NoEntry));
        assert_eq!(reg.len(), 1);
        assert!(reg.get(0).is_some_and(|d| d.is_live()));
    }

    #[test]
    fn test_remove_then_insert_reuses_slot() {
        let mut reg = Registry::new();
        let session = reg.begin_session();
        reg.insert(CTRL_ALT, 0x51, noop(), "q");
        reg.insert(CTRL_ALT, 0x41, noop(), "a");
        reg.set_id(0, 0xC001);

        reg.remove(0).unwrap();
        assert_eq!(reg.find_by_chord(CTRL_ALT, 0x51), None);
        assert_eq!(reg.find_tombstone(), Some(0));

        let index = reg.insert(CTRL_ALT, 0x5A, noop(), "z");
        assert_eq!(index, 0);
        let def = reg.get(0).unwrap();
        assert!(def.is_live());
        assert_eq!(def.registration_id(), None);
        assert_eq!(def.chord(), Chord::new(CTRL_ALT, 0x5A));
        // The displaced id is kept for teardown
        assert_eq!(reg.drain_session(session), vec![0xC001]);
    }

    #[test]
    fn test_tombstone_reuse_precedes_duplicate_check() {
        let mut reg = Registry::new();
        reg.insert(CTRL_ALT, 0x51, noop(), "q");
        reg.insert(CTRL_ALT, 0x41, noop(), "a");
        reg.remove(1).unwrap();

        // Q is still live at 0, but the free slot at 1 is consumed anyway
        assert_eq!(reg.insert(CTRL_ALT, 0x51, noop(), "q2"), 1);
        assert_eq!(reg.live_count(), 2);
        assert_eq!(reg.find_by_chord(CTRL_ALT, 0x51), Some(0));
    }

    #[test]
    fn test_find_by_id_skips_deleted() {
        let mut reg = Registry::new();
        reg.insert(CTRL_ALT, 0x51, noop(), "q");
        reg.set_id(0, 0xC010);
        assert_eq!(
            reg.find_by_id(0xC010).map(|(i, d)| (i, d.param())),
            Some((0, "q"))
        );
        assert!(reg.find_by_id(0xC011).is_none());

        reg.remove(0).unwrap();
        assert!(reg.find_by_id(0xC010).is_none());
        // Still counted until released
        assert_eq!(reg.registered_count(), 1);
        assert_eq!(reg.registered_indices(), vec![0]);
        assert_eq!(reg.clear_id(0), Some(0xC010));
        assert_eq!(reg.registered_count(), 0);
    }

    #[test]
    fn test_drain_takes_only_own_session() {
        let mut reg = Registry::new();
        reg.insert(CTRL_ALT, 0x51, noop(), "q");
        reg.insert(CTRL_ALT, 0x41, noop(), "a");

        let old = reg.begin_session();
        reg.set_id(0, 0xC000);
        reg.set_id(1, 0xC001);

        // A new session starts before the old one has torn down
        let new = reg.begin_session();
        assert_eq!(reg.registered_indices(), Vec::<usize>::new());
        reg.set_id(0, 0xC000);
        assert_eq!(reg.registered_count(), 3);

        assert_eq!(reg.drain_session(old), vec![0xC000, 0xC001]);
        assert_eq!(reg.find_by_id(0xC000).map(|(i, _)| i), Some(0));
        assert_eq!(reg.registered_indices(), vec![0]);

        assert_eq!(reg.drain_session(new), vec![0xC000]);
        assert_eq!(reg.registered_count(), 0);
    }

    #[test]
    fn test_live_count_ignores_tombstones() {
        let mut reg = Registry::new();
        reg.insert(CTRL_ALT, 0x51, noop(), "q");
        reg.remove(0).unwrap();
        assert!(!reg.is_empty());
        assert_eq!(reg.live_count(), 0);
    }

    mod property {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn no_duplicate_live_entries_without_removal(
                keys in proptest::collection::vec((0u16..8, 0x41u16..0x45), 1..40),
            ) {
                let mut reg = Registry::new();
                for (mods, key) in &keys {
                    let mods = Modifiers::from_bits_truncate(*mods);
                    let index = reg.insert(mods, *key, noop(), "");
                    prop_assert_eq!(reg.insert(mods, *key, noop(), ""), index);
                }
                let live: Vec<Chord> = reg
                    .iter()
                    .filter(|d| d.is_live())
                    .map(|d| d.chord())
                    .collect();
                for (i, chord) in live.iter().enumerate() {
                    prop_assert!(!live[i + 1..].contains(chord));
                }
            }
        }
    }
}
