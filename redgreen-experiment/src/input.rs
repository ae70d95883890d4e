use redgreen_core::{KeyStates, ResponseKey};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Tracks which response keys are held, from raw key down/up events.
///
/// `K` is the physical key type of the windowing layer. Several physical keys
/// may be bound to one logical key; the logical key stays held while any of
/// its bindings is down.
#[derive(Debug, Clone)]
pub struct InputSampler<K> {
    bindings: HashMap<K, ResponseKey>,
    held: HashSet<K>,
}

impl<K: Eq + Hash + Copy> InputSampler<K> {
    pub fn new(bindings: impl IntoIterator<Item = (K, ResponseKey)>) -> Self {
        Self {
            bindings: bindings.into_iter().collect(),
            held: HashSet::new(),
        }
    }

    pub fn binding(&self, key: &K) -> Option<ResponseKey> {
        self.bindings.get(key).copied()
    }

    /// Returns whether the logical state changed. Auto-repeat presses of an
    /// already held key never do.
    pub fn key_down(&mut self, key: K) -> bool {
        if !self.bindings.contains_key(&key) {
            return false;
        }
        let before = self.state();
        self.held.insert(key);
        self.state() != before
    }

    pub fn key_up(&mut self, key: K) -> bool {
        let before = self.state();
        self.held.remove(&key);
        self.state() != before
    }

    /// Focus loss: key-up events for held keys will not arrive.
    pub fn release_all(&mut self) -> bool {
        let changed = !self.held.is_empty();
        self.held.clear();
        changed
    }

    pub fn state(&self) -> KeyStates {
        let mut keys = KeyStates::default();
        for held in &self.held {
            match self.bindings.get(held) {
                Some(ResponseKey::Red) => keys.red = true,
                Some(ResponseKey::Green) => keys.green = true,
                None => {}
            }
        }
        keys
    }
}

/// Acknowledge key that fires on release, and only after a press was seen
/// while enabled. Holding the key down therefore cannot chain screens.
#[derive(Debug, Clone, Copy, Default)]
pub struct AckGate {
    armed: bool,
}

impl AckGate {
    pub fn press(&mut self) {
        self.armed = true;
    }

    pub fn release(&mut self) -> bool {
        std::mem::take(&mut self.armed)
    }

    pub fn reset(&mut self) {
        self.armed = false;
    }
}
