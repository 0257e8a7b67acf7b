//! Name to constructor registries.

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;

/// A thread-safe map from identifier to constructor.
///
/// Constructors are cloned out of the map on lookup (they are usually
/// `Arc`s), so no lock is held while they run.
pub struct Registry<C: Clone> {
    kind: &'static str,
    entries: RwLock<HashMap<String, C>>,
}

impl<C: Clone> Registry<C> {
    /// Creates an empty registry; `kind` names its entries in log messages.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Inserts or overwrites an entry. Returns true if an entry was replaced.
    pub fn register(&self, name: impl Into<String>, ctor: C) -> bool {
        let name = name.into();
        let replaced = self.entries.write().insert(name.clone(), ctor).is_some();
        if replaced {
            log::info!("Overwrote {} constructor '{}'", self.kind, name);
        } else {
            log::debug!("Registered {} constructor '{}'", self.kind, name);
        }
        replaced
    }

    pub fn get(&self, name: &str) -> Option<C> {
        self.entries.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Removes an entry, returning its constructor.
    pub fn unregister(&self, name: &str) -> Option<C> {
        let removed = self.entries.write().remove(name);
        if removed.is_some() {
            log::debug!("Unregistered {} constructor '{}'", self.kind, name);
        }
        removed
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<C: Clone> fmt::Debug for Registry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("names", &self.names())
            .finish()
    }
}
