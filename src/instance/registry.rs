//! Per-manager table of profile slots.
//!
//! The lock is only ever held for a single read-modify-write and never across an
//! `.await`, so a slow launch of one profile does not block the others.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// State of a claimed profile key. Absent keys are not stored.
enum Slot<T> {
    Launching,
    Running(Arc<T>),
    Closing,
}

pub(crate) struct Registry<T> {
    slots: Mutex<HashMap<String, Slot<T>>>,
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Atomically moves `key` from absent to launching.
    ///
    /// Returns `None` if the key is launching, running or closing. The returned
    /// claim rolls the key back to absent when dropped without being committed.
    pub fn claim(self: &Arc<Self>, key: &str) -> Option<LaunchClaim<T>> {
        let mut slots = self.slots.lock();
        if slots.contains_key(key) {
            return None;
        }
        slots.insert(key.to_string(), Slot::Launching);
        Some(LaunchClaim {
            registry: Arc::clone(self),
            key: key.to_string(),
            committed: false,
        })
    }

    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        match self.slots.lock().get(key) {
            Some(Slot::Running(item)) => Some(Arc::clone(item)),
            _ => None,
        }
    }

    pub fn is_running(&self, key: &str) -> bool {
        matches!(self.slots.lock().get(key), Some(Slot::Running(_)))
    }

    /// Keys in the running state, sorted.
    pub fn running_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .slots
            .lock()
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Running(_)))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Snapshot of every running item.
    pub fn running(&self) -> Vec<Arc<T>> {
        self.slots
            .lock()
            .values()
            .filter_map(|slot| match slot {
                Slot::Running(item) => Some(Arc::clone(item)),
                _ => None,
            })
            .collect()
    }

    /// Moves `key` from running to closing and hands out the item.
    ///
    /// Of two concurrent callers exactly one gets `Some`.
    pub fn begin_close(&self, key: &str) -> Option<Arc<T>> {
        let mut slots = self.slots.lock();
        let slot = slots.get_mut(key)?;
        if !matches!(slot, Slot::Running(_)) {
            return None;
        }
        match std::mem::replace(slot, Slot::Closing) {
            Slot::Running(item) => Some(item),
            _ => None,
        }
    }

    /// Moves every running key to closing in one step.
    pub fn begin_close_all(&self) -> Vec<(String, Arc<T>)> {
        let mut slots = self.slots.lock();
        let mut closing = Vec::new();
        for (key, slot) in slots.iter_mut() {
            if matches!(slot, Slot::Running(_)) {
                if let Slot::Running(item) = std::mem::replace(slot, Slot::Closing) {
                    closing.push((key.clone(), item));
                }
            }
        }
        closing.sort_by(|a, b| a.0.cmp(&b.0));
        closing
    }

    /// Removes a key previously moved to closing.
    pub fn finish_close(&self, key: &str) {
        let mut slots = self.slots.lock();
        if matches!(slots.get(key), Some(Slot::Closing)) {
            slots.remove(key);
        }
    }

    /// Removes `key` only if it is still running exactly `item`.
    ///
    /// Used when a process exits on its own: a newer instance of the same profile
    /// must not be evicted by a stale watcher.
    pub fn remove_if_same(&self, key: &str, item: &Arc<T>) -> bool {
        let mut slots = self.slots.lock();
        match slots.get(key) {
            Some(Slot::Running(current)) if Arc::ptr_eq(current, item) => {
                slots.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }
}

/// Reservation of a profile key for the duration of a launch.
pub(crate) struct LaunchClaim<T> {
    registry: Arc<Registry<T>>,
    key: String,
    committed: bool,
}

impl<T> LaunchClaim<T> {
    /// Publishes the launched item; the key becomes running.
    pub fn commit(mut self, item: Arc<T>) {
        self.registry
            .slots
            .lock()
            .insert(self.key.clone(), Slot::Running(item));
        self.committed = true;
    }
}

impl<T> Drop for LaunchClaim<T> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let mut slots = self.registry.slots.lock();
        if matches!(slots.get(&self.key), Some(Slot::Launching)) {
            slots.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Arc<Registry<u32>> {
        Arc::new(Registry::new())
    }

    #[test]
    fn test_claim_is_exclusive() {
        let registry = registry();
        let claim = registry.claim("p1").unwrap();
        assert!(registry.claim("p1").is_none());
        assert!(!registry.is_running("p1"));

        claim.commit(Arc::new(1));
        assert!(registry.is_running("p1"));
        assert!(registry.claim("p1").is_none());
    }

    #[test]
    fn test_dropped_claim_rolls_back() {
        let registry = registry();
        {
            let _claim = registry.claim("p1").unwrap();
            assert_eq!(registry.len(), 1);
        }
        assert_eq!(registry.len(), 0);
        assert!(registry.claim("p1").is_some());
    }

    #[test]
    fn test_close_sequence() {
        let registry = registry();
        registry.claim("p1").unwrap().commit(Arc::new(7));

        let item = registry.begin_close("p1").unwrap();
        assert_eq!(*item, 7);
        assert!(registry.begin_close("p1").is_none());
        assert!(!registry.is_running("p1"));
        // Still reserved while closing.
        assert!(registry.claim("p1").is_none());

        registry.finish_close("p1");
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_remove_if_same_ignores_newer_item() {
        let registry = registry();
        let old = Arc::new(1);
        registry.claim("p1").unwrap().commit(Arc::clone(&old));
        registry.begin_close("p1");
        registry.finish_close("p1");

        let new = Arc::new(1);
        registry.claim("p1").unwrap().commit(Arc::clone(&new));
        assert!(!registry.remove_if_same("p1", &old));
        assert!(registry.is_running("p1"));
        assert!(registry.remove_if_same("p1", &new));
        assert!(!registry.is_running("p1"));
    }

    #[test]
    fn test_snapshots() {
        let registry = registry();
        registry.claim("b").unwrap().commit(Arc::new(2));
        registry.claim("a").unwrap().commit(Arc::new(1));
        let _launching = registry.claim("c").unwrap();

        assert_eq!(registry.running_keys(), vec!["a", "b"]);
        assert_eq!(registry.running().len(), 2);

        let closing = registry.begin_close_all();
        assert_eq!(
            closing.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert!(registry.running_keys().is_empty());
        assert_eq!(registry.len(), 3);
    }
}
