use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use regstore_types::ObjectKey;

/// Per-key mutual exclusion for the read-validate-commit window.
///
/// Entries live only while someone holds or waits on them.
#[derive(Default)]
pub(crate) struct KeyLocks {
    locks: Mutex<HashMap<ObjectKey, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `key`.
    pub(crate) fn with_key<T>(&self, key: &ObjectKey, f: impl FnOnce() -> T) -> T {
        let lock = {
            let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(map.entry(key.clone()).or_default())
        };

        let result = {
            // The guarded value is `()`, so a poisoned lock carries no torn state.
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the map and this call hold the entry: nobody is waiting.
        if Arc::strong_count(&lock) == 2 {
            map.remove(key);
        }
        result
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
