//! In-memory storage implementation.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::Result;
use crate::keys;
use crate::DurableStore;

/// Process-wide in-memory store.
///
/// Shared between controller instances through an `Arc`. Nothing survives
/// a process restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl DurableStore for MemoryStore {
    fn write(&self, key: &str, value: &str) -> Result<()> {
        keys::validate(key)?;
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn write_overwrites() {
        let store = MemoryStore::new();
        store.write(keys::PENDING_OUTGOING, "first").unwrap();
        store.write(keys::PENDING_OUTGOING, "second").unwrap();
        assert_eq!(
            store.read(keys::PENDING_OUTGOING).unwrap().as_deref(),
            Some("second")
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn delete_missing_is_ok() {
        let store = MemoryStore::new();
        store.delete(keys::PENDING_DISPLAY).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn shared_through_arc() {
        let store = Arc::new(MemoryStore::new());
        let other = Arc::clone(&store);
        store.write(keys::SCROLL_SUPPRESSION, "1").unwrap();
        assert_eq!(
            other.read(keys::SCROLL_SUPPRESSION).unwrap().as_deref(),
            Some("1")
        );
    }

    #[test]
    fn rejects_invalid_key() {
        let store = MemoryStore::new();
        assert!(store.write("", "x").is_err());
    }
}
