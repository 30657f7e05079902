//! Durable key/value area for parley.
//!
//! Values written here survive a navigation (the chat view being torn down
//! and mounted again for a different conversation). Two implementations are
//! provided:
//!
//! - [`MemoryStore`]: process-wide map, lost when the process exits
//! - [`RocksStore`]: `RocksDB`-backed, survives restarts
//!
//! # Column families
//!
//! The `RocksDB` implementation stores every record in the `intents` column
//! family, wrapped in a CBOR envelope carrying the write time.
//!
//! # Example
//!
//! ```
//! use parley_store::{keys, DurableStore, MemoryStore};
//!
//! let store = MemoryStore::new();
//! store.write(keys::PENDING_OUTGOING, r#"{"content":"hi"}"#).unwrap();
//! assert!(store.read(keys::PENDING_OUTGOING).unwrap().is_some());
//! store.delete(keys::PENDING_OUTGOING).unwrap();
//! assert!(store.read(keys::PENDING_OUTGOING).unwrap().is_none());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod memory;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use rocks::RocksStore;

use std::sync::Arc;

/// String-valued durable storage.
///
/// Implementations must be safe to share between the UI task and spawned
/// background tasks.
pub trait DurableStore: Send + Sync {
    /// Write a value, replacing any previous value under the same key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the backend fails.
    fn write(&self, key: &str, value: &str) -> Result<()>;

    /// Read the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Remove the value stored under `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    fn delete(&self, key: &str) -> Result<()>;
}

impl<S: DurableStore + ?Sized> DurableStore for Arc<S> {
    fn write(&self, key: &str, value: &str) -> Result<()> {
        (**self).write(key, value)
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        (**self).read(key)
    }

    fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key)
    }
}
