//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `DurableStore` trait.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use rocksdb::{BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, MultiThreaded, Options};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf, StoredValue};
use crate::DurableStore;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Read the full envelope, including the write time.
    ///
    /// # Errors
    ///
    /// Returns an error if the database read or decoding fails.
    pub fn read_envelope(&self, key: &str) -> Result<Option<StoredValue>> {
        let cf = self.cf(cf::INTENTS)?;
        let key = keys::encode(key)?;

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }
}

impl DurableStore for RocksStore {
    fn write(&self, key: &str, value: &str) -> Result<()> {
        let cf = self.cf(cf::INTENTS)?;
        let encoded = keys::encode(key)?;
        let envelope = Self::serialize(&StoredValue::now(value))?;

        self.db
            .put_cf(&cf, encoded, envelope)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::trace!(key, "Stored durable value");
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        let envelope = self.read_envelope(key)?;
        if let Some(stored) = &envelope {
            let age_ms = (Utc::now() - stored.written_at).num_milliseconds();
            tracing::trace!(key, age_ms, "Read durable value");
        }
        Ok(envelope.map(|stored| stored.value))
    }

    fn delete(&self, key: &str) -> Result<()> {
        let cf = self.cf(cf::INTENTS)?;
        let encoded = keys::encode(key)?;

        self.db
            .delete_cf(&cf, encoded)
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}
