//! Database schema definitions and column families.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Pending intents and flags, keyed by well-known key.
    pub const INTENTS: &str = "intents";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![cf::INTENTS]
}

/// On-disk envelope around a stored value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredValue {
    /// The caller's value.
    pub value: String,
    /// When the value was written.
    pub written_at: DateTime<Utc>,
}

impl StoredValue {
    /// Wrap a value with the current time.
    #[must_use]
    pub fn now(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            written_at: Utc::now(),
        }
    }
}
