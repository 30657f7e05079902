//! Well-known keys and key validation.
//!
//! All keys live under the `parley.` namespace so that a shared store can
//! hold other records without collisions.

use crate::error::{Result, StoreError};

/// Outgoing message written before navigating to a freshly created conversation.
pub const PENDING_OUTGOING: &str = "parley.pending.outgoing";

/// Precomposed assistant content to persist and show after navigation.
pub const PENDING_DISPLAY: &str = "parley.pending.display";

/// Suppresses the snap-to-bottom on the next history load.
pub const SCROLL_SUPPRESSION: &str = "parley.scroll.suppress";

/// Namespace prefix shared by every parley key.
pub const NAMESPACE: &str = "parley.";

/// Maximum key length in bytes.
pub const MAX_KEY_LEN: usize = 256;

/// Check that a key is usable.
///
/// # Errors
///
/// Returns `StoreError::InvalidKey` for empty, over-long, or whitespace-bearing keys.
pub fn validate(key: &str) -> Result<()> {
    if key.is_empty() || key.len() > MAX_KEY_LEN || key.chars().any(char::is_whitespace) {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Encode a key for the database.
///
/// # Errors
///
/// Returns `StoreError::InvalidKey` if the key fails validation.
pub fn encode(key: &str) -> Result<Vec<u8>> {
    validate(key)?;
    Ok(key.as_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_keys_are_namespaced_and_valid() {
        for key in [PENDING_OUTGOING, PENDING_DISPLAY, SCROLL_SUPPRESSION] {
            assert!(key.starts_with(NAMESPACE));
            validate(key).unwrap();
        }
    }

    #[test]
    fn rejects_unusable_keys() {
        assert!(validate("").is_err());
        assert!(validate("has space").is_err());
        assert!(validate(&"k".repeat(MAX_KEY_LEN + 1)).is_err());
    }

    #[test]
    fn encode_is_utf8_bytes() {
        assert_eq!(encode("parley.x").unwrap(), b"parley.x".to_vec());
    }
}
