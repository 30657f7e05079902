//! Consume-once intents that survive navigation.
//!
//! Before navigating away from a blank conversation the controller posts an
//! intent into the durable area. The controller mounted for the new
//! conversation takes it exactly once. A per-instance latch makes a second
//! mount of the same instance (or a second call) a no-op.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parley_core::{ConversationId, DraftMessage};
use parley_store::{keys, DurableStore};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::collab::FlashCardFlags;
use crate::error::{Result, SessionError};

/// Default lifetime of the scroll-suppression flag.
pub const DEFAULT_SCROLL_CEILING: Duration = Duration::from_secs(30);

/// A message to send once the new conversation is mounted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingIntent {
    /// Conversation the intent is addressed to.
    pub conversation: ConversationId,
    /// Text to send.
    pub content: String,
    /// Flags to forward with the send.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<FlashCardFlags>,
    /// Pin the sent message to the top of the viewport.
    #[serde(default)]
    pub pin_top: bool,
    /// When the intent was posted.
    pub written_at: DateTime<Utc>,
}

impl OutgoingIntent {
    /// Create an intent stamped with the current time.
    #[must_use]
    pub fn new(
        conversation: ConversationId,
        content: impl Into<String>,
        flags: Option<FlashCardFlags>,
    ) -> Self {
        Self {
            conversation,
            content: content.into(),
            flags,
            pin_top: false,
            written_at: Utc::now(),
        }
    }

    /// Ask the receiving controller to pin the message to the top.
    #[must_use]
    pub fn with_pin_top(mut self, pin_top: bool) -> Self {
        self.pin_top = pin_top;
        self
    }
}

/// Precomposed turns to show (and persist) once the conversation is mounted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayIntent {
    /// Conversation the intent is addressed to.
    pub conversation: ConversationId,
    /// Turns to show, in order.
    pub messages: Vec<DraftMessage>,
    /// Pin the first synthesized turn to the top of the viewport.
    #[serde(default)]
    pub pin_top: bool,
    /// When the intent was posted.
    pub written_at: DateTime<Utc>,
}

impl DisplayIntent {
    /// Create an intent stamped with the current time.
    #[must_use]
    pub fn new(conversation: ConversationId, messages: Vec<DraftMessage>, pin_top: bool) -> Self {
        Self {
            conversation,
            messages,
            pin_top,
            written_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ScrollSuppression {
    conversation: ConversationId,
    until: DateTime<Utc>,
}

/// Intent mailbox over a durable store.
pub struct Mailbox<S> {
    store: S,
    taken: HashSet<String>,
    scroll_ceiling: Duration,
}

impl<S: DurableStore> Mailbox<S> {
    /// Create a mailbox with a fresh latch.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self {
            store,
            taken: HashSet::new(),
            scroll_ceiling: DEFAULT_SCROLL_CEILING,
        }
    }

    /// Override the scroll-suppression lifetime.
    #[must_use]
    pub const fn with_scroll_ceiling(mut self, ceiling: Duration) -> Self {
        self.scroll_ceiling = ceiling;
        self
    }

    /// The underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Write a raw record, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn write(&self, key: &str, value: &str) -> Result<()> {
        self.store.write(key, value)?;
        Ok(())
    }

    /// Read and delete a record, once per key for this instance.
    ///
    /// The latch is set on the first attempt whether or not a record existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn take_once(&mut self, key: &str) -> Result<Option<String>> {
        if !self.taken.insert(key.to_string()) {
            tracing::debug!(key, "Intent already taken by this instance");
            return Ok(None);
        }
        let value = self.store.read(key)?;
        if value.is_some() {
            self.store.delete(key)?;
        }
        Ok(value)
    }

    /// Returns true if `take_once` was already called for `key`.
    #[must_use]
    pub fn is_taken(&self, key: &str) -> bool {
        self.taken.contains(key)
    }

    // =========================================================================
    // Typed intents
    // =========================================================================

    /// Post an outgoing-message intent.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the store fails.
    pub fn post_outgoing(&self, intent: &OutgoingIntent) -> Result<()> {
        self.write(keys::PENDING_OUTGOING, &serde_json::to_string(intent)?)
    }

    /// Post a display intent.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the store fails.
    pub fn post_display(&self, intent: &DisplayIntent) -> Result<()> {
        self.write(keys::PENDING_DISPLAY, &serde_json::to_string(intent)?)
    }

    /// Take the outgoing intent addressed to `conversation`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails. Malformed records are discarded.
    pub fn take_outgoing(&mut self, conversation: &ConversationId) -> Result<Option<OutgoingIntent>> {
        let intent: Option<OutgoingIntent> = self.take_typed(keys::PENDING_OUTGOING)?;
        Ok(intent.filter(|i| addressed_to(&i.conversation, conversation)))
    }

    /// Take the display intent addressed to `conversation`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails. Malformed records are discarded.
    pub fn take_display(&mut self, conversation: &ConversationId) -> Result<Option<DisplayIntent>> {
        let intent: Option<DisplayIntent> = self.take_typed(keys::PENDING_DISPLAY)?;
        Ok(intent.filter(|i| addressed_to(&i.conversation, conversation)))
    }

    fn take_typed<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.take_once(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(intent) => Ok(Some(intent)),
            Err(e) => {
                tracing::warn!(key, error = %e, "Discarding malformed intent");
                Ok(None)
            }
        }
    }

    // =========================================================================
    // Scroll suppression
    // =========================================================================

    /// Suppress the snap-to-bottom when `conversation` next mounts.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn suppress_scroll(&self, conversation: ConversationId) -> Result<()> {
        let ttl = chrono::Duration::from_std(self.scroll_ceiling)
            .map_err(|e| SessionError::Internal(format!("scroll ceiling out of range: {e}")))?;
        let record = ScrollSuppression {
            conversation,
            until: Utc::now() + ttl,
        };
        self.write(keys::SCROLL_SUPPRESSION, &serde_json::to_string(&record)?)
    }

    /// Consume the suppression flag for `conversation`.
    ///
    /// Returns true if a live flag addressed to it was found. The flag is
    /// deleted when consumed, expired or malformed; a live flag for another
    /// conversation is left alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn take_scroll_suppression(&self, conversation: &ConversationId) -> Result<bool> {
        let Some(raw) = self.store.read(keys::SCROLL_SUPPRESSION)? else {
            return Ok(false);
        };
        let record = match serde_json::from_str::<ScrollSuppression>(&raw) {
            Ok(record) if record.until > Utc::now() => record,
            Ok(_) => {
                tracing::debug!("Clearing expired scroll suppression");
                self.store.delete(keys::SCROLL_SUPPRESSION)?;
                return Ok(false);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Discarding malformed scroll suppression");
                self.store.delete(keys::SCROLL_SUPPRESSION)?;
                return Ok(false);
            }
        };
        if record.conversation != *conversation {
            return Ok(false);
        }
        self.store.delete(keys::SCROLL_SUPPRESSION)?;
        Ok(true)
    }
}

fn addressed_to(target: &ConversationId, mounted: &ConversationId) -> bool {
    if target == mounted {
        return true;
    }
    tracing::warn!(
        addressed_to = %target,
        mounted = %mounted,
        "Discarding intent addressed to another conversation"
    );
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_store::MemoryStore;

    fn mailbox() -> Mailbox<MemoryStore> {
        Mailbox::new(MemoryStore::new())
    }

    #[test]
    fn take_once_returns_value_once() {
        let mut mb = mailbox();
        mb.write(keys::PENDING_OUTGOING, "x").unwrap();
        assert_eq!(mb.take_once(keys::PENDING_OUTGOING).unwrap().as_deref(), Some("x"));
        assert!(mb.take_once(keys::PENDING_OUTGOING).unwrap().is_none());
        assert!(mb.store().read(keys::PENDING_OUTGOING).unwrap().is_none());
    }

    #[test]
    fn latch_set_even_when_nothing_was_found() {
        let mut mb = mailbox();
        assert!(mb.take_once(keys::PENDING_DISPLAY).unwrap().is_none());
        mb.write(keys::PENDING_DISPLAY, "late").unwrap();
        assert!(mb.take_once(keys::PENDING_DISPLAY).unwrap().is_none());
        // the record stays for the next instance
        assert!(mb.store().read(keys::PENDING_DISPLAY).unwrap().is_some());
    }

    #[test]
    fn latch_is_per_key() {
        let mut mb = mailbox();
        mb.take_once(keys::PENDING_OUTGOING).unwrap();
        assert!(mb.is_taken(keys::PENDING_OUTGOING));
        assert!(!mb.is_taken(keys::PENDING_DISPLAY));
    }

    #[test]
    fn outgoing_intent_round_trip_through_store() {
        let id = ConversationId::generate();
        let poster = mailbox();
        poster
            .post_outgoing(&OutgoingIntent::new(id, "find me a flat", None).with_pin_top(true))
            .unwrap();

        let mut taker = Mailbox::new(MemoryStore::new());
        assert!(taker.take_outgoing(&id).unwrap().is_none());

        let mut taker = Mailbox::new(poster.store);
        let intent = taker.take_outgoing(&id).unwrap().unwrap();
        assert_eq!(intent.content, "find me a flat");
        assert!(intent.pin_top);
    }

    #[test]
    fn intent_for_other_conversation_is_discarded() {
        let mut mb = mailbox();
        mb.post_outgoing(&OutgoingIntent::new(ConversationId::generate(), "hi", None))
            .unwrap();
        assert!(mb.take_outgoing(&ConversationId::generate()).unwrap().is_none());
        assert!(mb.store().read(keys::PENDING_OUTGOING).unwrap().is_none());
    }

    #[test]
    fn malformed_intent_is_discarded() {
        let mut mb = mailbox();
        mb.write(keys::PENDING_DISPLAY, "{not json").unwrap();
        assert!(mb.take_display(&ConversationId::generate()).unwrap().is_none());
        assert!(mb.store().is_empty());
    }

    #[test]
    fn scroll_suppression_is_consumed_by_its_conversation() {
        let mb = mailbox();
        let target = ConversationId::generate();
        let other = ConversationId::generate();
        assert!(!mb.take_scroll_suppression(&target).unwrap());

        mb.suppress_scroll(target).unwrap();
        assert!(!mb.take_scroll_suppression(&other).unwrap());
        assert!(mb.store().read(keys::SCROLL_SUPPRESSION).unwrap().is_some());

        assert!(mb.take_scroll_suppression(&target).unwrap());
        assert!(!mb.take_scroll_suppression(&target).unwrap());
        assert!(mb.store().is_empty());
    }

    #[test]
    fn expired_scroll_suppression_is_cleared() {
        let target = ConversationId::generate();
        let expired = mailbox().with_scroll_ceiling(Duration::ZERO);
        expired.suppress_scroll(target).unwrap();
        assert!(!expired.take_scroll_suppression(&target).unwrap());
        assert!(expired.store().is_empty());
    }
}
