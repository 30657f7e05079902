//! Committed conversation turns and their structured side-payloads.
//!
//! A [`Message`] is immutable once reconciled with the conversation store.
//! The client only appends new ones or replaces the whole list after a
//! history fetch. A [`DraftMessage`] is the same turn before the store has
//! assigned it an identity.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::ids::MessageId;

/// Author of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Typed by the person at the keyboard.
    User,
    /// Produced by the assistant backend.
    Assistant,
}

impl Role {
    /// Get the role as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// The kinds of structured side-panel a turn can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadCategory {
    /// Marketplace listing set.
    Marketplace,
    /// Real-estate listing set.
    RealEstate,
    /// Curated item grid.
    CuratedGrid,
    /// Apparel listing set.
    Apparel,
}

impl PayloadCategory {
    /// Every category, in display order.
    pub const ALL: [Self; 4] = [
        Self::Marketplace,
        Self::RealEstate,
        Self::CuratedGrid,
        Self::Apparel,
    ];

    /// Get the category as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Marketplace => "marketplace",
            Self::RealEstate => "real_estate",
            Self::CuratedGrid => "curated_grid",
            Self::Apparel => "apparel",
        }
    }

    /// The stream event tag (and bare-reply field name) carrying this category.
    #[must_use]
    pub const fn wire_tag(&self) -> &'static str {
        match self {
            Self::Marketplace => "marketplace_data",
            Self::RealEstate => "real_estate_data",
            Self::CuratedGrid => "curated_grid",
            Self::Apparel => "apparel_data",
        }
    }

    /// Human-readable panel title.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Marketplace => "Marketplace",
            Self::RealEstate => "Real estate",
            Self::CuratedGrid => "Curated picks",
            Self::Apparel => "Apparel",
        }
    }
}

impl fmt::Display for PayloadCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayloadCategory {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s || c.wire_tag() == s)
            .ok_or_else(|| CoreError::UnknownCategory(s.to_string()))
    }
}

/// Where a side-payload renders relative to the text of its turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Panel above the text.
    Before,
    /// Panel below the text.
    #[default]
    After,
}

/// A structured side-panel attached to a turn.
///
/// The body is opaque to parley and passed through verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SidePayload {
    /// Which panel this is.
    pub category: PayloadCategory,
    /// Backend-defined body.
    pub body: Value,
}

impl SidePayload {
    /// Create a side-payload.
    #[must_use]
    pub const fn new(category: PayloadCategory, body: Value) -> Self {
        Self { category, body }
    }

    /// Returns true if the body carries nothing worth showing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        is_falsy(&self.body)
    }

    /// Number of entries when the body is a list, 1 for any other non-empty body.
    #[must_use]
    pub fn item_count(&self) -> usize {
        match &self.body {
            Value::Array(items) => items.len(),
            Value::Object(map) => map
                .get("items")
                .and_then(Value::as_array)
                .map_or(1, Vec::len),
            _ if self.is_empty() => 0,
            _ => 1,
        }
    }
}

/// Returns true for `null`, `false`, `0`, `""`, `[]` and `{}`.
#[must_use]
pub fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// A committed, persisted turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Ordinal identity assigned by the store.
    pub id: MessageId,
    /// Author of the turn.
    pub role: Role,
    /// Primary text content.
    #[serde(default)]
    pub content: String,
    /// Optional category tag set by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Optional structured side-panel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<SidePayload>,
    /// Where the side-panel renders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement: Option<Placement>,
}

impl Message {
    /// Assign an identity to a draft.
    #[must_use]
    pub fn from_draft(id: MessageId, draft: DraftMessage) -> Self {
        Self {
            id,
            role: draft.role,
            content: draft.content,
            category: draft.category,
            attachment: draft.attachment,
            placement: draft.placement,
        }
    }
}

/// A turn that has not been assigned an identity yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftMessage {
    /// Author of the turn.
    pub role: Role,
    /// Primary text content.
    #[serde(default)]
    pub content: String,
    /// Optional category tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Optional structured side-panel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<SidePayload>,
    /// Where the side-panel renders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement: Option<Placement>,
}

impl DraftMessage {
    /// A plain user turn.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    /// A plain assistant turn.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            category: None,
            attachment: None,
            placement: None,
        }
    }

    /// Attach a side-panel. Empty bodies are dropped.
    #[must_use]
    pub fn with_attachment(mut self, payload: SidePayload) -> Self {
        if !payload.is_empty() {
            self.attachment = Some(payload);
        }
        self
    }

    /// Set the category tag.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Set the side-panel placement.
    #[must_use]
    pub const fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = Some(placement);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn falsy_bodies() {
        for value in [json!(null), json!(false), json!(0), json!(""), json!([]), json!({})] {
            assert!(is_falsy(&value), "{value} should be falsy");
        }
        for value in [json!(true), json!(1), json!("x"), json!([1]), json!({"a": 1})] {
            assert!(!is_falsy(&value), "{value} should not be falsy");
        }
    }

    #[test]
    fn category_parses_from_name_or_wire_tag() {
        assert_eq!(
            "real_estate".parse::<PayloadCategory>().unwrap(),
            PayloadCategory::RealEstate
        );
        assert_eq!(
            "apparel_data".parse::<PayloadCategory>().unwrap(),
            PayloadCategory::Apparel
        );
        assert!("weather".parse::<PayloadCategory>().is_err());
    }

    #[test]
    fn empty_attachment_is_dropped_from_draft() {
        let draft = DraftMessage::assistant("hi")
            .with_attachment(SidePayload::new(PayloadCategory::Apparel, json!([])));
        assert!(draft.attachment.is_none());
    }

    #[test]
    fn item_count_reads_lists_and_wrapped_lists() {
        let list = SidePayload::new(PayloadCategory::Marketplace, json!([1, 2, 3]));
        assert_eq!(list.item_count(), 3);
        let wrapped = SidePayload::new(PayloadCategory::CuratedGrid, json!({"items": [1, 2]}));
        assert_eq!(wrapped.item_count(), 2);
        let scalar = SidePayload::new(PayloadCategory::RealEstate, json!({"city": "Paris"}));
        assert_eq!(scalar.item_count(), 1);
    }

    #[test]
    fn message_deserializes_with_optional_fields_missing() {
        let msg: Message =
            serde_json::from_str(r#"{"id": 3, "role": "assistant", "content": "done"}"#).unwrap();
        assert_eq!(msg.id, MessageId::new(3));
        assert_eq!(msg.role, Role::Assistant);
        assert!(msg.attachment.is_none());
        assert!(msg.placement.is_none());
    }

    #[test]
    fn message_with_attachment_serializes_category_snake_case() {
        let msg = Message::from_draft(
            MessageId::new(1),
            DraftMessage::assistant("listings")
                .with_attachment(SidePayload::new(
                    PayloadCategory::RealEstate,
                    json!([{"id": 1}]),
                ))
                .with_placement(Placement::Before),
        );
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["attachment"]["category"], "real_estate");
        assert_eq!(value["placement"], "before");
    }
}
