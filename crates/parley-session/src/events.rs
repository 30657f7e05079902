//! Wire vocabulary of the assistant stream.
//!
//! Frames carry a `type` tag. When a blank-line-delimited block names its
//! event but the JSON has no `type`, the event name stands in for it.
//! Unrecognised tags are dropped without surfacing anything.

use parley_core::{is_falsy, DraftMessage, PayloadCategory, Placement, SidePayload};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::decoder::Frame;

/// Frame body as sent by the backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireEvent {
    /// Streamed text fragment.
    #[serde(alias = "text", alias = "delta", alias = "content_delta")]
    TextDelta {
        /// Text to append.
        #[serde(default, alias = "text", alias = "content")]
        delta: String,
    },
    /// Marketplace listing set.
    MarketplaceData {
        /// Opaque body.
        #[serde(default, alias = "payload")]
        data: Value,
    },
    /// Real-estate listing set.
    RealEstateData {
        /// Opaque body.
        #[serde(default, alias = "payload")]
        data: Value,
    },
    /// Curated item grid.
    CuratedGrid {
        /// Opaque body.
        #[serde(default, alias = "payload")]
        data: Value,
    },
    /// Apparel listing set.
    ApparelData {
        /// Opaque body.
        #[serde(default, alias = "payload")]
        data: Value,
    },
    /// Ephemeral progress hint.
    Status {
        /// Hint text.
        #[serde(default, alias = "message")]
        status: String,
    },
    /// Response-level metadata sent ahead of the text.
    Metadata {
        /// The backend will not stream the prologue as text deltas.
        #[serde(default)]
        skip_streaming: bool,
        /// Text to show before the streamed answer.
        #[serde(default)]
        prologue: Option<String>,
        /// Category tag of the answer.
        #[serde(default)]
        category: Option<String>,
        /// Side-panel placement relative to the text.
        #[serde(default)]
        placement: Option<Placement>,
    },
    /// End of the response.
    #[serde(alias = "end", alias = "complete")]
    Done,
    /// Backend-reported failure.
    Error {
        /// Failure description.
        #[serde(default, alias = "message")]
        error: String,
        /// Machine-readable code, string or number.
        #[serde(default)]
        code: Option<Value>,
        /// The stream continues after this error.
        #[serde(default)]
        recoverable: bool,
    },
    /// Any tag this client does not know.
    #[serde(other)]
    Unknown,
}

/// A typed transition request for the reducer.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Append text to the in-flight answer.
    TextDelta(String),
    /// Replace one side-panel slot.
    Payload(SidePayload),
    /// Replace the status hint.
    Status(String),
    /// Response metadata.
    Prologue {
        /// Prologue is not streamed and must be appended locally.
        skip_streaming: bool,
        /// Prologue text.
        prologue: Option<String>,
        /// Category tag.
        category: Option<String>,
        /// Side-panel placement.
        placement: Option<Placement>,
    },
    /// The response is complete.
    Terminal,
    /// The backend reported a failure.
    Error {
        /// Failure description.
        message: String,
        /// Machine-readable code.
        code: Option<String>,
        /// The stream continues after this error.
        recoverable: bool,
    },
    /// The whole response arrived as one document.
    BareReply(DraftMessage),
}

impl WireEvent {
    /// Convert to a reducer event. `None` for unknown tags.
    #[must_use]
    pub fn into_event(self) -> Option<StreamEvent> {
        let payload = |category, data| {
            Some(StreamEvent::Payload(SidePayload::new(category, data)))
        };
        match self {
            Self::TextDelta { delta } => Some(StreamEvent::TextDelta(delta)),
            Self::MarketplaceData { data } => payload(PayloadCategory::Marketplace, data),
            Self::RealEstateData { data } => payload(PayloadCategory::RealEstate, data),
            Self::CuratedGrid { data } => payload(PayloadCategory::CuratedGrid, data),
            Self::ApparelData { data } => payload(PayloadCategory::Apparel, data),
            Self::Status { status } => Some(StreamEvent::Status(status)),
            Self::Metadata {
                skip_streaming,
                prologue,
                category,
                placement,
            } => Some(StreamEvent::Prologue {
                skip_streaming,
                prologue,
                category,
                placement,
            }),
            Self::Done => Some(StreamEvent::Terminal),
            Self::Error {
                error,
                code,
                recoverable,
            } => Some(StreamEvent::Error {
                message: if error.is_empty() {
                    "the assistant reported an error".to_string()
                } else {
                    error
                },
                code: code.map(|c| match c {
                    Value::String(s) => s,
                    other => other.to_string(),
                }),
                recoverable,
            }),
            Self::Unknown => None,
        }
    }
}

/// Interpret one decoded frame.
///
/// Returns `None` for frames that should be dropped: unknown tags, bodies
/// that do not match their tag, and bare documents with nothing to show.
#[must_use]
pub fn interpret(frame: Frame) -> Option<StreamEvent> {
    if frame.whole_response {
        return bare_reply(&frame.payload).map(StreamEvent::BareReply);
    }

    let Frame {
        event, mut payload, ..
    } = frame;
    if let (Some(name), Value::Object(map)) = (event, &mut payload) {
        if !map.contains_key("type") {
            map.insert("type".to_string(), Value::String(name));
        }
    }

    match serde_json::from_value::<WireEvent>(payload) {
        Ok(WireEvent::Unknown) => {
            tracing::debug!("Dropping frame with unrecognised type");
            None
        }
        Ok(wire) => wire.into_event(),
        Err(e) => {
            tracing::debug!(error = %e, "Dropping frame that does not match its type");
            None
        }
    }
}

/// Text fields a bare reply may use, in order of preference.
const BARE_TEXT_FIELDS: [&str; 5] = ["text", "content", "message", "reply", "answer"];

/// Build an assistant turn from a bare response document.
fn bare_reply(document: &Value) -> Option<DraftMessage> {
    let object = document.as_object()?;
    let text = BARE_TEXT_FIELDS
        .iter()
        .find_map(|field| object.get(*field).and_then(Value::as_str))
        .unwrap_or_default();
    let attachment = bare_attachment(object);

    if text.is_empty() && attachment.is_none() {
        tracing::debug!("Bare document has neither text nor a side-panel");
        return None;
    }

    let mut draft = DraftMessage::assistant(text);
    if let Some(category) = object.get("category").and_then(Value::as_str) {
        draft = draft.with_category(category);
    }
    if let Some(placement) = object
        .get("placement")
        .and_then(|p| serde_json::from_value::<Placement>(p.clone()).ok())
    {
        draft = draft.with_placement(placement);
    }
    if let Some(attachment) = attachment {
        draft = draft.with_attachment(attachment);
    }
    Some(draft)
}

fn bare_attachment(object: &Map<String, Value>) -> Option<SidePayload> {
    PayloadCategory::ALL.into_iter().find_map(|category| {
        object
            .get(category.wire_tag())
            .filter(|body| !is_falsy(body))
            .map(|body| SidePayload::new(category, body.clone()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::Role;
    use serde_json::json;

    fn frame(payload: Value) -> Frame {
        Frame {
            event: None,
            payload,
            whole_response: false,
        }
    }

    // =========================================================================
    // Tagged frames
    // =========================================================================

    #[test]
    fn text_delta_and_aliases() {
        let event = interpret(frame(json!({"type": "text_delta", "delta": "Hi"})));
        assert_eq!(event, Some(StreamEvent::TextDelta("Hi".into())));

        let event = interpret(frame(json!({"type": "text", "text": "Yo"})));
        assert_eq!(event, Some(StreamEvent::TextDelta("Yo".into())));
    }

    #[test]
    fn payload_categories() {
        let cases = [
            ("marketplace_data", PayloadCategory::Marketplace),
            ("real_estate_data", PayloadCategory::RealEstate),
            ("curated_grid", PayloadCategory::CuratedGrid),
            ("apparel_data", PayloadCategory::Apparel),
        ];
        for (tag, category) in cases {
            let event = interpret(frame(json!({"type": tag, "data": [{"id": 1}]})));
            match event {
                Some(StreamEvent::Payload(p)) => {
                    assert_eq!(p.category, category);
                    assert_eq!(p.body, json!([{"id": 1}]));
                }
                other => panic!("Expected payload for {tag}, got {other:?}"),
            }
        }
    }

    #[test]
    fn payload_without_data_has_null_body() {
        let event = interpret(frame(json!({"type": "apparel_data"})));
        match event {
            Some(StreamEvent::Payload(p)) => assert!(p.is_empty()),
            other => panic!("Expected payload, got {other:?}"),
        }
    }

    #[test]
    fn metadata_with_prologue() {
        let event = interpret(frame(json!({
            "type": "metadata",
            "skip_streaming": true,
            "prologue": "Here is what I found:",
            "category": "real_estate",
            "placement": "before"
        })));
        assert_eq!(
            event,
            Some(StreamEvent::Prologue {
                skip_streaming: true,
                prologue: Some("Here is what I found:".into()),
                category: Some("real_estate".into()),
                placement: Some(Placement::Before),
            })
        );
    }

    #[test]
    fn done_and_aliases() {
        for tag in ["done", "end", "complete"] {
            assert_eq!(
                interpret(frame(json!({"type": tag, "message_id": 9}))),
                Some(StreamEvent::Terminal)
            );
        }
    }

    #[test]
    fn error_with_numeric_code() {
        let event = interpret(frame(json!({"type": "error", "error": "quota", "code": 429})));
        assert_eq!(
            event,
            Some(StreamEvent::Error {
                message: "quota".into(),
                code: Some("429".into()),
                recoverable: false,
            })
        );
    }

    #[test]
    fn unknown_tag_is_dropped() {
        assert_eq!(interpret(frame(json!({"type": "heartbeat", "seq": 3}))), None);
    }

    #[test]
    fn missing_type_without_event_is_dropped() {
        assert_eq!(interpret(frame(json!({"delta": "orphan"}))), None);
    }

    #[test]
    fn event_name_stands_in_for_missing_type() {
        let framed = Frame {
            event: Some("status".into()),
            payload: json!({"status": "Comparing prices"}),
            whole_response: false,
        };
        assert_eq!(
            interpret(framed),
            Some(StreamEvent::Status("Comparing prices".into()))
        );
    }

    #[test]
    fn explicit_type_wins_over_event_name() {
        let framed = Frame {
            event: Some("message".into()),
            payload: json!({"type": "text_delta", "delta": "x"}),
            whole_response: false,
        };
        assert_eq!(interpret(framed), Some(StreamEvent::TextDelta("x".into())));
    }

    // =========================================================================
    // Bare documents
    // =========================================================================

    #[test]
    fn bare_reply_text() {
        let framed = Frame {
            event: None,
            payload: json!({"text": "Paris market update"}),
            whole_response: true,
        };
        match interpret(framed) {
            Some(StreamEvent::BareReply(draft)) => {
                assert_eq!(draft.role, Role::Assistant);
                assert_eq!(draft.content, "Paris market update");
                assert!(draft.attachment.is_none());
            }
            other => panic!("Expected bare reply, got {other:?}"),
        }
    }

    #[test]
    fn bare_reply_with_side_panel() {
        let framed = Frame {
            event: None,
            payload: json!({
                "text": "Three listings",
                "category": "real_estate",
                "marketplace_data": [],
                "real_estate_data": [{"id": 1}, {"id": 2}, {"id": 3}]
            }),
            whole_response: true,
        };
        match interpret(framed) {
            Some(StreamEvent::BareReply(draft)) => {
                let attachment = draft.attachment.unwrap();
                assert_eq!(attachment.category, PayloadCategory::RealEstate);
                assert_eq!(attachment.item_count(), 3);
                assert_eq!(draft.category.as_deref(), Some("real_estate"));
            }
            other => panic!("Expected bare reply, got {other:?}"),
        }
    }

    #[test]
    fn empty_bare_document_is_dropped() {
        let framed = Frame {
            event: None,
            payload: json!({"ok": true}),
            whole_response: true,
        };
        assert_eq!(interpret(framed), None);
    }
}
