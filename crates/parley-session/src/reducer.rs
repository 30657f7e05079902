//! In-flight accumulator and the reducer that drives it.
//!
//! The reducer is pure: it mutates the accumulator and returns an [`Effect`]
//! for the controller to perform. Anything touching the network (history
//! reconciliation, persistence) happens in the controller.

use std::collections::BTreeMap;

use parley_core::{DraftMessage, PayloadCategory, Placement, SidePayload};
use serde_json::Value;

use crate::events::StreamEvent;

/// Partially received assistant turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InFlight {
    /// Text accumulated from deltas, plus the prologue when it is not streamed.
    pub text: String,
    /// Latest body per side-panel category.
    pub slots: BTreeMap<PayloadCategory, Value>,
    /// Ephemeral progress hint.
    pub status: Option<String>,
    /// Category tag announced by metadata.
    pub category: Option<String>,
    /// Side-panel placement announced by metadata.
    pub placement: Option<Placement>,
    /// The prologue was already appended in this session.
    pub prologue_applied: bool,
}

impl InFlight {
    /// Reset to the empty state.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Returns true if nothing has been received.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.slots.is_empty() && self.status.is_none()
    }

    /// Filled slots in display order.
    #[must_use]
    pub fn attachments(&self) -> Vec<SidePayload> {
        self.slots
            .iter()
            .map(|(category, body)| SidePayload::new(*category, body.clone()))
            .collect()
    }
}

/// What the controller must do after a reduction.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// State changed, nothing else to do.
    None,
    /// Record activity for the stall indicator.
    Activity,
    /// Re-fetch committed history and clear the accumulator. Ends the session.
    Reconcile,
    /// Append this assistant turn locally. Ends the session.
    Commit(DraftMessage),
    /// Show an error; the session continues.
    Surface {
        /// Error text.
        message: String,
        /// Backend code.
        code: Option<String>,
    },
    /// Show an error and end the session. In-flight text is kept.
    Fail {
        /// Error text.
        message: String,
        /// Backend code.
        code: Option<String>,
    },
}

impl Effect {
    /// Returns true if this effect ends the stream session.
    #[must_use]
    pub const fn ends_session(&self) -> bool {
        matches!(self, Self::Reconcile | Self::Commit(_) | Self::Fail { .. })
    }
}

/// Apply one event.
pub fn reduce(state: &mut InFlight, event: StreamEvent) -> Effect {
    match event {
        StreamEvent::TextDelta(delta) => {
            state.text.push_str(&delta);
            Effect::Activity
        }
        StreamEvent::Payload(payload) => {
            if payload.is_empty() {
                tracing::debug!(category = %payload.category, "Ignoring empty side-payload");
                return Effect::None;
            }
            state.slots.insert(payload.category, payload.body);
            Effect::None
        }
        StreamEvent::Status(status) => {
            state.status = (!status.is_empty()).then_some(status);
            Effect::Activity
        }
        StreamEvent::Prologue {
            skip_streaming,
            prologue,
            category,
            placement,
        } => {
            if category.is_some() {
                state.category = category;
            }
            if placement.is_some() {
                state.placement = placement;
            }
            if let Some(prologue) = prologue.filter(|p| skip_streaming && !p.is_empty()) {
                if !state.prologue_applied {
                    state.text.push_str(&prologue);
                    state.prologue_applied = true;
                }
            }
            Effect::None
        }
        StreamEvent::Terminal => {
            state.status = None;
            Effect::Reconcile
        }
        StreamEvent::Error {
            message,
            code,
            recoverable,
        } => {
            state.status = None;
            if recoverable {
                Effect::Surface { message, code }
            } else {
                Effect::Fail { message, code }
            }
        }
        StreamEvent::BareReply(draft) => {
            state.status = None;
            Effect::Commit(draft)
        }
    }
}

/// Apply events in order, stopping after the first one that ends the session.
///
/// Events after that point belong to a finished session and are discarded.
pub fn reduce_batch<I>(state: &mut InFlight, events: I) -> Vec<Effect>
where
    I: IntoIterator<Item = StreamEvent>,
{
    let mut effects = Vec::new();
    for event in events {
        let effect = reduce(state, event);
        let done = effect.ends_session();
        effects.push(effect);
        if done {
            break;
        }
    }
    effects
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(category: PayloadCategory, body: Value) -> StreamEvent {
        StreamEvent::Payload(SidePayload::new(category, body))
    }

    #[test]
    fn deltas_accumulate_before_terminal() {
        let mut state = InFlight::default();
        let effects = reduce_batch(
            &mut state,
            [
                StreamEvent::TextDelta("Hello ".into()),
                StreamEvent::TextDelta("world".into()),
                StreamEvent::Terminal,
            ],
        );
        assert_eq!(state.text, "Hello world");
        assert_eq!(
            effects,
            vec![Effect::Activity, Effect::Activity, Effect::Reconcile]
        );
    }

    #[test]
    fn empty_delta_marks_activity_only() {
        let mut state = InFlight::default();
        assert_eq!(
            reduce(&mut state, StreamEvent::TextDelta(String::new())),
            Effect::Activity
        );
        assert!(state.is_empty());
    }

    #[test]
    fn payload_replaces_slot_wholesale() {
        let mut state = InFlight::default();
        reduce(&mut state, payload(PayloadCategory::Apparel, json!([1, 2])));
        reduce(&mut state, payload(PayloadCategory::Apparel, json!([3])));
        assert_eq!(state.slots[&PayloadCategory::Apparel], json!([3]));
    }

    #[test]
    fn empty_payload_never_clears_a_slot() {
        let mut state = InFlight::default();
        reduce(&mut state, payload(PayloadCategory::RealEstate, json!([{"id": 1}])));
        for empty in [json!(null), json!([]), json!({}), json!(""), json!(false)] {
            assert_eq!(
                reduce(&mut state, payload(PayloadCategory::RealEstate, empty)),
                Effect::None
            );
        }
        assert_eq!(state.slots[&PayloadCategory::RealEstate], json!([{"id": 1}]));
    }

    #[test]
    fn status_replaced_and_cleared() {
        let mut state = InFlight::default();
        reduce(&mut state, StreamEvent::Status("Searching".into()));
        reduce(&mut state, StreamEvent::Status("Ranking".into()));
        assert_eq!(state.status.as_deref(), Some("Ranking"));
        reduce(&mut state, StreamEvent::Terminal);
        assert!(state.status.is_none());
    }

    #[test]
    fn prologue_appended_once_when_not_streamed() {
        let mut state = InFlight::default();
        let prologue = || StreamEvent::Prologue {
            skip_streaming: true,
            prologue: Some("Top picks: ".into()),
            category: Some("apparel".into()),
            placement: Some(Placement::Before),
        };
        reduce(&mut state, prologue());
        reduce(&mut state, prologue());
        reduce(&mut state, StreamEvent::TextDelta("boots".into()));
        assert_eq!(state.text, "Top picks: boots");
        assert_eq!(state.category.as_deref(), Some("apparel"));
        assert_eq!(state.placement, Some(Placement::Before));
    }

    #[test]
    fn streamed_prologue_is_not_duplicated() {
        let mut state = InFlight::default();
        reduce(
            &mut state,
            StreamEvent::Prologue {
                skip_streaming: false,
                prologue: Some("Intro".into()),
                category: None,
                placement: None,
            },
        );
        assert!(state.text.is_empty());
        assert!(!state.prologue_applied);
    }

    #[test]
    fn recoverable_error_surfaces_and_keeps_text() {
        let mut state = InFlight::default();
        reduce(&mut state, StreamEvent::TextDelta("partial".into()));
        let effect = reduce(
            &mut state,
            StreamEvent::Error {
                message: "tool timed out".into(),
                code: None,
                recoverable: true,
            },
        );
        assert!(!effect.ends_session());
        assert_eq!(state.text, "partial");
    }

    #[test]
    fn unrecoverable_error_ends_session() {
        let mut state = InFlight::default();
        reduce(&mut state, StreamEvent::Status("Thinking".into()));
        let effect = reduce(
            &mut state,
            StreamEvent::Error {
                message: "overloaded".into(),
                code: Some("503".into()),
                recoverable: false,
            },
        );
        assert!(effect.ends_session());
        assert!(state.status.is_none());
    }

    #[test]
    fn batch_stops_at_terminal() {
        let mut state = InFlight::default();
        let effects = reduce_batch(
            &mut state,
            [
                payload(PayloadCategory::Marketplace, json!([1])),
                StreamEvent::Terminal,
                StreamEvent::TextDelta("late".into()),
            ],
        );
        assert_eq!(effects.len(), 2);
        assert!(state.text.is_empty());
        assert_eq!(state.attachments().len(), 1);
    }
}
