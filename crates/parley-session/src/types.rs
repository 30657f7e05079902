//! Controller configuration, send options and the view-model.

use std::collections::BTreeMap;
use std::time::Duration;

use parley_core::{ConversationId, Message, PayloadCategory};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::activity::ScrollTarget;
use crate::collab::FlashCardFlags;

/// Configuration for a session controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Model requested when creating conversations.
    #[serde(default = "ControllerConfig::default_model")]
    pub model: String,
    /// Quiet period before the stall indicator shows (milliseconds).
    #[serde(default = "ControllerConfig::default_stall_threshold")]
    pub stall_threshold_ms: u64,
    /// Stall check interval while streaming (milliseconds).
    #[serde(default = "ControllerConfig::default_stall_poll")]
    pub stall_poll_ms: u64,
    /// How long a pin-to-top directive holds (milliseconds).
    #[serde(default = "ControllerConfig::default_pin_window")]
    pub pin_retry_window_ms: u64,
    /// Lifetime of the scroll-suppression flag (seconds).
    #[serde(default = "ControllerConfig::default_scroll_suppression")]
    pub scroll_suppression_secs: u64,
    /// Longest title derived from the first message (characters).
    #[serde(default = "ControllerConfig::default_title_max")]
    pub title_max_chars: usize,
    /// Capacity of the stream signal channel.
    #[serde(default = "ControllerConfig::default_channel_capacity")]
    pub channel_capacity: usize,
}

impl ControllerConfig {
    fn default_model() -> String {
        "default".to_string()
    }

    const fn default_stall_threshold() -> u64 {
        600
    }

    const fn default_stall_poll() -> u64 {
        200
    }

    const fn default_pin_window() -> u64 {
        1500
    }

    const fn default_scroll_suppression() -> u64 {
        30
    }

    const fn default_title_max() -> usize {
        60
    }

    const fn default_channel_capacity() -> usize {
        64
    }

    /// Get the stall threshold as a Duration.
    #[must_use]
    pub const fn stall_threshold(&self) -> Duration {
        Duration::from_millis(self.stall_threshold_ms)
    }

    /// Get the stall poll interval as a Duration.
    #[must_use]
    pub const fn stall_poll(&self) -> Duration {
        Duration::from_millis(self.stall_poll_ms)
    }

    /// Get the pin window as a Duration.
    #[must_use]
    pub const fn pin_window(&self) -> Duration {
        Duration::from_millis(self.pin_retry_window_ms)
    }

    /// Get the scroll-suppression lifetime as a Duration.
    #[must_use]
    pub const fn scroll_suppression(&self) -> Duration {
        Duration::from_secs(self.scroll_suppression_secs)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            model: Self::default_model(),
            stall_threshold_ms: Self::default_stall_threshold(),
            stall_poll_ms: Self::default_stall_poll(),
            pin_retry_window_ms: Self::default_pin_window(),
            scroll_suppression_secs: Self::default_scroll_suppression(),
            title_max_chars: Self::default_title_max(),
            channel_capacity: Self::default_channel_capacity(),
        }
    }
}

/// Options for `send`.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Flags forwarded to the assistant.
    pub flags: Option<FlashCardFlags>,
    /// Pin the sent message to the top of the viewport while the answer
    /// renders below it.
    pub pin_top: bool,
}

/// Options for `present`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PresentOptions {
    /// Pin the first presented turn to the top of the viewport.
    pub pin_top: bool,
}

/// What a send did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// A conversation was created; the caller is being navigated to it.
    Navigating(ConversationId),
    /// A stream session started in the bound conversation.
    Streaming,
    /// Turns were shown locally without streaming.
    Presented,
    /// A session is already active; nothing happened.
    Rejected,
}

/// Snapshot of everything the renderer needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewModel {
    /// Bound conversation, if any.
    pub conversation: Option<ConversationId>,
    /// Committed turns.
    pub messages: Vec<Message>,
    /// Text of the in-flight answer.
    pub in_flight_text: String,
    /// In-flight side-panels.
    pub in_flight_slots: BTreeMap<PayloadCategory, Value>,
    /// Ephemeral progress hint.
    pub status: Option<String>,
    /// A stream session is active.
    pub is_streaming: bool,
    /// The active stream has gone quiet.
    pub stalled: bool,
    /// Last error to show.
    pub error: Option<String>,
    /// Where the viewport should be.
    pub scroll: ScrollTarget,
}

/// Derive a conversation title from the first message.
///
/// Takes the first non-blank line, truncated to `max_chars` characters.
#[must_use]
pub fn derive_title(content: &str, max_chars: usize) -> String {
    let line = content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default();
    line.chars().take(max_chars).collect()
}
