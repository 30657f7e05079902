//! Streaming ingestion and session continuity for parley chat clients.
//!
//! This crate turns the assistant's chunked response body into committed
//! conversation turns, and carries a user's first message across the
//! navigation that creating a conversation causes.
//!
//! # Architecture
//!
//! ```text
//!                    send / present / on_mount
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     SessionController                        │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐   │
//! │  │  Binding    │ │  Mailbox    │ │  Activity / Scroll  │   │
//! │  │  lifecycle  │ │ (take once) │ │  policy             │   │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//!          ▲ StreamSignal (mpsc)                │
//!          │                                    ▼
//! ┌──────────────────┐   chunks   ┌──────────────────────────────┐
//! │   reader task    │───────────▶│ FrameDecoder → interpret →   │
//! │ (AssistantStream)│            │ reduce → Effect              │
//! └──────────────────┘            └──────────────────────────────┘
//!                              │
//!               ┌──────────────┼──────────────┐
//!               ▼              ▼              ▼
//!      ┌──────────────┐ ┌───────────┐ ┌────────────────┐
//!      │ Conversation │ │ Navigator │ │  DurableStore  │
//!      │    Store     │ │           │ │ (memory/Rocks) │
//!      └──────────────┘ └───────────┘ └────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use parley_session::local::{ChannelNavigator, MemoryConversations, ScriptedAssistant};
//! use parley_session::{Collaborators, ControllerConfig, SendOptions, SessionController};
//! use parley_store::MemoryStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let history = Arc::new(MemoryConversations::new());
//! let (navigator, _targets) = ChannelNavigator::channel();
//! let deps = Collaborators {
//!     conversations: history.clone(),
//!     assistant: Arc::new(ScriptedAssistant::echo(history.clone())),
//!     navigator: Arc::new(navigator),
//!     store: Arc::new(MemoryStore::new()),
//! };
//!
//! let id = history.seed("Weekend plans");
//! let mut controller = SessionController::new(deps, ControllerConfig::default(), Some(id));
//! controller.on_mount().await?;
//! controller.send("Any flats in Lyon?", SendOptions::default()).await?;
//! controller.settle().await;
//! println!("{} messages", controller.view().messages.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Stream formats
//!
//! The body is decoded as one of three formats, detected from its first
//! bytes: blank-line-delimited event blocks, newline-delimited JSON, or a
//! single JSON document carrying the whole reply. See [`decoder`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod activity;
pub mod collab;
pub mod controller;
pub mod decoder;
pub mod error;
pub mod events;
pub mod http;
pub mod lifecycle;
pub mod local;
pub mod mailbox;
pub mod reducer;
pub mod types;

pub use activity::{ActivityMonitor, ScrollPolicy, ScrollTarget};
pub use collab::{
    AssistantStream, ChunkStream, ConversationSnapshot, ConversationStore, ConversationSummary,
    FlashCardFlags, Navigator, StreamRequest,
};
pub use controller::{
    Collaborators, SessionController, SessionToken, SignalKind, StreamSignal, Wake,
};
pub use decoder::{DecodeMode, Frame, FrameDecoder};
pub use error::{Result, SessionError};
pub use events::{interpret, StreamEvent, WireEvent};
pub use http::{HttpAssistantStream, HttpConversationStore};
pub use lifecycle::Binding;
pub use mailbox::{DisplayIntent, Mailbox, OutgoingIntent};
pub use reducer::{reduce, reduce_batch, Effect, InFlight};
pub use types::{ControllerConfig, PresentOptions, SendOptions, SendOutcome, ViewModel};

// Re-export commonly used types from dependencies for convenience
pub use parley_core::{ConversationId, DraftMessage, Message, MessageId, PayloadCategory, Role};
