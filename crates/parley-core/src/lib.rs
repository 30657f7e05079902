//! Core types for parley.
//!
//! This crate provides the foundational types shared by the parley crates:
//!
//! - **Identifiers**: `ConversationId` and the ordinal `MessageId`
//! - **Messages**: committed turns, drafts, and structured side-payloads
//! - **Error types**: common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use parley_core::{ConversationId, DraftMessage, Message, MessageId, Role};
//!
//! let conversation = ConversationId::generate();
//! let parsed: ConversationId = conversation.to_string().parse().unwrap();
//! assert_eq!(conversation, parsed);
//!
//! let message = Message::from_draft(MessageId::new(1), DraftMessage::user("hello"));
//! assert_eq!(message.role, Role::User);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod message;

pub use error::{CoreError, Result};
pub use ids::{ConversationId, IdError, MessageId};
pub use message::{is_falsy, DraftMessage, Message, PayloadCategory, Placement, Role, SidePayload};
