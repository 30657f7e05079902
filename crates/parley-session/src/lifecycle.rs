//! Conversation binding state machine.
//!
//! A controller instance is either bound to a conversation or not; binding
//! changes only through navigation, which tears the instance down and mounts
//! a new one. Within one instance the binding moves as follows:
//!
//! ```text
//!     ┌──────────┐  send   ┌──────────┐ created ┌────────────┐
//!     │ Unbound  │────────▶│ Creating │────────▶│ Navigating │
//!     └──────────┘         └────┬─────┘         └────────────┘
//!           ▲                   │ (create failed)
//!           └───────────────────┘
//!
//!     ┌──────────┐  send   ┌───────────┐
//!     │  Bound   │────────▶│ Streaming │
//!     └──────────┘         └─────┬─────┘
//!           ▲                    │ (terminal / error / end of stream)
//!           └────────────────────┘
//! ```
//!
//! `Navigating` is final: the instance waits to be replaced.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};

/// Where a controller instance stands with respect to its conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Binding {
    /// No conversation yet; the first send creates one.
    Unbound,
    /// A create-conversation call is in flight.
    Creating,
    /// Navigation to the new conversation was requested.
    Navigating,
    /// Bound to a conversation and idle.
    Bound,
    /// A stream session is active.
    Streaming,
}

impl Binding {
    /// Get the binding as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unbound => "unbound",
            Self::Creating => "creating",
            Self::Navigating => "navigating",
            Self::Bound => "bound",
            Self::Streaming => "streaming",
        }
    }
}

/// Validates a binding transition and returns the target if valid.
///
/// # Errors
///
/// Returns `SessionError::InvalidTransition` if the transition is not allowed.
pub fn validate_transition(from: Binding, to: Binding) -> Result<Binding> {
    if is_valid_transition(from, to) {
        Ok(to)
    } else {
        Err(SessionError::InvalidTransition { from, to })
    }
}

/// Check if a binding transition is valid.
#[must_use]
pub const fn is_valid_transition(from: Binding, to: Binding) -> bool {
    use Binding::{Bound, Creating, Navigating, Streaming, Unbound};

    matches!(
        (from, to),
        (Unbound, Creating)
            // create failed: stay on the blank conversation
            | (Creating, Navigating | Unbound)
            | (Bound, Streaming)
            | (Streaming, Bound)
    )
}

/// Returns true if a send is accepted in this binding.
#[must_use]
pub const fn accepts_send(binding: Binding) -> bool {
    matches!(binding, Binding::Unbound | Binding::Bound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        assert!(is_valid_transition(Binding::Unbound, Binding::Creating));
        assert!(is_valid_transition(Binding::Creating, Binding::Navigating));
        assert!(is_valid_transition(Binding::Creating, Binding::Unbound));
        assert!(is_valid_transition(Binding::Bound, Binding::Streaming));
        assert!(is_valid_transition(Binding::Streaming, Binding::Bound));
    }

    #[test]
    fn invalid_transitions() {
        assert!(!is_valid_transition(Binding::Unbound, Binding::Streaming));
        assert!(!is_valid_transition(Binding::Streaming, Binding::Streaming));
        assert!(!is_valid_transition(Binding::Navigating, Binding::Bound));
        assert!(!is_valid_transition(Binding::Bound, Binding::Unbound));
    }

    #[test]
    fn validate_reports_both_ends() {
        let err = validate_transition(Binding::Navigating, Binding::Creating).unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidTransition {
                from: Binding::Navigating,
                to: Binding::Creating
            }
        ));
    }

    #[test]
    fn sends_accepted_only_when_idle() {
        assert!(accepts_send(Binding::Unbound));
        assert!(accepts_send(Binding::Bound));
        assert!(!accepts_send(Binding::Creating));
        assert!(!accepts_send(Binding::Streaming));
        assert!(!accepts_send(Binding::Navigating));
    }
}
