//! Stall indicator and scroll target policy.
//!
//! Both are time-based and read `tokio::time::Instant`, so tests drive them
//! with a paused clock.

use std::time::Duration;

use parley_core::MessageId;
use tokio::time::Instant;

/// Default quiet period before a streaming session counts as stalled.
pub const DEFAULT_STALL_THRESHOLD: Duration = Duration::from_millis(600);

/// Default lifetime of a pin-to-top directive.
pub const DEFAULT_PIN_WINDOW: Duration = Duration::from_millis(1500);

/// Tracks the last sign of life from the active stream.
#[derive(Debug, Clone)]
pub struct ActivityMonitor {
    last: Instant,
    threshold: Duration,
}

impl ActivityMonitor {
    /// Create a monitor that counts from now.
    #[must_use]
    pub fn new(threshold: Duration) -> Self {
        Self {
            last: Instant::now(),
            threshold,
        }
    }

    /// Record activity.
    pub fn touch(&mut self) {
        self.last = Instant::now();
    }

    /// Time since the last activity.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last.elapsed()
    }

    /// Returns true if `streaming` and the stream has been quiet past the threshold.
    #[must_use]
    pub fn is_stalled(&self, streaming: bool) -> bool {
        streaming && self.idle_for() > self.threshold
    }
}

impl Default for ActivityMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_STALL_THRESHOLD)
    }
}

/// Where the viewport should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollTarget {
    /// Keep the newest content visible.
    FollowBottom,
    /// Leave the viewport where it is.
    Hold,
    /// Bring this message to the top.
    PinTop(MessageId),
}

/// Decides the scroll target from user input and controller directives.
#[derive(Debug, Clone)]
pub struct ScrollPolicy {
    pin: Option<(MessageId, Instant)>,
    pin_window: Duration,
    user_away: bool,
    held_since: Option<Instant>,
}

impl ScrollPolicy {
    /// Create a policy that follows the bottom.
    #[must_use]
    pub const fn new(pin_window: Duration) -> Self {
        Self {
            pin: None,
            pin_window,
            user_away: false,
            held_since: None,
        }
    }

    /// Pin `id` to the top for the retry window.
    pub fn pin_top(&mut self, id: MessageId) {
        self.pin = Some((id, Instant::now()));
    }

    /// The user scrolled away from (or back to) the bottom.
    pub fn user_scrolled(&mut self, away: bool) {
        self.user_away = away;
    }

    /// Hold the viewport for the pin window, or until released.
    pub fn hold(&mut self) {
        self.held_since = Some(Instant::now());
    }

    /// Drop holds and user scroll state; used when the user sends.
    pub fn release(&mut self) {
        self.held_since = None;
        self.user_away = false;
    }

    /// Current target. Expired pins and holds are forgotten.
    pub fn target(&mut self) -> ScrollTarget {
        if let Some((id, at)) = self.pin {
            if at.elapsed() < self.pin_window {
                return ScrollTarget::PinTop(id);
            }
            self.pin = None;
        }
        if self
            .held_since
            .is_some_and(|at| at.elapsed() >= self.pin_window)
        {
            self.held_since = None;
        }
        if self.user_away || self.held_since.is_some() {
            ScrollTarget::Hold
        } else {
            ScrollTarget::FollowBottom
        }
    }
}

impl Default for ScrollPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_PIN_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn stall_needs_streaming_and_quiet() {
        let mut monitor = ActivityMonitor::default();
        assert!(!monitor.is_stalled(true));

        tokio::time::advance(Duration::from_millis(700)).await;
        assert!(monitor.is_stalled(true));
        assert!(!monitor.is_stalled(false));

        monitor.touch();
        assert!(!monitor.is_stalled(true));
    }

    #[tokio::test(start_paused = true)]
    async fn pin_overrides_follow_then_reverts() {
        let mut policy = ScrollPolicy::default();
        assert_eq!(policy.target(), ScrollTarget::FollowBottom);

        policy.pin_top(MessageId::new(4));
        tokio::time::advance(Duration::from_millis(1000)).await;
        assert_eq!(policy.target(), ScrollTarget::PinTop(MessageId::new(4)));

        tokio::time::advance(Duration::from_millis(600)).await;
        assert_eq!(policy.target(), ScrollTarget::FollowBottom);
    }

    #[test]
    fn scrolling_away_holds_until_release() {
        let mut policy = ScrollPolicy::default();
        policy.user_scrolled(true);
        assert_eq!(policy.target(), ScrollTarget::Hold);
        policy.release();
        assert_eq!(policy.target(), ScrollTarget::FollowBottom);

        policy.hold();
        assert_eq!(policy.target(), ScrollTarget::Hold);
        policy.release();
        assert_eq!(policy.target(), ScrollTarget::FollowBottom);
    }

    #[tokio::test(start_paused = true)]
    async fn hold_lapses_after_the_pin_window() {
        let mut policy = ScrollPolicy::default();
        policy.hold();
        tokio::time::advance(Duration::from_millis(1000)).await;
        assert_eq!(policy.target(), ScrollTarget::Hold);

        tokio::time::advance(Duration::from_millis(600)).await;
        assert_eq!(policy.target(), ScrollTarget::FollowBottom);

        // the user's own scroll position is not time-boxed
        policy.user_scrolled(true);
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(policy.target(), ScrollTarget::Hold);
    }
}
