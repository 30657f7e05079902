//! Application state.
//!
//! The app owns the input line and one mounted [`SessionController`]. When
//! the controller navigates, the event loop calls [`App::mount`] and a fresh
//! controller takes over the new conversation.

use std::time::Duration;

use parley_core::{ConversationId, DraftMessage};
use parley_session::{
    Collaborators, ControllerConfig, FlashCardFlags, PresentOptions, SendOptions, SendOutcome,
    SessionController, ViewModel,
};

/// Redraw interval while a response is streaming.
pub const STREAMING_TICK: Duration = Duration::from_millis(80);

/// Redraw interval when idle.
pub const IDLE_TICK: Duration = Duration::from_millis(250);

/// Prefix for presenting a local assistant note instead of sending.
const SHOW_COMMAND: &str = "/show ";

/// Application state.
pub struct App {
    deps: Collaborators,
    config: ControllerConfig,
    controller: SessionController,
    flags: Option<FlashCardFlags>,
    /// Current input buffer.
    pub input: String,
    /// Cursor position in input, in characters.
    pub cursor_position: usize,
    /// Lines scrolled up from the bottom of the transcript.
    pub scroll_from_bottom: usize,
    /// Status message to display.
    pub status_message: Option<String>,
    /// Error message to display.
    pub error_message: Option<String>,
    /// Whether the app should quit.
    pub should_quit: bool,
    /// Animation frame counter for the streaming spinner.
    pub animation_frame: usize,
}

impl App {
    /// Create an app with an unmounted controller for `conversation`.
    #[must_use]
    pub fn new(
        deps: Collaborators,
        config: ControllerConfig,
        conversation: Option<ConversationId>,
        flags: Option<FlashCardFlags>,
    ) -> Self {
        let controller = SessionController::new(deps.clone(), config.clone(), conversation);
        Self {
            deps,
            config,
            controller,
            flags,
            input: String::new(),
            cursor_position: 0,
            scroll_from_bottom: 0,
            status_message: None,
            error_message: None,
            should_quit: false,
            animation_frame: 0,
        }
    }

    /// The mounted controller.
    pub fn controller(&mut self) -> &mut SessionController {
        &mut self.controller
    }

    /// Model name for display.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Snapshot of the mounted conversation for rendering.
    pub fn view(&mut self) -> ViewModel {
        self.controller.view()
    }

    /// Replace the controller with one for `conversation` and mount it.
    pub async fn mount(&mut self, conversation: Option<ConversationId>) {
        self.controller =
            SessionController::new(self.deps.clone(), self.config.clone(), conversation);
        self.scroll_from_bottom = 0;
        if let Err(e) = self.controller.on_mount().await {
            tracing::warn!(error = %e, "Mount failed");
            self.set_error(e.user_message());
            return;
        }
        match conversation {
            Some(id) => tracing::info!(conversation_id = %id, "Conversation mounted"),
            None => self.set_status("New conversation"),
        }
    }

    /// Start over with a blank conversation.
    pub async fn new_conversation(&mut self) {
        if self.controller.is_streaming() {
            self.set_status("Wait for the answer to finish first");
            return;
        }
        self.mount(None).await;
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Tick the animation frame (call on each render).
    pub fn tick_animation(&mut self) {
        self.animation_frame = self.animation_frame.wrapping_add(1);
    }

    /// Get current spinner character for the streaming indicator.
    #[must_use]
    pub fn spinner_char(&self) -> &'static str {
        const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
        SPINNER[self.animation_frame % SPINNER.len()]
    }

    /// Set the status message (also clears any error).
    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
        self.error_message = None;
    }

    /// Set the error message.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
    }

    /// Clear local and controller errors.
    pub fn clear_error(&mut self) {
        self.error_message = None;
        self.controller.clear_error();
    }

    // =========================================================================
    // Scrolling
    // =========================================================================

    /// Scroll the transcript up (older messages).
    pub fn scroll_up(&mut self, amount: usize) {
        self.scroll_from_bottom = self.scroll_from_bottom.saturating_add(amount);
        self.controller.user_scrolled(true);
    }

    /// Scroll the transcript down; reaching the bottom resumes following.
    pub fn scroll_down(&mut self, amount: usize) {
        self.scroll_from_bottom = self.scroll_from_bottom.saturating_sub(amount);
        self.controller.user_scrolled(self.scroll_from_bottom > 0);
    }

    // =========================================================================
    // Input Handling
    // =========================================================================

    fn byte_index(&self, chars: usize) -> usize {
        self.input
            .char_indices()
            .nth(chars)
            .map_or(self.input.len(), |(i, _)| i)
    }

    fn char_len(&self) -> usize {
        self.input.chars().count()
    }

    /// Insert a character at the cursor position.
    pub fn insert_char(&mut self, c: char) {
        let at = self.byte_index(self.cursor_position);
        self.input.insert(at, c);
        self.cursor_position += 1;
    }

    /// Delete the character before the cursor.
    pub fn delete_char(&mut self) {
        if self.cursor_position > 0 {
            self.cursor_position -= 1;
            let at = self.byte_index(self.cursor_position);
            self.input.remove(at);
        }
    }

    /// Delete the character at the cursor.
    pub fn delete_char_forward(&mut self) {
        if self.cursor_position < self.char_len() {
            let at = self.byte_index(self.cursor_position);
            self.input.remove(at);
        }
    }

    /// Delete back to the previous space.
    pub fn delete_word(&mut self) {
        while self.cursor_position > 0 {
            self.delete_char();
            let prev = self
                .cursor_position
                .checked_sub(1)
                .and_then(|i| self.input.chars().nth(i));
            if prev == Some(' ') {
                break;
            }
        }
    }

    /// Move cursor left.
    pub fn move_cursor_left(&mut self) {
        self.cursor_position = self.cursor_position.saturating_sub(1);
    }

    /// Move cursor right.
    pub fn move_cursor_right(&mut self) {
        if self.cursor_position < self.char_len() {
            self.cursor_position += 1;
        }
    }

    /// Move cursor to the start.
    pub fn move_cursor_start(&mut self) {
        self.cursor_position = 0;
    }

    /// Move cursor to the end.
    pub fn move_cursor_end(&mut self) {
        self.cursor_position = self.char_len();
    }

    /// Clear the input.
    pub fn clear_input(&mut self) {
        self.input.clear();
        self.cursor_position = 0;
    }

    /// Take the current input (clears it).
    pub fn take_input(&mut self) -> String {
        let input = std::mem::take(&mut self.input);
        self.cursor_position = 0;
        input
    }

    fn restore_input(&mut self, input: String) {
        self.cursor_position = input.chars().count();
        self.input = input;
    }

    // =========================================================================
    // Sending
    // =========================================================================

    /// Send the input line, or present it when it starts with `/show`.
    ///
    /// The input is kept when nothing was sent.
    pub async fn submit(&mut self) {
        if self.input.trim().is_empty() {
            return;
        }
        let content = self.take_input();

        let result = match content.strip_prefix(SHOW_COMMAND) {
            Some(note) => {
                let drafts = vec![DraftMessage::assistant(note.trim())];
                self.controller
                    .present(drafts, PresentOptions { pin_top: true })
                    .await
            }
            None => {
                let options = SendOptions {
                    flags: self.flags.clone(),
                    ..SendOptions::default()
                };
                self.controller.send(&content, options).await
            }
        };

        match result {
            Ok(SendOutcome::Navigating(id)) => {
                self.scroll_from_bottom = 0;
                self.set_status(format!("Opening conversation {id}"));
            }
            Ok(SendOutcome::Streaming) => {
                self.scroll_from_bottom = 0;
                self.set_status("Waiting for the assistant");
            }
            Ok(SendOutcome::Presented) => self.set_status("Note added"),
            Ok(SendOutcome::Rejected) => {
                self.restore_input(content);
                self.set_status("The assistant is still answering");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Send failed");
                self.restore_input(content);
                self.set_error(e.user_message());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parley_session::local::{ChannelNavigator, MemoryConversations, ScriptedAssistant};
    use parley_session::ScrollTarget;
    use parley_store::MemoryStore;

    use super::*;

    fn app() -> (App, tokio::sync::mpsc::UnboundedReceiver<ConversationId>, Arc<MemoryConversations>) {
        let history = Arc::new(MemoryConversations::new());
        let (navigator, nav_rx) = ChannelNavigator::channel();
        let deps = Collaborators {
            conversations: history.clone(),
            assistant: Arc::new(ScriptedAssistant::echo(Arc::clone(&history))),
            navigator: Arc::new(navigator),
            store: Arc::new(MemoryStore::new()),
        };
        (App::new(deps, ControllerConfig::default(), None, None), nav_rx, history)
    }

    fn type_str(app: &mut App, text: &str) {
        for c in text.chars() {
            app.insert_char(c);
        }
    }

    #[test]
    fn editing_handles_multibyte_input() {
        let (mut app, _rx, _) = app();
        type_str(&mut app, "prix €");
        app.move_cursor_left();
        app.insert_char('5');
        assert_eq!(app.input, "prix 5€");
        app.move_cursor_end();
        app.delete_char();
        assert_eq!(app.input, "prix 5");
        app.move_cursor_start();
        app.delete_char_forward();
        assert_eq!(app.input, "rix 5");
    }

    #[test]
    fn delete_word_stops_at_space() {
        let (mut app, _rx, _) = app();
        type_str(&mut app, "flats in lyon");
        app.delete_word();
        assert_eq!(app.input, "flats in ");
    }

    #[tokio::test]
    async fn blank_submit_does_nothing() {
        let (mut app, mut rx, history) = app();
        type_str(&mut app, "   ");
        app.submit().await;
        assert_eq!(app.input, "   ");
        assert_eq!(history.create_count(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn first_send_navigates_then_streams_after_mount() {
        let (mut app, mut rx, history) = app();
        type_str(&mut app, "Flats in Lyon?");
        app.submit().await;
        assert!(app.input.is_empty());

        let id = rx.recv().await.unwrap();
        app.mount(Some(id)).await;
        assert!(app.controller().is_streaming());

        tokio::time::timeout(Duration::from_secs(5), app.controller().settle())
            .await
            .unwrap();
        let view = app.view();
        assert_eq!(view.conversation, Some(id));
        assert_eq!(view.messages.len(), 2);
        assert_eq!(history.messages(&id).len(), 2);
    }

    #[tokio::test]
    async fn failed_create_keeps_input() {
        let (mut app, _rx, history) = app();
        history.fail_next_create("store down");
        type_str(&mut app, "hello");
        app.submit().await;
        assert_eq!(app.input, "hello");
        assert_eq!(app.cursor_position, 5);
        assert!(app.error_message.is_some());
    }

    #[tokio::test]
    async fn scrolling_up_holds_and_bottom_releases() {
        let (mut app, _rx, _) = app();
        app.scroll_up(3);
        assert_eq!(app.view().scroll, ScrollTarget::Hold);
        app.scroll_down(3);
        assert_eq!(app.view().scroll, ScrollTarget::FollowBottom);
    }
}
