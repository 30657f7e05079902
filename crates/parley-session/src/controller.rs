//! The session controller.
//!
//! One controller instance serves one mounted chat view. It owns the
//! committed history, the in-flight accumulator and at most one stream
//! session, and it is driven from a single task: the owner calls
//! [`SessionController::pump`] (or `wait` then `apply`) in its event loop and reads
//! [`SessionController::view`] to render.
//!
//! The stream body is read by a spawned task that forwards chunks over a
//! channel tagged with the session's token. Signals from a session that has
//! already ended are ignored.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parley_core::{ConversationId, DraftMessage, Message, MessageId};
use parley_store::DurableStore;
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};

use crate::activity::{ActivityMonitor, ScrollPolicy};
use crate::collab::{AssistantStream, ConversationStore, FlashCardFlags, Navigator, StreamRequest};
use crate::decoder::{Frame, FrameDecoder};
use crate::error::{Result, SessionError};
use crate::events::interpret;
use crate::lifecycle::{accepts_send, validate_transition, Binding};
use crate::mailbox::{DisplayIntent, Mailbox, OutgoingIntent};
use crate::reducer::{reduce_batch, Effect, InFlight};
use crate::types::{
    derive_title, ControllerConfig, PresentOptions, SendOptions, SendOutcome, ViewModel,
};

/// Everything a controller talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// Conversation store.
    pub conversations: Arc<dyn ConversationStore>,
    /// Assistant stream endpoint.
    pub assistant: Arc<dyn AssistantStream>,
    /// Navigation.
    pub navigator: Arc<dyn Navigator>,
    /// Durable area shared across navigations.
    pub store: Arc<dyn DurableStore>,
}

/// Identity of one stream session within a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionToken(u64);

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Message from a stream reader task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSignal {
    /// Session the signal belongs to.
    pub session: SessionToken,
    /// What happened.
    pub kind: SignalKind,
}

/// What woke a waiting controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wake {
    /// A reader task sent a signal.
    Signal(StreamSignal),
    /// The stall ticker fired.
    Tick,
    /// Nothing to do.
    Idle,
}

/// What a stream reader observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalKind {
    /// A chunk of body text.
    Chunk(String),
    /// The stream could not be opened or broke mid-flight.
    Failed(String),
    /// The body ended.
    Closed,
}

struct StreamSession {
    token: SessionToken,
    decoder: FrameDecoder,
    ticker: Interval,
}

/// Drives one chat view.
pub struct SessionController {
    deps: Collaborators,
    config: ControllerConfig,
    mailbox: Mailbox<Arc<dyn DurableStore>>,
    binding: Binding,
    conversation: Option<ConversationId>,
    messages: Vec<Message>,
    in_flight: InFlight,
    error: Option<String>,
    activity: ActivityMonitor,
    scroll: ScrollPolicy,
    stalled: bool,
    session: Option<StreamSession>,
    next_token: u64,
    signals_tx: mpsc::Sender<StreamSignal>,
    signals_rx: mpsc::Receiver<StreamSignal>,
}

impl SessionController {
    /// Create a controller for `conversation`, or for a blank view when `None`.
    ///
    /// Nothing is loaded until [`on_mount`](Self::on_mount).
    #[must_use]
    pub fn new(
        deps: Collaborators,
        config: ControllerConfig,
        conversation: Option<ConversationId>,
    ) -> Self {
        let mailbox =
            Mailbox::new(Arc::clone(&deps.store)).with_scroll_ceiling(config.scroll_suppression());
        let (signals_tx, signals_rx) = mpsc::channel(config.channel_capacity.max(1));
        Self {
            mailbox,
            binding: if conversation.is_some() {
                Binding::Bound
            } else {
                Binding::Unbound
            },
            conversation,
            messages: Vec::new(),
            in_flight: InFlight::default(),
            error: None,
            activity: ActivityMonitor::new(config.stall_threshold()),
            scroll: ScrollPolicy::new(config.pin_window()),
            stalled: false,
            session: None,
            next_token: 1,
            signals_tx,
            signals_rx,
            deps,
            config,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Current binding.
    #[must_use]
    pub const fn binding(&self) -> Binding {
        self.binding
    }

    /// Bound conversation.
    #[must_use]
    pub const fn conversation(&self) -> Option<ConversationId> {
        self.conversation
    }

    /// Committed turns.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// In-flight accumulator.
    #[must_use]
    pub const fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    /// Token of the active stream session.
    #[must_use]
    pub fn active_session(&self) -> Option<SessionToken> {
        self.session.as_ref().map(|s| s.token)
    }

    /// Returns true while a stream session is active.
    #[must_use]
    pub const fn is_streaming(&self) -> bool {
        self.session.is_some()
    }

    /// Returns true while the stall indicator should show.
    #[must_use]
    pub const fn is_stalled(&self) -> bool {
        self.stalled
    }

    /// Last error, if any.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Dismiss the last error.
    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// The user scrolled away from (or back to) the bottom.
    pub fn user_scrolled(&mut self, away: bool) {
        self.scroll.user_scrolled(away);
    }

    /// Snapshot for rendering.
    pub fn view(&mut self) -> ViewModel {
        ViewModel {
            conversation: self.conversation,
            messages: self.messages.clone(),
            in_flight_text: self.in_flight.text.clone(),
            in_flight_slots: self.in_flight.slots.clone(),
            status: self.in_flight.status.clone(),
            is_streaming: self.is_streaming(),
            stalled: self.stalled,
            error: self.error.clone(),
            scroll: self.scroll.target(),
        }
    }

    // =========================================================================
    // Mount
    // =========================================================================

    /// Consume pending intents, or load history when there are none.
    ///
    /// Intents are taken at most once per instance; mounting twice does not
    /// replay them.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable area or the history fetch fails.
    pub async fn on_mount(&mut self) -> Result<()> {
        let Some(id) = self.conversation else {
            return Ok(());
        };

        if self.mailbox.take_scroll_suppression(&id)? {
            tracing::debug!(conversation_id = %id, "Holding viewport for the first render");
            self.scroll.hold();
        }

        if let Some(intent) = self.mailbox.take_outgoing(&id)? {
            tracing::info!(conversation_id = %id, "Resuming outgoing message after navigation");
            return self.start_stream(intent.content, intent.flags, intent.pin_top);
        }

        if let Some(intent) = self.mailbox.take_display(&id)? {
            tracing::info!(
                conversation_id = %id,
                count = intent.messages.len(),
                "Presenting precomposed messages after navigation"
            );
            self.show_local(id, intent.messages, intent.pin_top);
            return Ok(());
        }

        if self.session.is_none() && self.messages.is_empty() {
            self.load_history(id).await?;
        }
        Ok(())
    }

    async fn load_history(&mut self, id: ConversationId) -> Result<()> {
        match self.deps.conversations.get_conversation(&id).await {
            Ok(snapshot) => {
                tracing::debug!(
                    conversation_id = %id,
                    messages = snapshot.messages.len(),
                    "Loaded history"
                );
                self.messages = snapshot.messages;
                Ok(())
            }
            Err(e) => {
                self.error = Some(e.user_message());
                Err(e)
            }
        }
    }

    // =========================================================================
    // Send / present
    // =========================================================================

    /// Send a user message.
    ///
    /// On a blank view this creates a conversation, leaves the message in the
    /// mailbox and navigates; the next mounted controller sends it. On a bound
    /// view it starts a stream session. A send while a session is active is
    /// rejected.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::EmptyContent` for blank input and the
    /// collaborator's error if creating the conversation fails. The caller
    /// keeps the input in that case.
    pub async fn send(&mut self, content: &str, options: SendOptions) -> Result<SendOutcome> {
        if content.trim().is_empty() {
            return Err(SessionError::EmptyContent);
        }

        if !accepts_send(self.binding) {
            tracing::debug!(binding = self.binding.as_str(), "Send rejected");
            return Ok(SendOutcome::Rejected);
        }

        if self.binding == Binding::Unbound {
            let title = derive_title(content, self.config.title_max_chars);
            let id = self.create_conversation(&title).await?;
            let intent =
                OutgoingIntent::new(id, content, options.flags).with_pin_top(options.pin_top);
            self.hand_off(id, |mailbox| mailbox.post_outgoing(&intent))?;
            return Ok(SendOutcome::Navigating(id));
        }

        self.start_stream(content.to_string(), options.flags, options.pin_top)?;
        Ok(SendOutcome::Streaming)
    }

    /// Show precomposed assistant content without streaming.
    ///
    /// On a blank view this creates a conversation and hands the content to
    /// the next mounted controller. On a bound view the turns are shown at
    /// once and persisted in the background.
    ///
    /// # Errors
    ///
    /// Returns an error if creating the conversation or posting the intent fails.
    pub async fn present(
        &mut self,
        drafts: Vec<DraftMessage>,
        options: PresentOptions,
    ) -> Result<SendOutcome> {
        if drafts.is_empty() {
            return Err(SessionError::EmptyContent);
        }

        match (self.binding, self.conversation) {
            (Binding::Unbound, _) => {
                let title = drafts
                    .iter()
                    .map(|d| derive_title(&d.content, self.config.title_max_chars))
                    .find(|t| !t.is_empty())
                    .unwrap_or_default();
                let id = self.create_conversation(&title).await?;
                let intent = DisplayIntent::new(id, drafts, options.pin_top);
                let pin_top = options.pin_top;
                self.hand_off(id, |mailbox| {
                    mailbox.post_display(&intent)?;
                    if pin_top {
                        mailbox.suppress_scroll(id)?;
                    }
                    Ok(())
                })?;
                Ok(SendOutcome::Navigating(id))
            }
            (Binding::Bound, Some(id)) => {
                self.show_local(id, drafts, options.pin_top);
                Ok(SendOutcome::Presented)
            }
            _ => Ok(SendOutcome::Rejected),
        }
    }

    async fn create_conversation(&mut self, title: &str) -> Result<ConversationId> {
        self.transition(Binding::Creating)?;
        match self
            .deps
            .conversations
            .create_conversation(title, &self.config.model)
            .await
        {
            Ok(id) => Ok(id),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to create conversation");
                self.error = Some(e.user_message());
                self.transition(Binding::Unbound)?;
                Err(e)
            }
        }
    }

    /// Post an intent for the conversation just created, then navigate to it.
    fn hand_off<F>(&mut self, id: ConversationId, post: F) -> Result<()>
    where
        F: FnOnce(&Mailbox<Arc<dyn DurableStore>>) -> Result<()>,
    {
        if let Err(e) = post(&self.mailbox) {
            tracing::warn!(conversation_id = %id, error = %e, "Failed to post intent");
            self.error = Some(e.user_message());
            self.transition(Binding::Unbound)?;
            return Err(e);
        }
        self.transition(Binding::Navigating)?;
        tracing::info!(conversation_id = %id, "Navigating to new conversation");
        self.deps.navigator.navigate(&id);
        Ok(())
    }

    /// Append turns locally with provisional identities and persist them.
    fn show_local(&mut self, id: ConversationId, drafts: Vec<DraftMessage>, pin_top: bool) {
        let first = self.next_message_id();
        for (offset, draft) in (0u64..).zip(drafts.iter().cloned()) {
            self.messages
                .push(Message::from_draft(MessageId::new(first.get() + offset), draft));
        }
        if pin_top {
            self.scroll.pin_top(first);
        }

        let conversations = Arc::clone(&self.deps.conversations);
        tokio::spawn(async move {
            if let Err(e) = conversations.append_messages(&id, &drafts).await {
                tracing::warn!(conversation_id = %id, error = %e, "Failed to persist messages");
            }
        });
    }

    fn next_message_id(&self) -> MessageId {
        self.messages
            .iter()
            .map(|m| m.id)
            .max()
            .map_or(MessageId::new(1), MessageId::next)
    }

    // =========================================================================
    // Stream sessions
    // =========================================================================

    fn start_stream(
        &mut self,
        content: String,
        flags: Option<FlashCardFlags>,
        pin_top: bool,
    ) -> Result<()> {
        let id = self.conversation.ok_or(SessionError::NotBound)?;
        self.transition(Binding::Streaming)?;

        self.error = None;
        self.in_flight.clear();
        self.scroll.release();
        let optimistic_id = self.next_message_id();
        self.messages
            .push(Message::from_draft(optimistic_id, DraftMessage::user(&content)));
        if pin_top {
            self.scroll.pin_top(optimistic_id);
        }

        let token = SessionToken(self.next_token);
        self.next_token += 1;

        let request = StreamRequest {
            content,
            flash_card_flags: flags,
        };
        tokio::spawn(read_stream(
            Arc::clone(&self.deps.assistant),
            id,
            request,
            token,
            self.signals_tx.clone(),
        ));

        let mut ticker = tokio::time::interval(self.config.stall_poll().max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.activity.touch();
        self.stalled = false;
        self.session = Some(StreamSession {
            token,
            decoder: FrameDecoder::new(),
            ticker,
        });
        tracing::debug!(conversation_id = %id, session = %token, "Stream session started");
        Ok(())
    }

    fn end_session(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::debug!(
                session = %session.token,
                frames = session.decoder.frames_emitted(),
                "Stream session ended"
            );
        }
        self.stalled = false;
        self.in_flight.status = None;
        if let Err(e) = self.transition(Binding::Bound) {
            tracing::warn!(error = %e, "Unexpected binding at end of session");
        }
    }

    /// Wait for the next stream signal or stall tick and apply it.
    ///
    /// Returns true if the view may have changed. With no active session this
    /// only returns when a (stale) signal arrives.
    ///
    /// Not cancel-safe once a signal is being applied; owners that race the
    /// controller against other events should use [`wait`](Self::wait) and
    /// [`apply`](Self::apply) instead.
    pub async fn pump(&mut self) -> bool {
        let wake = self.wait().await;
        self.apply(wake).await
    }

    /// Wait for the next stream signal or stall tick. Cancel-safe.
    pub async fn wait(&mut self) -> Wake {
        let signals = &mut self.signals_rx;
        let ticker = self.session.as_mut().map(|s| &mut s.ticker);
        tokio::select! {
            signal = signals.recv() => signal.map_or(Wake::Idle, Wake::Signal),
            () = next_tick(ticker) => Wake::Tick,
        }
    }

    /// Apply what [`wait`](Self::wait) returned.
    ///
    /// Returns true if the view may have changed.
    pub async fn apply(&mut self, wake: Wake) -> bool {
        match wake {
            Wake::Signal(signal) => self.handle_signal(signal).await,
            Wake::Tick => self.check_stall(),
            Wake::Idle => false,
        }
    }

    /// Pump until the active session ends.
    pub async fn settle(&mut self) {
        while self.session.is_some() {
            self.pump().await;
        }
    }

    /// Apply one signal. Signals from inactive sessions are ignored.
    ///
    /// Returns true if state changed.
    pub async fn handle_signal(&mut self, signal: StreamSignal) -> bool {
        let Some(session) = self
            .session
            .as_mut()
            .filter(|s| s.token == signal.session)
        else {
            tracing::debug!(session = %signal.session, "Ignoring signal from inactive session");
            return false;
        };

        match signal.kind {
            SignalKind::Chunk(text) => {
                let frames = session.decoder.push(&text);
                self.apply_frames(frames).await;
            }
            SignalKind::Closed => {
                let frames = session.decoder.finish();
                if !self.apply_frames(frames).await {
                    tracing::debug!("Stream closed without a terminal frame");
                    self.end_session();
                    self.reconcile().await;
                }
            }
            SignalKind::Failed(message) => {
                tracing::warn!(session = %signal.session, error = %message, "Stream failed");
                self.error = Some(message);
                self.end_session();
            }
        }
        true
    }

    /// Returns true if the session ended.
    async fn apply_frames(&mut self, frames: Vec<Frame>) -> bool {
        let effects = reduce_batch(&mut self.in_flight, frames.into_iter().filter_map(interpret));
        for effect in effects {
            match effect {
                Effect::None => {}
                Effect::Activity => {
                    self.activity.touch();
                    self.stalled = false;
                }
                Effect::Surface { message, code } => {
                    tracing::warn!(code = ?code, error = %message, "Assistant reported a recoverable error");
                    self.error = Some(message);
                }
                Effect::Fail { message, code } => {
                    tracing::warn!(code = ?code, error = %message, "Assistant reported an error");
                    self.error = Some(message);
                    self.end_session();
                    return true;
                }
                Effect::Reconcile => {
                    self.end_session();
                    self.reconcile().await;
                    return true;
                }
                Effect::Commit(draft) => {
                    self.end_session();
                    let id = self.next_message_id();
                    self.messages.push(Message::from_draft(id, draft));
                    self.in_flight.clear();
                    return true;
                }
            }
        }
        false
    }

    /// Replace history with the store's copy and clear the accumulator.
    async fn reconcile(&mut self) {
        if let Some(id) = self.conversation {
            match self.deps.conversations.get_conversation(&id).await {
                Ok(snapshot) => self.messages = snapshot.messages,
                Err(e) => {
                    tracing::warn!(conversation_id = %id, error = %e, "Reconciliation fetch failed");
                }
            }
        }
        self.in_flight.clear();
    }

    fn check_stall(&mut self) -> bool {
        let stalled = self.activity.is_stalled(self.session.is_some());
        let changed = stalled != self.stalled;
        self.stalled = stalled;
        changed
    }

    fn transition(&mut self, to: Binding) -> Result<()> {
        let from = self.binding;
        self.binding = validate_transition(from, to)?;
        tracing::trace!(from = from.as_str(), to = to.as_str(), "Binding changed");
        Ok(())
    }
}

async fn next_tick(ticker: Option<&mut Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Read a stream body and forward it as signals.
///
/// Runs until the body ends or the controller drops its receiver.
async fn read_stream(
    assistant: Arc<dyn AssistantStream>,
    id: ConversationId,
    request: StreamRequest,
    token: SessionToken,
    tx: mpsc::Sender<StreamSignal>,
) {
    let send = |kind| {
        let tx = tx.clone();
        async move {
            let delivered = tx.send(StreamSignal { session: token, kind }).await.is_ok();
            if !delivered {
                tracing::debug!(session = %token, "Controller gone, stopping stream reader");
            }
            delivered
        }
    };

    let mut chunks = match assistant.open(&id, request).await {
        Ok(chunks) => chunks,
        Err(e) => {
            tracing::warn!(conversation_id = %id, error = %e, "Failed to open stream");
            send(SignalKind::Failed(e.user_message())).await;
            return;
        }
    };

    while let Some(chunk) = chunks.next().await {
        let kind = match chunk {
            Ok(text) => SignalKind::Chunk(text),
            Err(e) => {
                tracing::warn!(conversation_id = %id, error = %e, "Stream broke");
                send(SignalKind::Failed(e.user_message())).await;
                return;
            }
        };
        if !send(kind).await {
            return;
        }
    }
    send(SignalKind::Closed).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::{ChannelNavigator, MemoryConversations, ScriptedAssistant};
    use parley_store::MemoryStore;

    fn controller(conversation: Option<ConversationId>) -> SessionController {
        let history = Arc::new(MemoryConversations::new());
        let (navigator, _rx) = ChannelNavigator::channel();
        let deps = Collaborators {
            conversations: history.clone(),
            assistant: Arc::new(ScriptedAssistant::new()),
            navigator: Arc::new(navigator),
            store: Arc::new(MemoryStore::new()),
        };
        SessionController::new(deps, ControllerConfig::default(), conversation)
    }

    #[test]
    fn binding_follows_construction() {
        assert_eq!(controller(None).binding(), Binding::Unbound);
        assert_eq!(
            controller(Some(ConversationId::generate())).binding(),
            Binding::Bound
        );
    }

    #[tokio::test]
    async fn blank_input_is_rejected_before_any_call() {
        let mut ctl = controller(None);
        let err = ctl.send("   \n", SendOptions::default()).await.unwrap_err();
        assert!(matches!(err, SessionError::EmptyContent));
        assert_eq!(ctl.binding(), Binding::Unbound);
    }

    #[tokio::test]
    async fn stale_signal_is_ignored() {
        let mut ctl = controller(Some(ConversationId::generate()));
        let changed = ctl
            .handle_signal(StreamSignal {
                session: SessionToken(42),
                kind: SignalKind::Failed("late".into()),
            })
            .await;
        assert!(!changed);
        assert!(ctl.error().is_none());
    }

    #[test]
    fn session_token_display() {
        assert_eq!(SessionToken(3).to_string(), "s3");
    }
}
