//! In-process collaborators.
//!
//! Used by the terminal client's offline mode and by tests. They keep call
//! counters so tests can assert exactly which calls a flow made.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use parley_core::{ConversationId, DraftMessage, Message, MessageId};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::collab::{
    AssistantStream, ChunkStream, ConversationSnapshot, ConversationStore, ConversationSummary,
    Navigator, StreamRequest,
};
use crate::error::{Result, SessionError};

/// Format one blank-line-delimited stream block.
#[must_use]
pub fn sse_block(frame: &Value) -> String {
    format!("data: {frame}\n\n")
}

// =============================================================================
// Conversation store
// =============================================================================

#[derive(Debug)]
struct Conversation {
    summary: ConversationSummary,
    messages: Vec<Message>,
}

#[derive(Debug, Default)]
struct StoreState {
    conversations: HashMap<ConversationId, Conversation>,
    creates: usize,
    fetches: usize,
    appends: usize,
    fail_next_create: Option<String>,
    fail_fetches: bool,
}

/// Conversation store held in memory.
#[derive(Debug, Default)]
pub struct MemoryConversations {
    state: Mutex<StoreState>,
}

impl MemoryConversations {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a conversation without counting it as a create call.
    pub fn seed(&self, title: &str) -> ConversationId {
        let id = ConversationId::generate();
        self.state.lock().conversations.insert(
            id,
            Conversation {
                summary: ConversationSummary {
                    id,
                    title: title.to_string(),
                    model: None,
                },
                messages: Vec::new(),
            },
        );
        id
    }

    /// Append turns directly, assigning identities. Not counted.
    pub fn commit(&self, id: &ConversationId, drafts: &[DraftMessage]) {
        if let Some(conversation) = self.state.lock().conversations.get_mut(id) {
            append(&mut conversation.messages, drafts);
        }
    }

    /// Committed turns of a conversation.
    #[must_use]
    pub fn messages(&self, id: &ConversationId) -> Vec<Message> {
        self.state
            .lock()
            .conversations
            .get(id)
            .map(|c| c.messages.clone())
            .unwrap_or_default()
    }

    /// Make the next create call fail with `message`.
    pub fn fail_next_create(&self, message: impl Into<String>) {
        self.state.lock().fail_next_create = Some(message.into());
    }

    /// Make history fetches fail.
    pub fn fail_fetches(&self, fail: bool) {
        self.state.lock().fail_fetches = fail;
    }

    /// Number of `create_conversation` calls.
    #[must_use]
    pub fn create_count(&self) -> usize {
        self.state.lock().creates
    }

    /// Number of `get_conversation` calls.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.state.lock().fetches
    }

    /// Number of `append_messages` calls.
    #[must_use]
    pub fn append_count(&self) -> usize {
        self.state.lock().appends
    }
}

fn append(messages: &mut Vec<Message>, drafts: &[DraftMessage]) {
    let mut next = messages
        .iter()
        .map(|m| m.id)
        .max()
        .map_or(MessageId::new(1), MessageId::next);
    for draft in drafts {
        messages.push(Message::from_draft(next, draft.clone()));
        next = next.next();
    }
}

#[async_trait]
impl ConversationStore for MemoryConversations {
    async fn create_conversation(&self, title: &str, model: &str) -> Result<ConversationId> {
        let mut state = self.state.lock();
        state.creates += 1;
        if let Some(message) = state.fail_next_create.take() {
            return Err(SessionError::Api {
                status: 503,
                message,
            });
        }
        let id = ConversationId::generate();
        state.conversations.insert(
            id,
            Conversation {
                summary: ConversationSummary {
                    id,
                    title: title.to_string(),
                    model: Some(model.to_string()),
                },
                messages: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn get_conversation(&self, id: &ConversationId) -> Result<ConversationSnapshot> {
        let mut state = self.state.lock();
        state.fetches += 1;
        if state.fail_fetches {
            return Err(SessionError::Transport("history unavailable".to_string()));
        }
        state
            .conversations
            .get(id)
            .map(|c| ConversationSnapshot {
                conversation: c.summary.clone(),
                messages: c.messages.clone(),
            })
            .ok_or_else(|| SessionError::Api {
                status: 404,
                message: format!("conversation {id} not found"),
            })
    }

    async fn append_messages(&self, id: &ConversationId, messages: &[DraftMessage]) -> Result<()> {
        let mut state = self.state.lock();
        state.appends += 1;
        let conversation = state
            .conversations
            .get_mut(id)
            .ok_or(SessionError::NotBound)?;
        append(&mut conversation.messages, messages);
        Ok(())
    }
}

// =============================================================================
// Assistant stream
// =============================================================================

/// One scripted response.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Deliver these chunks, then end the stream.
    Chunks(Vec<String>),
    /// Deliver these chunks, then end the stream; the answer text is committed
    /// to history alongside the user turn.
    Answer(Vec<String>, String),
    /// Deliver these chunks, then keep the stream open forever.
    Hang(Vec<String>),
    /// Deliver these chunks, then fail with a transport error.
    FailAfter(Vec<String>, String),
    /// Refuse to open.
    FailOpen(String),
}

/// Assistant stream that plays back scripted replies.
///
/// When the script runs out and echo is enabled, it answers with a short
/// blank-line-delimited stream repeating the user's text.
#[derive(Debug, Default)]
pub struct ScriptedAssistant {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<(ConversationId, StreamRequest)>>,
    echo: bool,
    history: Option<Arc<MemoryConversations>>,
}

impl ScriptedAssistant {
    /// Create an assistant with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an assistant that echoes and commits turns into `history`.
    #[must_use]
    pub fn echo(history: Arc<MemoryConversations>) -> Self {
        Self {
            echo: true,
            history: Some(history),
            ..Self::default()
        }
    }

    /// Commit user turns (and answers) into `history`, like a backend would.
    #[must_use]
    pub fn with_history(mut self, history: Arc<MemoryConversations>) -> Self {
        self.history = Some(history);
        self
    }

    /// Queue a reply.
    pub fn push(&self, reply: Reply) {
        self.replies.lock().push_back(reply);
    }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<(ConversationId, StreamRequest)> {
        self.requests.lock().clone()
    }

    /// Number of `open` calls.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn echo_reply(content: &str) -> (Vec<String>, String) {
        let answer = format!("You said: {content}");
        let mut chunks = vec![sse_block(&json!({"type": "status", "status": "Thinking"}))];
        chunks.extend(
            answer
                .split_inclusive(' ')
                .map(|word| sse_block(&json!({"type": "text_delta", "delta": word}))),
        );
        chunks.push(sse_block(&json!({"type": "done"})));
        (chunks, answer)
    }
}

#[async_trait]
impl AssistantStream for ScriptedAssistant {
    async fn open(&self, id: &ConversationId, request: StreamRequest) -> Result<ChunkStream> {
        self.requests.lock().push((*id, request.clone()));

        let reply = self.replies.lock().pop_front();
        let mut committed = vec![DraftMessage::user(&request.content)];
        let chunks = match reply {
            Some(Reply::FailOpen(message)) => return Err(SessionError::Transport(message)),
            Some(Reply::Chunks(chunks)) => playback(chunks).boxed(),
            Some(Reply::Answer(chunks, answer)) => {
                committed.push(DraftMessage::assistant(answer));
                playback(chunks).boxed()
            }
            Some(Reply::Hang(chunks)) => playback(chunks)
                .chain(stream::pending::<Result<String>>())
                .boxed(),
            Some(Reply::FailAfter(chunks, message)) => playback(chunks)
                .chain(stream::once(async move {
                    Err(SessionError::Transport(message))
                }))
                .boxed(),
            None if self.echo => {
                let (chunks, answer) = Self::echo_reply(&request.content);
                committed.push(DraftMessage::assistant(answer));
                playback(chunks).boxed()
            }
            None => {
                return Err(SessionError::Internal(
                    "no scripted reply left".to_string(),
                ))
            }
        };

        if let Some(history) = &self.history {
            history.commit(id, &committed);
        }
        Ok(chunks)
    }
}

fn playback(chunks: Vec<String>) -> impl futures::Stream<Item = Result<String>> + Send {
    stream::iter(chunks.into_iter().map(Ok))
}

// =============================================================================
// Navigation
// =============================================================================

/// Navigator that reports targets over a channel.
#[derive(Debug, Clone)]
pub struct ChannelNavigator {
    tx: mpsc::UnboundedSender<ConversationId>,
}

impl ChannelNavigator {
    /// Create a navigator and the receiver the owner listens on.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ConversationId>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Navigator for ChannelNavigator {
    fn navigate(&self, id: &ConversationId) {
        if self.tx.send(*id).is_err() {
            tracing::debug!(conversation_id = %id, "Navigation receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn create_then_fetch() {
        let store = MemoryConversations::new();
        let id = store.create_conversation("Flats", "default").await.unwrap();
        let snapshot = store.get_conversation(&id).await.unwrap();
        assert_eq!(snapshot.conversation.title, "Flats");
        assert_eq!(store.create_count(), 1);
        assert_eq!(store.fetch_count(), 1);
    }

    #[tokio::test]
    async fn appended_messages_get_increasing_ids() {
        let store = MemoryConversations::new();
        let id = store.seed("t");
        store
            .append_messages(&id, &[DraftMessage::user("a"), DraftMessage::assistant("b")])
            .await
            .unwrap();
        store.commit(&id, &[DraftMessage::user("c")]);
        let ids: Vec<u64> = store.messages(&id).iter().map(|m| m.id.get()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn failed_create_is_counted() {
        let store = MemoryConversations::new();
        store.fail_next_create("down");
        assert!(store.create_conversation("t", "m").await.is_err());
        assert!(store.create_conversation("t", "m").await.is_ok());
        assert_eq!(store.create_count(), 2);
    }

    #[tokio::test]
    async fn echo_commits_both_turns() {
        let history = Arc::new(MemoryConversations::new());
        let id = history.seed("t");
        let assistant = ScriptedAssistant::echo(Arc::clone(&history));

        let chunks: Vec<String> = assistant
            .open(&id, StreamRequest::new("hi there"))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert!(chunks.last().unwrap().contains("done"));
        let messages = history.messages(&id);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "You said: hi there");
    }

    #[tokio::test]
    async fn scripted_failure_after_chunks() {
        let assistant = ScriptedAssistant::new();
        assistant.push(Reply::FailAfter(vec!["x".into()], "reset".into()));
        let items: Vec<Result<String>> = assistant
            .open(&ConversationId::generate(), StreamRequest::new("q"))
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], Err(SessionError::Transport(_))));
    }

    #[test]
    fn navigator_reports_target() {
        let (navigator, mut rx) = ChannelNavigator::channel();
        let id = ConversationId::generate();
        navigator.navigate(&id);
        assert_eq!(rx.try_recv().unwrap(), id);
    }
}
