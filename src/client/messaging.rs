use std::sync::{Arc, RwLock};

use chrono::Utc;
use tokio::sync::{broadcast, broadcast::error::RecvError};
use uuid::Uuid;

use crate::client::{read, write, Backend};
use crate::dto::message_dto::SendMessagePayload;
use crate::error::{Error, Result};
use crate::models::conversation::ConversationSummary;
use crate::models::message::Message;
use crate::realtime::{ChangeEvent, ChangeKind, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Shown optimistically, not yet acknowledged by the server.
    PendingLocal,
    Confirmed,
    FailedRolledBack,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThreadEntry {
    pub correlation_id: Uuid,
    pub state: EntryState,
    pub message: Message,
}

/// Messages of one conversation plus its compose box.
///
/// Sends go through three steps keyed by a client correlation id:
/// [`Thread::begin_send`], then [`Thread::confirm_send`] or
/// [`Thread::fail_send`]. Server messages are deduplicated by id, so a
/// realtime copy that overtakes the send response is not shown twice.
#[derive(Debug, Clone, PartialEq)]
pub struct Thread {
    pub conversation_id: Uuid,
    pub entries: Vec<ThreadEntry>,
    pub compose: String,
}

impl Thread {
    pub fn new(conversation_id: Uuid, messages: Vec<Message>) -> Self {
        let entries = messages
            .into_iter()
            .map(|message| ThreadEntry {
                correlation_id: message.id,
                state: EntryState::Confirmed,
                message,
            })
            .collect();
        Self {
            conversation_id,
            entries,
            compose: String::new(),
        }
    }

    fn position_of(&self, message_id: Uuid) -> Option<usize> {
        self.entries.iter().position(|e| {
            e.state == EntryState::Confirmed && e.message.id == message_id
        })
    }

    /// Appends a local entry and clears the compose box.
    pub fn begin_send(&mut self, sender_id: Uuid, receiver_id: Uuid, text: &str) -> Uuid {
        let correlation_id = Uuid::new_v4();
        self.entries.push(ThreadEntry {
            correlation_id,
            state: EntryState::PendingLocal,
            message: Message {
                id: correlation_id,
                conversation_id: self.conversation_id,
                sender_id,
                receiver_id,
                message_text: Some(text.to_string()),
                attachment_url: None,
                attachment_type: None,
                job_id: None,
                is_read: false,
                created_at: Utc::now(),
            },
        });
        self.compose.clear();
        correlation_id
    }

    /// Swaps the local entry for the server's message.
    pub fn confirm_send(&mut self, correlation_id: Uuid, message: Message) {
        let Some(index) = self
            .entries
            .iter()
            .position(|e| e.correlation_id == correlation_id)
        else {
            return;
        };
        if let Some(existing) = self.position_of(message.id) {
            // Realtime delivered it first.
            self.entries.remove(existing);
            let index = if existing < index { index - 1 } else { index };
            self.entries[index] = Self::confirmed(correlation_id, message);
        } else {
            self.entries[index] = Self::confirmed(correlation_id, message);
        }
    }

    fn confirmed(correlation_id: Uuid, message: Message) -> ThreadEntry {
        ThreadEntry {
            correlation_id,
            state: EntryState::Confirmed,
            message,
        }
    }

    /// Drops the local entry and puts its text back in the compose box.
    pub fn fail_send(&mut self, correlation_id: Uuid) -> Option<ThreadEntry> {
        let index = self
            .entries
            .iter()
            .position(|e| e.correlation_id == correlation_id)?;
        let mut entry = self.entries.remove(index);
        entry.state = EntryState::FailedRolledBack;
        self.compose = entry.message.message_text.clone().unwrap_or_default();
        Some(entry)
    }

    /// Adds a server message unless one with the same id is already shown.
    pub fn merge(&mut self, message: Message) -> bool {
        if self.position_of(message.id).is_some() {
            return false;
        }
        self.entries.push(Self::confirmed(message.id, message));
        true
    }

    /// Replaces a shown message by id (read receipts and edits).
    pub fn patch(&mut self, message: Message) -> bool {
        match self.position_of(message.id) {
            Some(index) => {
                self.entries[index].message = message;
                true
            }
            None => false,
        }
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter().map(|e| &e.message)
    }
}

#[derive(Debug, Default)]
struct Inner {
    conversations: Vec<ConversationSummary>,
    open: Option<Thread>,
}

/// Conversation list and the open thread for the signed-in profile.
#[derive(Clone)]
pub struct MessagingStore {
    backend: Arc<dyn Backend>,
    me: Uuid,
    inner: Arc<RwLock<Inner>>,
}

impl MessagingStore {
    pub fn new(backend: Arc<dyn Backend>, me: Uuid) -> Self {
        Self {
            backend,
            me,
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    pub async fn refresh_conversations(&self) {
        match self.backend.list_conversations().await {
            Ok(conversations) => write(&self.inner).conversations = conversations,
            Err(e) => tracing::error!(error = %e, "failed to load conversations"),
        }
    }

    pub fn conversations(&self) -> Vec<ConversationSummary> {
        read(&self.inner).conversations.clone()
    }

    pub fn open_thread(&self) -> Option<Thread> {
        read(&self.inner).open.clone()
    }

    pub fn set_compose(&self, text: &str) {
        if let Some(thread) = write(&self.inner).open.as_mut() {
            thread.compose = text.to_string();
        }
    }

    /// Case-insensitive match on the counterpart's name or company.
    pub fn search(&self, term: &str) -> Vec<ConversationSummary> {
        let term = term.trim().to_lowercase();
        read(&self.inner)
            .conversations
            .iter()
            .filter(|c| {
                if term.is_empty() {
                    return true;
                }
                let profile = &c.participant_profile;
                profile.full_name.to_lowercase().contains(&term)
                    || profile
                        .company_name
                        .as_deref()
                        .is_some_and(|company| company.to_lowercase().contains(&term))
            })
            .cloned()
            .collect()
    }

    /// Loads the thread, marks it read, and zeroes its unread badge.
    pub async fn open_conversation(&self, conversation_id: Uuid) -> Result<()> {
        let messages = self.backend.messages(conversation_id).await?;
        write(&self.inner).open = Some(Thread::new(conversation_id, messages));
        self.mark_open_read(conversation_id).await;
        Ok(())
    }

    async fn mark_open_read(&self, conversation_id: Uuid) {
        if let Err(e) = self.backend.mark_read(conversation_id).await {
            tracing::warn!(error = %e, conversation_id = %conversation_id, "failed to mark messages read");
            return;
        }
        let mut inner = write(&self.inner);
        if let Some(summary) = inner
            .conversations
            .iter_mut()
            .find(|c| c.conversation.id == conversation_id)
        {
            summary.unread_count = 0;
        }
    }

    pub async fn start_conversation(&self, participant_id: Uuid) -> Result<Uuid> {
        let conversation = self.backend.start_conversation(participant_id).await?;
        self.open_conversation(conversation.id).await?;
        self.refresh_conversations().await;
        Ok(conversation.id)
    }

    /// Optimistic send into the open thread. The message is tagged with
    /// `job_id`, or with the conversation's job when none is given.
    pub async fn send(&self, text: &str, job_id: Option<Uuid>) -> Result<Message> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::BadRequest("Message cannot be empty".into()));
        }
        let (conversation_id, correlation_id, job_id) = {
            let mut inner = write(&self.inner);
            let conversation = inner.open.as_ref().and_then(|thread| {
                inner
                    .conversations
                    .iter()
                    .find(|c| c.conversation.id == thread.conversation_id)
                    .map(|c| (c.conversation.counterpart(self.me), c.conversation.job_id))
            });
            let Some(thread) = inner.open.as_mut() else {
                return Err(Error::BadRequest("No conversation is open".into()));
            };
            let (receiver, conversation_job) = conversation.unwrap_or((Uuid::nil(), None));
            let job_id = job_id.or(conversation_job);
            let correlation_id = thread.begin_send(self.me, receiver, text);
            if let Some(entry) = thread.entries.last_mut() {
                entry.message.job_id = job_id;
            }
            (thread.conversation_id, correlation_id, job_id)
        };

        let payload = SendMessagePayload {
            message_text: text.to_string(),
            job_id,
        };
        let result = self.backend.send_message(conversation_id, &payload).await;

        let mut inner = write(&self.inner);
        let thread = inner
            .open
            .as_mut()
            .filter(|thread| thread.conversation_id == conversation_id);
        match result {
            Ok(message) => {
                if let Some(thread) = thread {
                    thread.confirm_send(correlation_id, message.clone());
                }
                Ok(message)
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to send message");
                if let Some(thread) = thread {
                    thread.fail_send(correlation_id);
                }
                Err(e)
            }
        }
    }

    pub async fn handle_event(&self, event: &ChangeEvent) {
        match (event.table, event.kind) {
            (Table::Messages, ChangeKind::Resync) => self.resync().await,
            (Table::Messages, ChangeKind::Insert) => {
                let Ok(message) = serde_json::from_value::<Message>(event.new.clone()) else {
                    tracing::warn!("unreadable message event");
                    return;
                };
                if message.sender_id == self.me || message.receiver_id != self.me {
                    return;
                }
                self.receive(message).await;
            }
            (Table::Messages, ChangeKind::Update) => {
                if let Ok(message) = serde_json::from_value::<Message>(event.new.clone()) {
                    if let Some(thread) = write(&self.inner).open.as_mut() {
                        thread.patch(message);
                    }
                }
                self.refresh_conversations().await;
            }
            (Table::Conversations, ChangeKind::Update)
                if event.mentions(self.me, &["participant_1", "participant_2"]) =>
            {
                self.refresh_conversations().await;
            }
            _ => {}
        }
    }

    async fn receive(&self, message: Message) {
        let conversation_id = message.conversation_id;
        let (in_open_thread, known) = {
            let mut inner = write(&self.inner);
            let in_open_thread = match inner.open.as_mut() {
                Some(thread) if thread.conversation_id == conversation_id => {
                    thread.merge(message.clone());
                    true
                }
                _ => false,
            };
            let summary = inner
                .conversations
                .iter_mut()
                .find(|c| c.conversation.id == conversation_id);
            let known = summary.is_some();
            if let Some(summary) = summary {
                if !in_open_thread {
                    summary.unread_count += 1;
                }
                summary.last_message = message.message_text.clone();
                summary.conversation.last_message_at = Some(message.created_at);
            }
            (in_open_thread, known)
        };

        if in_open_thread {
            self.mark_open_read(conversation_id).await;
        }
        if !known {
            self.refresh_conversations().await;
        }
    }

    /// Reloads the conversation list and merges the open thread's messages
    /// from the server. Pending local sends are kept.
    pub async fn resync(&self) {
        self.refresh_conversations().await;
        let Some(conversation_id) = read(&self.inner).open.as_ref().map(|t| t.conversation_id)
        else {
            return;
        };
        match self.backend.messages(conversation_id).await {
            Ok(messages) => {
                if let Some(thread) = write(&self.inner)
                    .open
                    .as_mut()
                    .filter(|thread| thread.conversation_id == conversation_id)
                {
                    for message in messages {
                        if !thread.patch(message.clone()) {
                            thread.merge(message);
                        }
                    }
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to reload open thread"),
        }
    }

    /// Consumes the change feed until it closes. A lagged feed resyncs.
    pub async fn run(self, mut rx: broadcast::Receiver<ChangeEvent>) {
        loop {
            match rx.recv().await {
                Ok(event) => self.handle_event(&event).await,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "message feed lagged, resyncing");
                    self.resync().await;
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_message(conversation_id: Uuid, sender: Uuid, text: &str) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id: sender,
            receiver_id: Uuid::new_v4(),
            message_text: Some(text.to_string()),
            attachment_url: None,
            attachment_type: None,
            job_id: None,
            is_read: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn confirmed_send_replaces_the_local_entry() {
        let me = Uuid::new_v4();
        let mut thread = Thread::new(Uuid::new_v4(), vec![]);
        thread.compose = "hello".into();
        let corr = thread.begin_send(me, Uuid::new_v4(), "hello");
        assert!(thread.compose.is_empty());
        assert_eq!(thread.entries[0].state, EntryState::PendingLocal);

        let server = server_message(thread.conversation_id, me, "hello");
        thread.confirm_send(corr, server.clone());
        assert_eq!(thread.entries.len(), 1);
        assert_eq!(thread.entries[0].state, EntryState::Confirmed);
        assert_eq!(thread.entries[0].message.id, server.id);
    }

    #[test]
    fn realtime_copy_arriving_first_is_not_duplicated() {
        let me = Uuid::new_v4();
        let mut thread = Thread::new(Uuid::new_v4(), vec![]);
        let corr = thread.begin_send(me, Uuid::new_v4(), "hi");
        let server = server_message(thread.conversation_id, me, "hi");

        assert!(thread.merge(server.clone()));
        assert_eq!(thread.entries.len(), 2);
        thread.confirm_send(corr, server.clone());
        assert_eq!(thread.entries.len(), 1);
        assert_eq!(thread.entries[0].correlation_id, corr);
        assert!(!thread.merge(server));
    }

    #[test]
    fn failed_send_restores_compose_text() {
        let mut thread = Thread::new(Uuid::new_v4(), vec![]);
        let corr = thread.begin_send(Uuid::new_v4(), Uuid::new_v4(), "are you free?");
        let rolled_back = thread.fail_send(corr).unwrap();
        assert_eq!(rolled_back.state, EntryState::FailedRolledBack);
        assert!(thread.entries.is_empty());
        assert_eq!(thread.compose, "are you free?");
        assert!(thread.fail_send(corr).is_none());
    }

    #[test]
    fn patch_updates_read_flag_in_place() {
        let conversation = Uuid::new_v4();
        let original = server_message(conversation, Uuid::new_v4(), "ping");
        let mut thread = Thread::new(conversation, vec![original.clone()]);
        let mut read = original;
        read.is_read = true;
        assert!(thread.patch(read));
        assert!(thread.entries[0].message.is_read);
        assert!(!thread.patch(server_message(conversation, Uuid::new_v4(), "other")));
    }
}
