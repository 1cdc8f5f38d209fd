// Chat session state machine. Operations are split into a synchronous
// `begin_*` half and `complete`; the async wrappers run both.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::classifier::PromptClassifier;
use crate::models::{ArchivedConversation, Conversation, Message, MessageOrigin, MessageStatus};
use crate::resolver::{Resolution, ResolveInput, ResponseResolver};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("message cannot be empty")]
    EmptyInput,

    #[error("message is too long ({actual} characters); the maximum is {limit} characters")]
    TooLong { limit: usize, actual: usize },

    #[error("a reply is still being generated")]
    Busy,

    #[error("message {0} not found")]
    MessageNotFound(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Resolving { pending_id: Uuid },
}

/// Receives the conversation after every change.
pub trait ConversationObserver: Send + Sync {
    fn conversation_changed(&self, conversation: &Conversation);

    fn conversation_archived(&self, _archived: &ArchivedConversation) {}
}

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub max_input_chars: usize,
    /// Cosmetic pause before the request so the typing indicator is visible.
    pub typing_delay: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_input_chars: 4000,
            typing_delay: Duration::from_millis(600),
        }
    }
}

/// A placeholder awaiting its resolution.
#[derive(Debug, Clone)]
pub struct PendingTurn {
    pub message_id: Uuid,
    pub input: ResolveInput,
}

pub struct ChatSession {
    conversation: Conversation,
    state: SessionState,
    resolver: Arc<ResponseResolver>,
    classifier: PromptClassifier,
    observers: Vec<Arc<dyn ConversationObserver>>,
    settings: SessionSettings,
    display_name: Option<String>,
}

impl ChatSession {
    pub fn new(resolver: Arc<ResponseResolver>, settings: SessionSettings) -> Self {
        Self {
            conversation: Conversation::new(),
            state: SessionState::Idle,
            resolver,
            classifier: PromptClassifier::default(),
            observers: Vec::new(),
            settings,
            display_name: None,
        }
    }

    /// Starts from a previously persisted chat. Stray placeholders are dropped.
    pub fn restore(mut self, mut conversation: Conversation) -> Self {
        conversation.messages.retain(|m| !m.is_pending());
        for message in &mut conversation.messages {
            message.origin = MessageOrigin::Restored;
        }
        self.conversation = conversation;
        self
    }

    pub fn add_observer(&mut self, observer: Arc<dyn ConversationObserver>) {
        self.observers.push(observer);
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn messages(&self) -> &[Message] {
        &self.conversation.messages
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_resolving(&self) -> bool {
        matches!(self.state, SessionState::Resolving { .. })
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn set_display_name(&mut self, name: Option<String>) {
        self.display_name = name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
    }

    fn ensure_idle(&self) -> Result<(), SessionError> {
        if self.is_resolving() {
            return Err(SessionError::Busy);
        }
        Ok(())
    }

    fn validate(&self, text: &str) -> Result<String, SessionError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(SessionError::EmptyInput);
        }
        let actual = trimmed.chars().count();
        if actual > self.settings.max_input_chars {
            return Err(SessionError::TooLong { limit: self.settings.max_input_chars, actual });
        }
        Ok(trimmed.to_string())
    }

    fn notify(&self) {
        for observer in &self.observers {
            observer.conversation_changed(&self.conversation);
        }
    }

    /// Inserts a placeholder at `index` (or appends) and enters `Resolving`.
    fn start_resolution(&mut self, placeholder_at: Option<usize>, user_text: String, context: Vec<Message>) -> PendingTurn {
        let placeholder = Message::pending();
        let message_id = placeholder.id;
        match placeholder_at {
            Some(index) => self.conversation.messages[index] = placeholder,
            None => self.conversation.messages.push(placeholder),
        }
        self.state = SessionState::Resolving { pending_id: message_id };
        self.notify();

        PendingTurn {
            message_id,
            input: ResolveInput {
                classification: self.classifier.classify(&user_text),
                user_text,
                context,
                display_name: self.display_name.clone(),
            },
        }
    }

    pub fn begin_submit(&mut self, text: &str) -> Result<PendingTurn, SessionError> {
        self.ensure_idle()?;
        let content = self.validate(text)?;

        self.conversation.messages.push(Message::user(content.clone()));
        let context = self.conversation.snapshot();
        let pending = self.start_resolution(None, content, context);
        log::info!(
            "Submitted message, resolving {:?} reply {}",
            pending.input.classification,
            pending.message_id
        );
        Ok(pending)
    }

    /// Updates a message's content. A user message directly followed by an
    /// assistant reply gets that reply regenerated against history ending at
    /// the edit; later turns stay where they are.
    pub fn begin_edit(&mut self, id: Uuid, new_content: &str) -> Result<Option<PendingTurn>, SessionError> {
        self.ensure_idle()?;
        let content = self.validate(new_content)?;
        let index = self.conversation.position(id).ok_or(SessionError::MessageNotFound(id))?;

        self.conversation.messages[index].content = content.clone();

        let regenerate = self.conversation.messages[index].is_user()
            && self
                .conversation
                .messages
                .get(index + 1)
                .is_some_and(Message::is_assistant);
        if !regenerate {
            log::debug!("Edited message {} without regeneration", id);
            self.notify();
            return Ok(None);
        }

        let context: Vec<Message> = self.conversation.messages[..=index]
            .iter()
            .filter(|m| !m.is_pending())
            .cloned()
            .collect();
        let pending = self.start_resolution(Some(index + 1), content, context);
        log::info!("Edited message {}, regenerating reply {}", id, pending.message_id);
        Ok(Some(pending))
    }

    /// Replaces an assistant reply with a fresh one appended at the end,
    /// answering the nearest preceding user message.
    pub fn begin_regenerate(&mut self, id: Uuid) -> Result<Option<PendingTurn>, SessionError> {
        self.ensure_idle()?;
        let index = self.conversation.position(id).ok_or(SessionError::MessageNotFound(id))?;

        if index == 0 || !self.conversation.messages[index].is_assistant() {
            log::warn!("Message {} cannot be regenerated", id);
            return Ok(None);
        }
        let Some(user_index) = self.conversation.messages[..index].iter().rposition(Message::is_user) else {
            log::warn!("No user message precedes {}, nothing to regenerate", id);
            return Ok(None);
        };

        let user_text = self.conversation.messages[user_index].content.clone();
        let context: Vec<Message> = self.conversation.messages[..=user_index]
            .iter()
            .filter(|m| !m.is_pending())
            .cloned()
            .collect();
        self.conversation.messages.remove(index);
        let pending = self.start_resolution(None, user_text, context);
        log::info!("Regenerating reply {} as {}", id, pending.message_id);
        Ok(Some(pending))
    }

    /// Future resolving a pending turn. Owns everything it needs, so it can be
    /// awaited directly or spawned by the caller. A panic inside the resolver
    /// becomes the generic connection-issue reply.
    pub fn resolution_task(&self, pending: &PendingTurn) -> impl Future<Output = Resolution> + Send + 'static {
        let resolver = Arc::clone(&self.resolver);
        let input = pending.input.clone();
        let message_id = pending.message_id;
        let delay = self.settings.typing_delay;

        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let handle = tokio::spawn(async move { resolver.resolve(&input).await });
            match handle.await {
                Ok(resolution) => resolution,
                Err(e) => {
                    log::error!("Resolution task for message {} failed: {:?}", message_id, e);
                    Resolution::connection_issue()
                }
            }
        }
    }

    /// Replaces the placeholder in place. Returns false for a stale turn.
    pub fn complete(&mut self, pending: PendingTurn, resolution: Resolution) -> bool {
        match self.state {
            SessionState::Resolving { pending_id } if pending_id == pending.message_id => {}
            _ => {
                log::warn!("Ignoring resolution for stale message {}", pending.message_id);
                return false;
            }
        }
        self.state = SessionState::Idle;

        let status = resolution.status();
        let resolution_degraded = resolution.is_degraded();
        match self.conversation.messages.iter_mut().find(|m| m.id == pending.message_id) {
            Some(message) => {
                message.content = resolution.text;
                message.status = status;
            }
            None => {
                log::error!("Placeholder {} vanished before resolution", pending.message_id);
                return false;
            }
        }
        if status == MessageStatus::Errored {
            log::warn!("Reply {} resolved with an error notice", pending.message_id);
        } else if resolution_degraded {
            log::info!("Reply {} resolved with canned text", pending.message_id);
        } else {
            log::info!("Reply {} resolved", pending.message_id);
        }
        self.notify();
        true
    }

    async fn drive(&mut self, pending: PendingTurn) -> Uuid {
        let message_id = pending.message_id;
        let resolution = self.resolution_task(&pending).await;
        self.complete(pending, resolution);
        message_id
    }

    /// Submits user text and waits for the reply. Returns the reply's id.
    pub async fn submit(&mut self, text: &str) -> Result<Uuid, SessionError> {
        let pending = self.begin_submit(text)?;
        Ok(self.drive(pending).await)
    }

    pub async fn edit_user_message(&mut self, id: Uuid, new_content: &str) -> Result<Option<Uuid>, SessionError> {
        match self.begin_edit(id, new_content)? {
            Some(pending) => Ok(Some(self.drive(pending).await)),
            None => Ok(None),
        }
    }

    pub async fn regenerate(&mut self, id: Uuid) -> Result<Option<Uuid>, SessionError> {
        match self.begin_regenerate(id)? {
            Some(pending) => Ok(Some(self.drive(pending).await)),
            None => Ok(None),
        }
    }

    /// Archives the current conversation (if any) and starts an empty one.
    pub fn start_new_conversation(&mut self) -> Result<Option<ArchivedConversation>, SessionError> {
        self.open_conversation(Conversation::new())
    }

    /// Makes `conversation` current, archiving the previous one when non-empty.
    pub fn open_conversation(&mut self, conversation: Conversation) -> Result<Option<ArchivedConversation>, SessionError> {
        self.ensure_idle()?;
        let archived = if self.conversation.is_empty() {
            None
        } else {
            let archived = ArchivedConversation::from_conversation(&self.conversation);
            log::info!("Archiving conversation {} ({})", archived.id, archived.title);
            for observer in &self.observers {
                observer.conversation_archived(&archived);
            }
            Some(archived)
        };
        self.conversation = conversation;
        self.notify();
        Ok(archived)
    }
}
