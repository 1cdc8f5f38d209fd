use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who wrote a message.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    Assistant,
}

/// Resolution state of a message. `Pending` marks the "typing" placeholder.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Final,
    Pending,
    Errored,
}

/// Whether a message was produced in this run or reloaded from storage.
/// Only presentation cares about this, so it is never written out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MessageOrigin {
    Live,
    #[default]
    Restored,
}

// Represents a single turn in a conversation
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    #[serde(default = "Uuid::new_v4")] // Generate a new UUID if missing during deserialization
    pub id: Uuid,
    pub content: String,
    pub author: Author,
    /// Display time ("HH:MM"), fixed at creation.
    pub created_at: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
    #[serde(skip)]
    pub origin: MessageOrigin,
}

impl Message {
    fn new(author: Author, content: impl Into<String>, status: MessageStatus) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            author,
            created_at: now.with_timezone(&Local).format("%H:%M").to_string(),
            timestamp: now,
            status,
            origin: MessageOrigin::Live,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Author::User, content, MessageStatus::Final)
    }

    pub fn assistant(content: impl Into<String>, status: MessageStatus) -> Self {
        Self::new(Author::Assistant, content, status)
    }

    /// Empty assistant placeholder shown while a resolution is in flight.
    pub fn pending() -> Self {
        Self::new(Author::Assistant, String::new(), MessageStatus::Pending)
    }

    pub fn is_pending(&self) -> bool {
        self.status == MessageStatus::Pending
    }

    pub fn is_user(&self) -> bool {
        self.author == Author::User
    }

    pub fn is_assistant(&self) -> bool {
        self.author == Author::Assistant
    }
}

/// The current chat: an ordered list of turns. Insertion order is display order.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Conversation {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<Message>,
    /// User-assigned title, kept across archive and restore.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub pinned: bool,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            messages: Vec::new(),
            title: None,
            pinned: false,
        }
    }

    pub fn from_messages(messages: Vec<Message>) -> Self {
        let created_at = messages.first().map(|m| m.timestamp).unwrap_or_else(Utc::now);
        Self {
            id: Uuid::new_v4(),
            created_at,
            messages,
            title: None,
            pinned: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn position(&self, id: Uuid) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }

    pub fn get(&self, id: Uuid) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Messages worth persisting: everything except the typing placeholder.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.iter().filter(|m| !m.is_pending()).cloned().collect()
    }

    /// Title for the archive: the first few words of the first user message.
    pub fn derive_title(&self) -> String {
        const TITLE_WORDS: usize = 5;
        let Some(first) = self.messages.iter().find(|m| m.is_user()) else {
            return "New Chat".to_string();
        };
        let words: Vec<&str> = first.content.split_whitespace().collect();
        if words.is_empty() {
            return "New Chat".to_string();
        }
        let mut title = words[..words.len().min(TITLE_WORDS)].join(" ");
        if words.len() > TITLE_WORDS {
            title.push_str("...");
        }
        title
    }
}

/// A finished conversation kept in the chat-history archive.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ArchivedConversation {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub title: String,
    pub messages: Vec<Message>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    // User-assigned metadata
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub renamed: bool,
}

impl ArchivedConversation {
    pub fn from_conversation(conversation: &Conversation) -> Self {
        Self {
            id: conversation.id,
            title: conversation.title.clone().unwrap_or_else(|| conversation.derive_title()),
            messages: conversation.snapshot(),
            created_at: conversation.created_at,
            pinned: conversation.pinned,
            renamed: conversation.title.is_some(),
        }
    }
}

impl From<ArchivedConversation> for Conversation {
    fn from(archived: ArchivedConversation) -> Self {
        Self {
            id: archived.id,
            created_at: archived.created_at,
            messages: archived.messages,
            title: archived.renamed.then_some(archived.title),
            pinned: archived.pinned,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct UserProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_uses_first_words_of_first_user_message() {
        let mut conversation = Conversation::new();
        conversation.messages.push(Message::assistant("welcome", MessageStatus::Final));
        conversation
            .messages
            .push(Message::user("  plan a safari trip to the Serengeti in July "));
        assert_eq!(conversation.derive_title(), "plan a safari trip to...");

        let short = Conversation::from_messages(vec![Message::user("lions")]);
        assert_eq!(short.derive_title(), "lions");
        assert_eq!(Conversation::new().derive_title(), "New Chat");
    }

    #[test]
    fn archive_metadata_survives_restore() {
        let conversation = Conversation::from_messages(vec![Message::user("where do zebras live")]);
        let mut archived = ArchivedConversation::from_conversation(&conversation);
        assert_eq!(archived.title, "where do zebras live");
        assert!(!archived.renamed && !archived.pinned);

        archived.title = "My zebra notes".to_string();
        archived.renamed = true;
        archived.pinned = true;
        let mut reopened = Conversation::from(archived);
        reopened.messages.push(Message::user("and giraffes?"));

        let again = ArchivedConversation::from_conversation(&reopened);
        assert_eq!(again.id, conversation.id);
        assert_eq!(again.title, "My zebra notes");
        assert!(again.renamed && again.pinned);
        assert_eq!(again.messages.len(), 2);
    }

    #[test]
    fn pinned_without_rename_keeps_derived_title() {
        let conversation = Conversation::from_messages(vec![Message::user("baobab facts")]);
        let mut archived = ArchivedConversation::from_conversation(&conversation);
        archived.pinned = true;
        let reopened = Conversation::from(archived);
        assert_eq!(reopened.title, None);

        let again = ArchivedConversation::from_conversation(&reopened);
        assert_eq!(again.title, "baobab facts");
        assert!(again.pinned && !again.renamed);
    }

    #[test]
    fn snapshot_drops_pending_placeholder() {
        let mut conversation = Conversation::new();
        conversation.messages.push(Message::user("q"));
        conversation.messages.push(Message::pending());
        let snapshot = conversation.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].is_user());
    }

    #[test]
    fn serde_round_trip_keeps_order_and_marks_restored() {
        let conversation = Conversation::from_messages(vec![
            Message::user("first"),
            Message::assistant("second", MessageStatus::Final),
            Message::assistant("third", MessageStatus::Errored),
        ]);
        let json = serde_json::to_string(&conversation.snapshot()).unwrap();
        let restored: Vec<Message> = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.len(), 3);
        for (before, after) in conversation.messages.iter().zip(&restored) {
            assert_eq!(before.id, after.id);
            assert_eq!(before.content, after.content);
            assert_eq!(before.author, after.author);
            assert_eq!(before.created_at, after.created_at);
            assert_eq!(before.timestamp, after.timestamp);
            assert_eq!(before.status, after.status);
            assert_eq!(after.origin, MessageOrigin::Restored);
        }
    }
}
