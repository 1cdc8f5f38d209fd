// Observers run synchronously, so snapshots are queued for a writer task

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::models::{ArchivedConversation, Conversation};
use crate::session::ConversationObserver;
use crate::storage::StorageManager;

enum PersistCommand {
    SaveCurrent(Conversation),
    Archive(ArchivedConversation),
    Flush(oneshot::Sender<()>),
}

pub struct PersistenceListener {
    sender: mpsc::UnboundedSender<PersistCommand>,
}

impl PersistenceListener {
    /// Spawns the writer task. Must be called inside a Tokio runtime.
    pub fn spawn(storage: StorageManager) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            while let Some(command) = receiver.recv().await {
                match command {
                    PersistCommand::SaveCurrent(conversation) => {
                        if let Err(e) = storage.save_current_conversation(&conversation).await {
                            log::error!("Failed to persist current chat: {:?}", e);
                        }
                    }
                    PersistCommand::Archive(archived) => {
                        if let Err(e) = storage.append_archived(&archived).await {
                            log::error!("Failed to archive conversation {}: {:?}", archived.id, e);
                        }
                    }
                    PersistCommand::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            log::debug!("Persistence writer stopped");
        });
        (Self { sender }, handle)
    }

    fn send(&self, command: PersistCommand) {
        if self.sender.send(command).is_err() {
            log::error!("Persistence writer is gone, dropping snapshot");
        }
    }

    /// Resolves once every snapshot queued so far has been written.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        self.send(PersistCommand::Flush(done));
        let _ = wait.await;
    }
}

impl ConversationObserver for PersistenceListener {
    fn conversation_changed(&self, conversation: &Conversation) {
        self.send(PersistCommand::SaveCurrent(conversation.clone()));
    }

    fn conversation_archived(&self, archived: &ArchivedConversation) {
        self.send(PersistCommand::Archive(archived.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Message, MessageStatus};

    #[tokio::test]
    async fn writes_snapshots_and_archives_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::open(&dir.path().join("p.sqlite")).await.unwrap();
        let (listener, _handle) = PersistenceListener::spawn(storage.clone());

        let mut conversation = Conversation::new();
        conversation.messages.push(Message::user("giraffes?"));
        conversation.messages.push(Message::pending());
        listener.conversation_changed(&conversation);
        listener.flush().await;
        assert_eq!(storage.load_current_chat().await.unwrap().len(), 1);

        conversation.messages[1].status = MessageStatus::Final;
        conversation.messages[1].content = "Tall.".to_string();
        listener.conversation_changed(&conversation);
        listener.conversation_archived(&ArchivedConversation::from_conversation(&conversation));
        listener.conversation_changed(&Conversation::new());
        listener.flush().await;

        assert!(storage.load_current_chat().await.unwrap().is_empty());
        let archive = storage.list_archived().await.unwrap();
        assert_eq!(archive.len(), 1);
        assert_eq!(archive[0].messages[1].content, "Tall.");
    }
}
