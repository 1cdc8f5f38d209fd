use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Row, Sqlite, SqlitePool};
use std::path::Path;
use uuid::Uuid;

use crate::models::{ArchivedConversation, Conversation, Message, UserProfile};

// Every blob lives in a single key-value table
const MIGRATIONS_SQL: &str = "
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL, -- JSON blob
    updated_at INTEGER NOT NULL -- Unix Timestamp (seconds)
);
";

pub const CURRENT_CHAT_KEY: &str = "currentChat";
pub const CURRENT_CHAT_META_KEY: &str = "currentChatMeta";
pub const CHAT_HISTORY_KEY: &str = "chatHistory";
pub const PROFILE_KEY: &str = "userProfile";

// Identity and user-assigned metadata of the current chat, kept beside its messages
#[derive(Serialize, Deserialize)]
struct CurrentChatMeta {
    id: Uuid,
    created_at: DateTime<Utc>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    pinned: bool,
}

#[derive(Debug, Clone)]
pub struct StorageManager {
    pool: SqlitePool,
}

impl StorageManager {
    /// Opens (creating if needed) the database file and runs migrations.
    pub async fn open(db_path: &Path) -> Result<Self, anyhow::Error> {
        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.context("Failed to create database directory")?;
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.to_string_lossy());
        log::info!("Connecting to database: {}", db_url);

        if !Sqlite::database_exists(&db_url).await.unwrap_or(false) {
            log::info!("Database file not found, creating...");
            Sqlite::create_database(&db_url).await.context("Failed to create database")?;
        }

        let pool = SqlitePoolOptions::new()
            .connect(&db_url)
            .await
            .context("Failed to connect to SQLite database")?;

        Self::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<(), anyhow::Error> {
        log::info!("Running database migrations...");
        sqlx::query(MIGRATIONS_SQL)
            .execute(pool)
            .await
            .context("Failed to run database migrations")?;
        log::info!("Database migrations completed.");
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, anyhow::Error> {
        log::debug!("Reading key {}", key);
        let row = sqlx::query("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .context(format!("Failed to read key '{}'", key))?;

        match row {
            Some(row) => {
                let raw: String = row.try_get("value").context("Failed to read value column")?;
                let value = serde_json::from_str(&raw).context(format!("Failed to parse JSON stored under '{}'", key))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn put_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), anyhow::Error> {
        let raw = serde_json::to_string(value).context(format!("Failed to serialize value for '{}'", key))?;
        let updated_at = Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO kv (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(raw)
        .bind(updated_at)
        .execute(&self.pool)
        .await
        .context(format!("Failed to write key '{}'", key))?;
        log::debug!("Wrote key {}", key);
        Ok(())
    }

    async fn delete_key(&self, key: &str) -> Result<(), anyhow::Error> {
        sqlx::query("DELETE FROM kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .context(format!("Failed to delete key '{}'", key))?;
        log::debug!("Deleted key {}", key);
        Ok(())
    }

    // --- Current chat ---

    /// Writes the current chat, minus any pending placeholder. An empty chat
    /// removes the blob instead.
    pub async fn save_current_chat(&self, messages: &[Message]) -> Result<(), anyhow::Error> {
        let persisted: Vec<&Message> = messages.iter().filter(|m| !m.is_pending()).collect();
        if persisted.is_empty() {
            return self.delete_key(CURRENT_CHAT_KEY).await;
        }
        self.put_json(CURRENT_CHAT_KEY, &persisted).await
    }

    pub async fn load_current_chat(&self) -> Result<Vec<Message>, anyhow::Error> {
        let messages: Vec<Message> = self.get_json(CURRENT_CHAT_KEY).await?.unwrap_or_default();
        log::info!("Loaded {} messages of the current chat", messages.len());
        Ok(messages)
    }

    pub async fn save_current_conversation(&self, conversation: &Conversation) -> Result<(), anyhow::Error> {
        if conversation.snapshot().is_empty() {
            self.delete_key(CURRENT_CHAT_META_KEY).await?;
        } else {
            let meta = CurrentChatMeta {
                id: conversation.id,
                created_at: conversation.created_at,
                title: conversation.title.clone(),
                pinned: conversation.pinned,
            };
            self.put_json(CURRENT_CHAT_META_KEY, &meta).await?;
        }
        self.save_current_chat(&conversation.messages).await
    }

    /// Rebuilds the current chat. A missing metadata blob yields a fresh id.
    pub async fn load_current_conversation(&self) -> Result<Conversation, anyhow::Error> {
        let mut conversation = Conversation::from_messages(self.load_current_chat().await?);
        if let Some(meta) = self.get_json::<CurrentChatMeta>(CURRENT_CHAT_META_KEY).await? {
            conversation.id = meta.id;
            conversation.created_at = meta.created_at;
            conversation.title = meta.title;
            conversation.pinned = meta.pinned;
        }
        Ok(conversation)
    }

    // --- Chat history archive ---

    pub async fn list_archived(&self) -> Result<Vec<ArchivedConversation>, anyhow::Error> {
        Ok(self.get_json(CHAT_HISTORY_KEY).await?.unwrap_or_default())
    }

    async fn save_archive(&self, archive: &[ArchivedConversation]) -> Result<(), anyhow::Error> {
        self.put_json(CHAT_HISTORY_KEY, archive).await
    }

    pub async fn append_archived(&self, conversation: &ArchivedConversation) -> Result<(), anyhow::Error> {
        let mut archive = self.list_archived().await?;
        // Re-archiving a restored conversation replaces its earlier copy
        archive.retain(|c| c.id != conversation.id);
        archive.push(conversation.clone());
        self.save_archive(&archive).await?;
        log::info!("Archived conversation {} ({} in history)", conversation.id, archive.len());
        Ok(())
    }

    pub async fn get_archived(&self, id: Uuid) -> Result<Option<ArchivedConversation>, anyhow::Error> {
        Ok(self.list_archived().await?.into_iter().find(|c| c.id == id))
    }

    async fn update_archived<F>(&self, id: Uuid, update: F) -> Result<(), anyhow::Error>
    where
        F: FnOnce(&mut ArchivedConversation),
    {
        let mut archive = self.list_archived().await?;
        let Some(entry) = archive.iter_mut().find(|c| c.id == id) else {
            log::warn!("Attempted to update non-existent archived conversation: {}", id);
            return Err(anyhow::anyhow!("Archived conversation {} not found", id));
        };
        update(entry);
        self.save_archive(&archive).await
    }

    pub async fn rename_archived(&self, id: Uuid, new_title: String) -> Result<(), anyhow::Error> {
        let title = new_title.trim().to_string();
        if title.is_empty() {
            return Err(anyhow::anyhow!("New title cannot be empty."));
        }
        log::info!("Renaming archived conversation {} to: {}", id, title);
        self.update_archived(id, |c| {
            c.title = title;
            c.renamed = true;
        })
        .await
    }

    pub async fn set_archived_pinned(&self, id: Uuid, pinned: bool) -> Result<(), anyhow::Error> {
        log::info!("Setting pinned={} on archived conversation {}", pinned, id);
        self.update_archived(id, |c| c.pinned = pinned).await
    }

    pub async fn delete_archived(&self, id: Uuid) -> Result<(), anyhow::Error> {
        log::warn!("Deleting archived conversation with ID: {}", id);
        let mut archive = self.list_archived().await?;
        let before = archive.len();
        archive.retain(|c| c.id != id);
        if archive.len() == before {
            log::warn!("Attempted to delete non-existent archived conversation: {}", id);
            return Ok(());
        }
        self.save_archive(&archive).await
    }

    /// Removes an archived conversation and hands it back, e.g. to reopen it.
    pub async fn take_archived(&self, id: Uuid) -> Result<Option<ArchivedConversation>, anyhow::Error> {
        let mut archive = self.list_archived().await?;
        let Some(index) = archive.iter().position(|c| c.id == id) else {
            return Ok(None);
        };
        let taken = archive.remove(index);
        self.save_archive(&archive).await?;
        Ok(Some(taken))
    }

    // --- Profile ---

    pub async fn load_profile(&self) -> Result<UserProfile, anyhow::Error> {
        Ok(self.get_json(PROFILE_KEY).await?.unwrap_or_default())
    }

    pub async fn save_profile(&self, profile: &UserProfile) -> Result<(), anyhow::Error> {
        self.put_json(PROFILE_KEY, profile).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
