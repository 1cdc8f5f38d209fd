use anyhow::Context;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::api::{GeminiProvider, GenerationProvider};
use crate::config::AppConfig;
use crate::models::{Conversation, UserProfile};
use crate::persistence::PersistenceListener;
use crate::resolver::ResponseResolver;
use crate::rotation::{RotatingGenerator, RotationMemory};
use crate::session::ChatSession;
use crate::storage::StorageManager;

// Core application state shared by the command handlers
pub struct AppState {
    pub config: AppConfig,
    pub storage: StorageManager,
    pub session: ChatSession,
    persistence: Arc<PersistenceListener>,
    writer: JoinHandle<()>,
}

impl AppState {
    /// Wires the Gemini provider from configuration.
    pub async fn initialize(config: AppConfig) -> Result<Self, anyhow::Error> {
        let provider: Arc<dyn GenerationProvider> = Arc::new(
            GeminiProvider::new(config.api_url.clone(), config.request_timeout())
                .context("Failed to build HTTP client")?,
        );
        Self::with_provider(config, provider).await
    }

    pub async fn with_provider(config: AppConfig, provider: Arc<dyn GenerationProvider>) -> Result<Self, anyhow::Error> {
        let storage = StorageManager::open(&config.db_path).await?;

        let credentials = config.resolve_credentials();
        if credentials.is_empty() {
            log::warn!("No API credentials could be resolved; replies will fall back to canned text");
        }
        let generator = RotatingGenerator::new(
            provider,
            config.models.clone(),
            credentials,
            Arc::new(RotationMemory::new()),
        );
        let resolver = Arc::new(ResponseResolver::new(generator));

        let current = storage.load_current_conversation().await?;
        let profile = storage.load_profile().await?;

        let mut session = ChatSession::new(resolver, config.session_settings()).restore(current);
        session.set_display_name(profile.display_name);

        let (listener, writer) = PersistenceListener::spawn(storage.clone());
        let persistence = Arc::new(listener);
        session.add_observer(persistence.clone());

        log::info!("Session ready with {} restored messages", session.messages().len());
        Ok(Self { config, storage, session, persistence, writer })
    }

    pub async fn set_display_name(&mut self, name: Option<String>) -> Result<(), anyhow::Error> {
        self.session.set_display_name(name);
        let profile = UserProfile { display_name: self.session.display_name().map(str::to_string) };
        self.storage.save_profile(&profile).await
    }

    /// Reopens an archived conversation; the current one goes to the archive.
    pub async fn restore_archived(&mut self, id: Uuid) -> Result<bool, anyhow::Error> {
        if self.session.is_resolving() {
            return Err(anyhow::anyhow!("Cannot switch conversations while a reply is being generated"));
        }
        // Pending archive writes must land before the archive is read back
        self.persistence.flush().await;
        let Some(archived) = self.storage.take_archived(id).await? else {
            return Ok(false);
        };
        self.session.open_conversation(Conversation::from(archived))?;
        self.persistence.flush().await;
        Ok(true)
    }

    /// Waits for queued writes and stops the writer task.
    pub async fn shutdown(self) {
        self.persistence.flush().await;
        let AppState { session, persistence, writer, .. } = self;
        drop(session);
        drop(persistence);
        if let Err(e) = writer.await {
            log::error!("Persistence writer ended abnormally: {:?}", e);
        }
    }

    pub async fn flush(&self) {
        self.persistence.flush().await;
    }
}
