//! The application context: every engine component, constructed once and
//! handed to the surfaces that need it.

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::api::{AddMemoryRequest, IngestQueueEntry, MemoryMetadata, RemoteSession};
use crate::core::backend::{Backend, BackendError, Endpoints, HttpBackend, IngestUpload};
use crate::core::chat_stream::{ExchangeSettings, StreamingChatClient};
use crate::core::config::Config;
use crate::core::connectivity::{ConnectivityMonitor, SystemStatus};
use crate::core::message::MemoryItem;
use crate::core::preferences::PreferencesStore;
use crate::core::retrieval::{to_memory_items, RetrievalMerger};
use crate::core::sessions::{ChatSession, SessionStore, INITIAL_SESSION_TITLE};
use crate::core::storage::{BlobStore, FileBlobStore};

/// Query used when browsing memories without a search term.
pub const BROWSE_QUERY: &str = "recent";
pub const BROWSE_LIMIT: usize = 20;
pub const DEFAULT_MEMORY_SOURCE: &str = "user-selection";
pub const DEFAULT_UPLOAD_TAG: &str = "cli-upload";

pub struct AppContext {
    config: Config,
    backend: Arc<dyn Backend>,
    monitor: Arc<ConnectivityMonitor>,
    sessions: Arc<SessionStore>,
    preferences: Arc<PreferencesStore>,
    retrieval: Arc<RetrievalMerger>,
    chat: StreamingChatClient,
}

impl AppContext {
    /// Wire the components around `backend` and `blobs`. An empty session
    /// store gets one starter session.
    pub fn new(config: Config, backend: Arc<dyn Backend>, blobs: Arc<dyn BlobStore>) -> Self {
        let monitor = Arc::new(ConnectivityMonitor::new(
            Arc::clone(&backend),
            config.probe_timeout(),
            config.offline_cooldown(),
        ));
        let sessions = Arc::new(SessionStore::load(Arc::clone(&blobs)));
        let preferences = Arc::new(PreferencesStore::load(blobs));
        let retrieval = Arc::new(RetrievalMerger::new(
            Arc::clone(&backend),
            config.retrieval_threshold(),
        ));
        let chat = StreamingChatClient::new(
            Arc::clone(&backend),
            Arc::clone(&monitor),
            Arc::clone(&sessions),
            Arc::clone(&preferences),
            Arc::clone(&retrieval),
            ExchangeSettings::from_config(&config),
        );

        if sessions.is_empty() {
            sessions.create(
                Some(INITIAL_SESSION_TITLE),
                &preferences.get().active_model,
            );
        }

        Self {
            config,
            backend,
            monitor,
            sessions,
            preferences,
            retrieval,
            chat,
        }
    }

    /// The production wiring: HTTP backend plus file storage in the data
    /// directory.
    pub fn from_config(config: Config) -> Result<Self, Box<dyn Error>> {
        let data_dir = config
            .resolved_data_dir()
            .ok_or("Could not determine a data directory; set data_dir in config.toml")?;
        debug!(dir = %data_dir.display(), "Using data directory");

        let backend = HttpBackend::new(reqwest::Client::new(), Endpoints::from_config(&config));
        let blobs = FileBlobStore::new(data_dir);
        Ok(Self::new(config, Arc::new(backend), Arc::new(blobs)))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn preferences(&self) -> &PreferencesStore {
        &self.preferences
    }

    pub fn chat(&self) -> &StreamingChatClient {
        &self.chat
    }

    pub fn create_session(&self, title: Option<&str>) -> ChatSession {
        self.sessions
            .create(title, &self.preferences.get().active_model)
    }

    /// The requested session, or the most recent one (creating one if the
    /// store is empty).
    pub fn ensure_session(&self, id: Option<&str>) -> Result<ChatSession, String> {
        match id {
            Some(id) => self
                .sessions
                .get(id)
                .ok_or_else(|| format!("Session not found: {id}")),
            None => Ok(self
                .sessions
                .list()
                .into_iter()
                .next()
                .unwrap_or_else(|| self.create_session(None))),
        }
    }

    /// Remove every session and start over with a single fresh one.
    pub fn delete_all_sessions(&self) -> ChatSession {
        self.sessions.delete_all();
        self.create_session(None)
    }

    pub async fn status(&self) -> SystemStatus {
        self.monitor.status().await
    }

    /// Search stored memories. An empty query browses recent ones.
    pub async fn search_memories(&self, query: &str, k: Option<usize>) -> Vec<MemoryItem> {
        if self.monitor.should_skip_probe() {
            return Vec::new();
        }
        let query = match query.trim() {
            "" => BROWSE_QUERY,
            query => query,
        };
        let hits = self
            .retrieval
            .fetch_hits(query, k.unwrap_or(BROWSE_LIMIT))
            .await;
        to_memory_items(&hits)
    }

    pub async fn add_memory(&self, text: &str, source: Option<&str>) -> bool {
        if self.monitor.should_skip_probe() {
            return false;
        }
        let request = AddMemoryRequest {
            text: text.to_string(),
            metadata: MemoryMetadata {
                kind: "note".to_string(),
                source: source.unwrap_or(DEFAULT_MEMORY_SOURCE).to_string(),
                ts: Utc::now().timestamp(),
            },
        };
        self.track(self.backend.add_memory(&request).await)
            .unwrap_or(false)
    }

    /// Upload a file for ingestion with the configured chunking profile.
    /// Returns `Ok(false)` when the backend is offline or declines the file.
    pub async fn upload_file(&self, path: &Path, tag: Option<&str>) -> Result<bool, Box<dyn Error>> {
        let bytes = tokio::fs::read(path).await?;
        if self.monitor.should_skip_probe() {
            warn!("Cannot upload: backend is offline");
            return Ok(false);
        }
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let upload = IngestUpload {
            file_name,
            bytes,
            tag: tag.unwrap_or(DEFAULT_UPLOAD_TAG).to_string(),
            mode: self.preferences.get().ingest_mode,
        };
        Ok(self
            .track(self.backend.ingest_file(upload).await)
            .unwrap_or(false))
    }

    pub async fn ingest_queue(&self) -> Vec<IngestQueueEntry> {
        if self.monitor.should_skip_probe() {
            return Vec::new();
        }
        self.track(self.backend.ingest_queue().await)
            .unwrap_or_default()
    }

    pub async fn remote_sessions(&self) -> Result<Vec<RemoteSession>, BackendError> {
        self.track_err(self.backend.list_sessions().await)
    }

    pub async fn clear_remote_session(&self, session_id: &str) -> Result<(), BackendError> {
        self.track_err(self.backend.clear_session(session_id).await)
    }

    /// Feed the outcome of a data-plane call to the monitor, logging and
    /// discarding the error.
    fn track<T>(&self, result: Result<T, BackendError>) -> Option<T> {
        match self.track_err(result) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(error = %err, "Backend call failed");
                None
            }
        }
    }

    fn track_err<T>(&self, result: Result<T, BackendError>) -> Result<T, BackendError> {
        match &result {
            Ok(_) => self.monitor.mark_online(),
            Err(BackendError::Status { .. } | BackendError::Decode { .. }) => {}
            Err(_) => self.monitor.mark_offline(),
        }
        result
    }
}
