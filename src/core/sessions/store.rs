use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::io::{encode_sessions, read_sessions};
use super::{ChatSession, DEFAULT_SESSION_TITLE};
use crate::core::message::Message;
use crate::core::storage::{BlobStore, SESSIONS_BACKUP_KEY, SESSIONS_KEY};
use crate::utils::ids::new_id;

/// Owns every session and persists the collection after each mutation.
///
/// Persistence failures never reach callers: the mutation stands in memory,
/// the failure is logged, and the next mutation writes the whole collection
/// again.
pub struct SessionStore {
    blobs: Arc<dyn BlobStore>,
    sessions: Mutex<Vec<ChatSession>>,
    needs_persist: AtomicBool,
    revision: watch::Sender<u64>,
}

impl SessionStore {
    /// A stored collection that cannot be read in full is copied to
    /// [`SESSIONS_BACKUP_KEY`] first, so the next write does not destroy it.
    pub fn load(blobs: Arc<dyn BlobStore>) -> Self {
        let sessions = match blobs.load(SESSIONS_KEY) {
            Ok(Some(raw)) => {
                let (sessions, intact) = read_sessions(&raw);
                if !intact {
                    set_aside_damaged(blobs.as_ref());
                }
                sessions
            }
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!(error = %err, "Failed to read sessions; starting empty");
                set_aside_damaged(blobs.as_ref());
                Vec::new()
            }
        };
        debug!(count = sessions.len(), "Loaded sessions");

        let (revision, _) = watch::channel(0);
        Self {
            blobs,
            sessions: Mutex::new(sessions),
            needs_persist: AtomicBool::new(false),
            revision,
        }
    }

    /// Create a session seeded with the greeting and put it at the head.
    pub fn create(&self, initial_title: Option<&str>, model: &str) -> ChatSession {
        let title = initial_title
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .unwrap_or(DEFAULT_SESSION_TITLE);
        let session = ChatSession::seeded(title, model);
        self.mutate(|sessions| sessions.insert(0, session.clone()));
        session
    }

    pub fn get(&self, id: &str) -> Option<ChatSession> {
        self.lock().iter().find(|session| session.id == id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().iter().any(|session| session.id == id)
    }

    /// All sessions, most recent activity first.
    pub fn list(&self) -> Vec<ChatSession> {
        let mut sessions = self.lock().clone();
        sessions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        sessions
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn rename(&self, id: &str, title: &str) -> bool {
        let title = title.trim().to_string();
        self.mutate_session(id, |session| session.title = title)
    }

    pub fn delete(&self, id: &str) -> bool {
        self.mutate(|sessions| {
            let before = sessions.len();
            sessions.retain(|session| session.id != id);
            sessions.len() != before
        })
    }

    /// Remove every session. The store is left empty.
    pub fn delete_all(&self) {
        self.mutate(|sessions| sessions.clear());
    }

    /// Replace the message sequence of a session with the result of a
    /// completed exchange. Returns false if the session no longer exists or
    /// `messages` is empty.
    pub fn commit(
        &self,
        id: &str,
        messages: Vec<Message>,
        last_message: String,
        title_override: Option<String>,
    ) -> bool {
        if messages.is_empty() {
            warn!(session_id = %id, "Refusing to commit an empty message list");
            return false;
        }
        self.mutate_session(id, |session| {
            session.messages = messages;
            session.last_message = last_message;
            session.timestamp = Utc::now();
            if let Some(title) = title_override {
                session.title = title;
            }
        })
    }

    /// Copy a session under a new id, titled `<title> (Copy)`.
    pub fn duplicate(&self, id: &str) -> Option<ChatSession> {
        let mut copy = self.get(id)?;
        copy.id = new_id();
        copy.title = format!("{} (Copy)", copy.title);
        copy.timestamp = Utc::now();
        self.mutate(|sessions| sessions.insert(0, copy.clone()));
        Some(copy)
    }

    /// Pretty JSON of one session.
    pub fn export(&self, id: &str) -> Option<Result<String, serde_json::Error>> {
        self.get(id)
            .map(|session| serde_json::to_string_pretty(&session))
    }

    /// Receiver whose value changes on every mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// True when the last write failed and has not yet been retried.
    pub fn needs_persist(&self) -> bool {
        self.needs_persist.load(Ordering::SeqCst)
    }

    /// Write the collection now, reporting failure to the caller.
    pub fn flush(&self) -> io::Result<()> {
        let sessions = self.lock();
        let result = self.write(&sessions);
        self.needs_persist.store(result.is_err(), Ordering::SeqCst);
        result
    }

    fn mutate<T>(&self, apply: impl FnOnce(&mut Vec<ChatSession>) -> T) -> T {
        let mut sessions = self.lock();
        let result = apply(&mut sessions);
        self.persist(&sessions);
        drop(sessions);
        self.revision.send_modify(|revision| *revision += 1);
        result
    }

    fn mutate_session(&self, id: &str, apply: impl FnOnce(&mut ChatSession)) -> bool {
        let mut sessions = self.lock();
        let Some(session) = sessions.iter_mut().find(|session| session.id == id) else {
            return false;
        };
        apply(session);
        self.persist(&sessions);
        drop(sessions);
        self.revision.send_modify(|revision| *revision += 1);
        true
    }

    fn persist(&self, sessions: &[ChatSession]) {
        match self.write(sessions) {
            Ok(()) => self.needs_persist.store(false, Ordering::SeqCst),
            Err(err) => {
                warn!(error = %err, "Failed to persist sessions; will retry on next change");
                self.needs_persist.store(true, Ordering::SeqCst);
            }
        }
    }

    fn write(&self, sessions: &[ChatSession]) -> io::Result<()> {
        let json = encode_sessions(sessions).map_err(io::Error::other)?;
        self.blobs.save(SESSIONS_KEY, &json)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ChatSession>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn set_aside_damaged(blobs: &dyn BlobStore) {
    match blobs.copy(SESSIONS_KEY, SESSIONS_BACKUP_KEY) {
        Ok(()) => warn!(backup = SESSIONS_BACKUP_KEY, "Kept a copy of the damaged session collection"),
        Err(err) => warn!(error = %err, "Could not keep a copy of the damaged session collection"),
    }
}
