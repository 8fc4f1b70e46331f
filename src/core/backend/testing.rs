//! A scripted in-process backend for engine tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};

use super::{Backend, BackendError, ByteStream, Endpoint, IngestUpload};
use crate::api::{
    AddMemoryRequest, ChatReply, ChatRequest, HealthResponse, IngestQueueEntry, RemoteSession,
    SearchHit, StreamChatRequest,
};

/// How the next `open_chat_stream` call behaves.
#[derive(Debug, Clone)]
pub enum StreamScript {
    /// Yield each chunk, then end cleanly.
    Chunks(Vec<Vec<u8>>),
    /// Yield each chunk, then fail with a transport error.
    DropAfter(Vec<Vec<u8>>),
    /// Refuse the request with the given HTTP status.
    Refuse(u16),
    /// Yield each chunk, then never produce anything again.
    Hang(Vec<Vec<u8>>),
}

impl StreamScript {
    /// Split a body into one chunk per string.
    pub fn frames(parts: &[&str]) -> Self {
        StreamScript::Chunks(parts.iter().map(|part| part.as_bytes().to_vec()).collect())
    }
}

pub struct ScriptedBackend {
    calls: AtomicUsize,
    healthy: AtomicBool,
    health_delay: Mutex<Option<Duration>>,
    search_fails: AtomicBool,
    chat_hangs: AtomicBool,
    script: Mutex<StreamScript>,
    hits: Mutex<Vec<SearchHit>>,
    reply: Mutex<ChatReply>,
    queue: Mutex<Vec<IngestQueueEntry>>,
    stream_requests: Mutex<Vec<StreamChatRequest>>,
    chat_requests: Mutex<Vec<ChatRequest>>,
    memory_requests: Mutex<Vec<AddMemoryRequest>>,
    cleared: Mutex<Vec<String>>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            healthy: AtomicBool::new(true),
            health_delay: Mutex::new(None),
            search_fails: AtomicBool::new(false),
            chat_hangs: AtomicBool::new(false),
            script: Mutex::new(StreamScript::frames(&["data: [DONE]\n\n"])),
            hits: Mutex::new(Vec::new()),
            reply: Mutex::new(ChatReply::default()),
            queue: Mutex::new(Vec::new()),
            stream_requests: Mutex::new(Vec::new()),
            chat_requests: Mutex::new(Vec::new()),
            memory_requests: Mutex::new(Vec::new()),
            cleared: Mutex::new(Vec::new()),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stream(self, script: StreamScript) -> Self {
        self.set_stream(script);
        self
    }

    pub fn with_hits(self, hits: Vec<SearchHit>) -> Self {
        *lock(&self.hits) = hits;
        self
    }

    pub fn with_reply(self, reply: &str) -> Self {
        *lock(&self.reply) = ChatReply {
            reply: reply.to_string(),
            ..ChatReply::default()
        };
        self
    }

    /// Memory ids reported alongside the one-shot reply.
    pub fn with_memory_ids(self, ids: &[&str]) -> Self {
        lock(&self.reply).memory_ids = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    pub fn with_queue(self, queue: Vec<IngestQueueEntry>) -> Self {
        *lock(&self.queue) = queue;
        self
    }

    pub fn set_stream(&self, script: StreamScript) {
        *lock(&self.script) = script;
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_health_delay(&self, delay: Duration) {
        *lock(&self.health_delay) = Some(delay);
    }

    pub fn set_search_fails(&self, fails: bool) {
        self.search_fails.store(fails, Ordering::SeqCst);
    }

    /// Make the one-shot chat endpoint accept the request and never answer.
    pub fn set_chat_hangs(&self, hangs: bool) {
        self.chat_hangs.store(hangs, Ordering::SeqCst);
    }

    /// Total number of backend calls of any kind.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn stream_requests(&self) -> Vec<StreamChatRequest> {
        lock(&self.stream_requests).clone()
    }

    pub fn chat_requests(&self) -> Vec<ChatRequest> {
        lock(&self.chat_requests).clone()
    }

    pub fn memory_requests(&self) -> Vec<AddMemoryRequest> {
        lock(&self.memory_requests).clone()
    }

    pub fn cleared(&self) -> Vec<String> {
        lock(&self.cleared).clone()
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn check_healthy(&self, endpoint: Endpoint) -> Result<(), BackendError> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(connection_error(endpoint))
        }
    }
}

/// A `Request` error built without touching the network: the URL never parses.
pub fn connection_error(endpoint: Endpoint) -> BackendError {
    match reqwest::Client::new().get("not a url").build() {
        Err(source) => BackendError::Request { endpoint, source },
        Ok(_) => panic!("a relative URL should not build"),
    }
}

pub fn hit(text: &str, score: Option<f64>) -> SearchHit {
    SearchHit {
        id: None,
        text: text.to_string(),
        score,
        metadata: None,
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn health(&self) -> Result<HealthResponse, BackendError> {
        self.record_call();
        let delay = *lock(&self.health_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_healthy(Endpoint::Health)?;
        Ok(HealthResponse {
            model: Some("Mistral-7B".to_string()),
            memory_backend: Some("chroma".to_string()),
            ts: None,
        })
    }

    async fn list_sessions(&self) -> Result<Vec<RemoteSession>, BackendError> {
        self.record_call();
        self.check_healthy(Endpoint::Sessions)?;
        Ok(vec![RemoteSession {
            id: "remote-1".to_string(),
            title: "Remote".to_string(),
            updated_at: None,
        }])
    }

    async fn clear_session(&self, session_id: &str) -> Result<(), BackendError> {
        self.record_call();
        self.check_healthy(Endpoint::SessionClear)?;
        lock(&self.cleared).push(session_id.to_string());
        Ok(())
    }

    async fn search_memory(&self, _query: &str, k: usize) -> Result<Vec<SearchHit>, BackendError> {
        self.record_call();
        self.check_healthy(Endpoint::MemorySearch)?;
        if self.search_fails.load(Ordering::SeqCst) {
            return Err(BackendError::Status {
                endpoint: Endpoint::MemorySearch,
                status: 500,
                body: String::new(),
            });
        }
        Ok(lock(&self.hits).iter().take(k).cloned().collect())
    }

    async fn add_memory(&self, request: &AddMemoryRequest) -> Result<bool, BackendError> {
        self.record_call();
        self.check_healthy(Endpoint::MemoryAdd)?;
        lock(&self.memory_requests).push(request.clone());
        Ok(true)
    }

    async fn ingest_file(&self, _upload: IngestUpload) -> Result<bool, BackendError> {
        self.record_call();
        self.check_healthy(Endpoint::IngestFile)?;
        Ok(true)
    }

    async fn ingest_queue(&self) -> Result<Vec<IngestQueueEntry>, BackendError> {
        self.record_call();
        self.check_healthy(Endpoint::IngestQueue)?;
        Ok(lock(&self.queue).clone())
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, BackendError> {
        self.record_call();
        lock(&self.chat_requests).push(request.clone());
        self.check_healthy(Endpoint::Chat)?;
        if self.chat_hangs.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(lock(&self.reply).clone())
    }

    async fn open_chat_stream(
        &self,
        request: &StreamChatRequest,
    ) -> Result<ByteStream, BackendError> {
        self.record_call();
        lock(&self.stream_requests).push(request.clone());
        self.check_healthy(Endpoint::ChatStream)?;

        let script = lock(&self.script).clone();
        let stream = match script {
            StreamScript::Chunks(chunks) => stream::iter(chunks.into_iter().map(Ok)).boxed(),
            StreamScript::DropAfter(chunks) => stream::iter(chunks.into_iter().map(Ok))
                .chain(stream::once(async {
                    Err(connection_error(Endpoint::ChatStream))
                }))
                .boxed(),
            StreamScript::Refuse(status) => {
                return Err(BackendError::Status {
                    endpoint: Endpoint::ChatStream,
                    status,
                    body: "refused".to_string(),
                })
            }
            StreamScript::Hang(chunks) => stream::iter(chunks.into_iter().map(Ok))
                .chain(stream::pending())
                .boxed(),
        };
        Ok(stream)
    }
}
