//! One chat exchange at a time per session: route, retrieve, stream, commit.
//!
//! [`StreamingChatClient::send`] spawns the exchange as a task and hands back
//! a [`ChatStream`] of [`ChatEvent`]s. The task walks
//! `Sending -> Streaming -> Committed | Failed`; only a committed exchange
//! touches the session store. Dropping the stream cancels the task.

mod replay;
#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::stream::{Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};
use unicode_segmentation::UnicodeSegmentation;

use crate::api::{ChatRequest, StreamChatRequest};
use crate::core::backend::{Backend, BackendError, Endpoint};
use crate::core::classifier::{guess_domain, RULE_CONFIDENCE};
use crate::core::config::Config;
use crate::core::connectivity::ConnectivityMonitor;
use crate::core::frame_parser::{Frame, StreamFrameParser};
use crate::core::message::{Domain, MemoryItem, Message, RouterDecision};
use crate::core::preferences::{Preferences, PreferencesStore};
use crate::core::retrieval::{
    is_trivial_query, memory_id_refs, merge_context, to_memory_items, RetrievalMerger,
};
use crate::core::sessions::{ChatSession, SessionStore};
use crate::utils::url::host_label;

pub use replay::{replay_chunks, ReplayPacing};

/// Model label reported for replies synthesized while offline.
pub const OFFLINE_MODEL: &str = "Offline-Demo";
/// Committed in place of a reply that carried no content.
pub const EMPTY_REPLY_PLACEHOLDER: &str = "[No response payload]";
/// Auto-titles keep at most this many characters of the first user message.
pub const TITLE_BUDGET: usize = 30;

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// Routing metadata, always first.
    Decision(RouterDecision),
    /// Attached context, at most once.
    Context(Vec<MemoryItem>),
    /// A piece of reply text.
    Chunk(String),
    /// Always last.
    Finished(ExchangeOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    Committed,
    /// The reason is a short, user-facing summary.
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangePhase {
    /// The exchange task has not started yet.
    Idle,
    Sending,
    Streaming,
    Committed,
    Failed,
}

#[derive(Debug)]
pub enum SendError {
    SessionNotFound(String),
    /// The session already has an exchange in flight.
    Busy(String),
    EmptyMessage,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::SessionNotFound(id) => write!(f, "Session not found: {id}"),
            SendError::Busy(id) => {
                write!(f, "Session {id} is still waiting for the previous reply")
            }
            SendError::EmptyMessage => write!(f, "Message is empty"),
        }
    }
}

impl std::error::Error for SendError {}

/// Knobs taken from the deployment configuration.
#[derive(Debug, Clone)]
pub struct ExchangeSettings {
    pub use_retrieval: bool,
    pub retrieval_k: usize,
    /// Longest wait for the next piece of a streamed reply.
    pub idle_timeout: Duration,
    /// Pacing for replies that arrive whole (one-shot chat, diagnostics).
    pub replay: ReplayPacing,
    /// Pacing for the offline notice.
    pub offline: ReplayPacing,
    pub offline_cooldown: Duration,
    /// `host[:port]` of the backend, for user-facing notices.
    pub backend_host: String,
}

impl ExchangeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            use_retrieval: config.use_retrieval(),
            retrieval_k: config.retrieval_k(),
            idle_timeout: config.stream_idle_timeout(),
            replay: ReplayPacing::new(config.replay_chunk_size(), config.replay_delay()),
            offline: ReplayPacing::new(config.offline_chunk_size(), config.offline_delay()),
            offline_cooldown: config.offline_cooldown(),
            backend_host: host_label(config.base_url()),
        }
    }
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Title derived from the first user message: at most [`TITLE_BUDGET`]
/// grapheme clusters, with `...` appended when anything was cut.
pub fn derive_title(text: &str) -> String {
    let text = text.trim();
    let mut graphemes = text.graphemes(true);
    let head: String = graphemes.by_ref().take(TITLE_BUDGET).collect();
    if graphemes.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

pub struct StreamingChatClient {
    backend: Arc<dyn Backend>,
    monitor: Arc<ConnectivityMonitor>,
    sessions: Arc<SessionStore>,
    preferences: Arc<PreferencesStore>,
    retrieval: Arc<RetrievalMerger>,
    settings: ExchangeSettings,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl StreamingChatClient {
    pub fn new(
        backend: Arc<dyn Backend>,
        monitor: Arc<ConnectivityMonitor>,
        sessions: Arc<SessionStore>,
        preferences: Arc<PreferencesStore>,
        retrieval: Arc<RetrievalMerger>,
        settings: ExchangeSettings,
    ) -> Self {
        Self {
            backend,
            monitor,
            sessions,
            preferences,
            retrieval,
            settings,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn settings(&self) -> &ExchangeSettings {
        &self.settings
    }

    /// True while an exchange for `session_id` is running.
    pub fn is_busy(&self, session_id: &str) -> bool {
        lock(&self.in_flight).contains(session_id)
    }

    /// Start an exchange. Must be called from within a Tokio runtime.
    pub fn send(&self, session_id: &str, text: &str) -> Result<ChatStream, SendError> {
        if text.trim().is_empty() {
            return Err(SendError::EmptyMessage);
        }
        let session = self
            .sessions
            .get(session_id)
            .ok_or_else(|| SendError::SessionNotFound(session_id.to_string()))?;
        let guard = InFlightGuard::acquire(&self.in_flight, session_id)
            .ok_or_else(|| SendError::Busy(session_id.to_string()))?;

        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (phase_tx, phase_rx) = watch::channel(ExchangePhase::Idle);
        let cancel_token = CancellationToken::new();

        let exchange = Exchange {
            backend: Arc::clone(&self.backend),
            monitor: Arc::clone(&self.monitor),
            sessions: Arc::clone(&self.sessions),
            retrieval: Arc::clone(&self.retrieval),
            settings: self.settings.clone(),
            preferences: self.preferences.get(),
            session,
            text: text.to_string(),
            events: events_tx,
            phase: phase_tx,
            _guard: guard,
        };

        let task_token = cancel_token.clone();
        let task_session = session_id.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = exchange.run() => {}
                _ = task_token.cancelled() => {
                    debug!(session_id = %task_session, "Exchange cancelled; nothing committed");
                }
            }
        });

        Ok(ChatStream {
            session_id: session_id.to_string(),
            events: events_rx,
            phase: phase_rx,
            cancel_token: cancel_token.clone(),
            _drop_guard: cancel_token.drop_guard(),
        })
    }
}

/// Events of one exchange, in order. Dropping it abandons the exchange.
pub struct ChatStream {
    session_id: String,
    events: mpsc::Receiver<ChatEvent>,
    phase: watch::Receiver<ExchangePhase>,
    cancel_token: CancellationToken,
    _drop_guard: DropGuard,
}

impl ChatStream {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn next_event(&mut self) -> Option<ChatEvent> {
        self.events.recv().await
    }

    pub fn phase(&self) -> ExchangePhase {
        *self.phase.borrow()
    }

    /// Abort the exchange. Nothing is committed.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Drain the remaining events, returning the reply text and the outcome.
    /// An abandoned exchange yields a `Failed` outcome.
    pub async fn collect_reply(mut self) -> (String, ExchangeOutcome) {
        let mut reply = String::new();
        while let Some(event) = self.next_event().await {
            match event {
                ChatEvent::Chunk(chunk) => reply.push_str(&chunk),
                ChatEvent::Finished(outcome) => return (reply, outcome),
                ChatEvent::Decision(_) | ChatEvent::Context(_) => {}
            }
        }
        (reply, ExchangeOutcome::Failed("cancelled".to_string()))
    }
}

impl Stream for ChatStream {
    type Item = ChatEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Marks a session busy for as long as the exchange task holds it.
struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
    session_id: String,
}

impl InFlightGuard {
    fn acquire(in_flight: &Arc<Mutex<HashSet<String>>>, session_id: &str) -> Option<Self> {
        if !lock(in_flight).insert(session_id.to_string()) {
            return None;
        }
        Some(Self {
            in_flight: Arc::clone(in_flight),
            session_id: session_id.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.session_id);
    }
}

enum ExchangeError {
    Backend(BackendError),
    /// The consumer went away.
    Abandoned,
}

impl From<BackendError> for ExchangeError {
    fn from(err: BackendError) -> Self {
        ExchangeError::Backend(err)
    }
}

struct Reply {
    text: String,
    context: Vec<MemoryItem>,
}

struct Exchange {
    backend: Arc<dyn Backend>,
    monitor: Arc<ConnectivityMonitor>,
    sessions: Arc<SessionStore>,
    retrieval: Arc<RetrievalMerger>,
    settings: ExchangeSettings,
    preferences: Preferences,
    /// The session as it was when the exchange started.
    session: ChatSession,
    text: String,
    events: mpsc::Sender<ChatEvent>,
    phase: watch::Sender<ExchangePhase>,
    _guard: InFlightGuard,
}

impl Exchange {
    async fn run(self) {
        match self.drive().await {
            Ok(()) => {}
            Err(ExchangeError::Abandoned) => {
                debug!(session_id = %self.session.id, "Consumer went away; nothing committed");
            }
            Err(ExchangeError::Backend(err)) => self.fail(err).await,
        }
    }

    async fn drive(&self) -> Result<(), ExchangeError> {
        self.set_phase(ExchangePhase::Sending);
        let domain = guess_domain(&self.text);
        let offline = self.monitor.should_skip_probe();
        let model = if offline {
            OFFLINE_MODEL.to_string()
        } else {
            self.preferences.active_model.clone()
        };

        self.emit(ChatEvent::Decision(RouterDecision {
            domain,
            model: model.clone(),
            confidence: RULE_CONFIDENCE,
            reason: format!(
                "Routed via local rules (Style: {})",
                self.preferences.response_style
            ),
        }))
        .await?;

        if offline {
            return self.reply_offline(domain).await;
        }

        let hits = if self.settings.use_retrieval && !is_trivial_query(&self.text) {
            self.retrieval
                .fetch_hits(&self.text, self.settings.retrieval_k)
                .await
        } else {
            Vec::new()
        };
        let context = to_memory_items(&hits);
        let snippets: Vec<String> = hits.into_iter().map(|hit| hit.text).collect();
        let system = merge_context(&snippets);

        let reply = if self.preferences.streaming {
            self.stream_reply(system, context).await?
        } else {
            self.one_shot_reply(system, context).await?
        };

        self.monitor.mark_online();
        let text = if reply.text.is_empty() {
            self.emit(ChatEvent::Chunk(EMPTY_REPLY_PLACEHOLDER.to_string()))
                .await?;
            EMPTY_REPLY_PLACEHOLDER.to_string()
        } else {
            reply.text
        };

        let assistant = Message::assistant(text)
            .with_model(model)
            .with_domain(domain)
            .with_context(reply.context);
        self.commit(assistant).await
    }

    async fn stream_reply(
        &self,
        system: Option<String>,
        context: Vec<MemoryItem>,
    ) -> Result<Reply, ExchangeError> {
        self.announce_context(&context).await?;
        let request = StreamChatRequest {
            text: self.text.clone(),
            session_id: self.session.id.clone(),
            style: Some(self.preferences.response_style.clone()),
            model: Some(self.preferences.active_model.clone()),
            system,
        };

        let mut stream = self
            .within_idle_timeout(Endpoint::ChatStream, self.backend.open_chat_stream(&request))
            .await??;
        self.set_phase(ExchangePhase::Streaming);

        let mut parser = StreamFrameParser::new();
        let mut text = String::new();
        while !parser.is_finished() {
            let Some(chunk) = self
                .within_idle_timeout(Endpoint::ChatStream, stream.next())
                .await?
            else {
                break;
            };
            for frame in parser.push(&chunk?) {
                match frame {
                    Frame::Content(delta) => {
                        text.push_str(&delta);
                        self.emit(ChatEvent::Chunk(delta)).await?;
                    }
                    Frame::Error(detail) => {
                        warn!(session_id = %self.session.id, detail = %detail, "Backend reported a stream error");
                    }
                    Frame::Done => {}
                }
            }
        }
        parser.finish();

        Ok(Reply { text, context })
    }

    /// The retrieved items come first, then any memory the backend reports
    /// that is not already among them.
    async fn one_shot_reply(
        &self,
        system: Option<String>,
        mut context: Vec<MemoryItem>,
    ) -> Result<Reply, ExchangeError> {
        let request = ChatRequest {
            text: self.text.clone(),
            session_id: self.session.id.clone(),
            style: self.preferences.response_style.clone(),
            model_override: Some(self.preferences.active_model.clone()),
            system,
        };
        let response = self
            .within_idle_timeout(Endpoint::Chat, self.backend.chat(&request))
            .await??;
        self.set_phase(ExchangePhase::Streaming);

        for reference in memory_id_refs(&response.memory_ids) {
            if !context.iter().any(|item| item.id == reference.id) {
                context.push(reference);
            }
        }
        self.announce_context(&context).await?;
        self.replay(&response.reply, self.settings.replay).await?;

        Ok(Reply {
            text: response.reply,
            context,
        })
    }

    /// Offline degradation: a deterministic notice, paced like a real stream
    /// and committed like a real reply.
    async fn reply_offline(&self, domain: Domain) -> Result<(), ExchangeError> {
        info!(session_id = %self.session.id, "Backend offline; answering locally");
        self.set_phase(ExchangePhase::Streaming);

        let notice = format!(
            "[{} DEMO MODE - {}]\n\nI am currently unable to reach the local backend ({}). \
             I am operating in Offline Demo Mode. Your messages are kept in this session, \
             but I cannot process real data or retrieve memories until the connection is restored.",
            self.preferences.active_model,
            self.preferences.response_style.to_uppercase(),
            self.settings.backend_host,
        );
        self.replay(&notice, self.settings.offline).await?;

        let assistant = Message::assistant(notice)
            .with_model(OFFLINE_MODEL)
            .with_domain(domain);
        self.commit(assistant).await
    }

    async fn fail(&self, err: BackendError) {
        warn!(session_id = %self.session.id, error = %err, "Exchange failed");
        self.monitor.mark_offline();

        let diagnostic = format!(
            "**CORE OFFLINE**\n\nConnection to `{}` failed: {}. \
             Switched to offline mode; the next attempt in {}s will try again.\n\n\
             Please check that the backend server is running.",
            self.settings.backend_host,
            err.summary(),
            self.settings.offline_cooldown.as_secs(),
        );
        if self.replay(&diagnostic, self.settings.replay).await.is_err() {
            return;
        }
        self.set_phase(ExchangePhase::Failed);
        let _ = self
            .emit(ChatEvent::Finished(ExchangeOutcome::Failed(err.summary())))
            .await;
    }

    /// Append the user message and `assistant` to the session as it is now.
    async fn commit(&self, assistant: Message) -> Result<(), ExchangeError> {
        let title = (self.preferences.auto_title_sessions && self.session.has_only_seed())
            .then(|| derive_title(&self.text));

        let mut messages = self
            .sessions
            .get(&self.session.id)
            .map(|current| current.messages)
            .unwrap_or_else(|| self.session.messages.clone());
        let last_message = assistant.content.clone();
        messages.push(Message::user(self.text.clone()));
        messages.push(assistant);

        if !self
            .sessions
            .commit(&self.session.id, messages, last_message, title)
        {
            warn!(session_id = %self.session.id, "Session disappeared before commit");
        }
        self.set_phase(ExchangePhase::Committed);
        self.emit(ChatEvent::Finished(ExchangeOutcome::Committed))
            .await
    }

    async fn replay(&self, text: &str, pacing: ReplayPacing) -> Result<(), ExchangeError> {
        for chunk in replay_chunks(text, pacing.chunk_size) {
            self.emit(ChatEvent::Chunk(chunk)).await?;
            if !pacing.delay.is_zero() {
                tokio::time::sleep(pacing.delay).await;
            }
        }
        Ok(())
    }

    async fn announce_context(&self, context: &[MemoryItem]) -> Result<(), ExchangeError> {
        if context.is_empty() {
            return Ok(());
        }
        self.emit(ChatEvent::Context(context.to_vec())).await
    }

    async fn within_idle_timeout<F: std::future::Future>(
        &self,
        endpoint: Endpoint,
        future: F,
    ) -> Result<F::Output, ExchangeError> {
        tokio::time::timeout(self.settings.idle_timeout, future)
            .await
            .map_err(|_| ExchangeError::Backend(BackendError::Timeout { endpoint }))
    }

    async fn emit(&self, event: ChatEvent) -> Result<(), ExchangeError> {
        self.events
            .send(event)
            .await
            .map_err(|_| ExchangeError::Abandoned)
    }

    fn set_phase(&self, phase: ExchangePhase) {
        self.phase.send_replace(phase);
    }
}
