//! The backend HTTP surface as a trait, so the engine can be driven by the
//! real [`HttpBackend`] or by an in-process stand-in.

pub mod endpoints;
pub mod http;
#[cfg(test)]
pub mod testing;

use std::error::Error as StdError;
use std::fmt;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::api::{
    AddMemoryRequest, ChatReply, ChatRequest, HealthResponse, IngestQueueEntry, RemoteSession,
    SearchHit, StreamChatRequest,
};

pub use endpoints::{Endpoint, Endpoints};
pub use http::HttpBackend;

/// Raw body chunks of a streaming response, in receipt order.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, BackendError>>;

/// A file handed to the ingest endpoint.
#[derive(Debug, Clone)]
pub struct IngestUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub tag: String,
    pub mode: String,
}

#[async_trait]
pub trait Backend: Send + Sync {
    async fn health(&self) -> Result<HealthResponse, BackendError>;

    async fn list_sessions(&self) -> Result<Vec<RemoteSession>, BackendError>;

    async fn clear_session(&self, session_id: &str) -> Result<(), BackendError>;

    async fn search_memory(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, BackendError>;

    async fn add_memory(&self, request: &AddMemoryRequest) -> Result<bool, BackendError>;

    async fn ingest_file(&self, upload: IngestUpload) -> Result<bool, BackendError>;

    async fn ingest_queue(&self) -> Result<Vec<IngestQueueEntry>, BackendError>;

    /// One-shot chat: the whole reply in a single response.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, BackendError>;

    /// Open the streaming chat endpoint. A non-2xx status is an error; the
    /// returned stream yields the raw body.
    async fn open_chat_stream(&self, request: &StreamChatRequest)
        -> Result<ByteStream, BackendError>;
}

/// Errors raised while talking to the backend.
#[derive(Debug)]
pub enum BackendError {
    /// The request could not be sent or the body could not be read.
    Request {
        endpoint: Endpoint,
        source: reqwest::Error,
    },

    /// The backend answered with a non-success status.
    Status {
        endpoint: Endpoint,
        status: u16,
        body: String,
    },

    /// The response body was not valid JSON.
    Decode { endpoint: Endpoint, message: String },

    /// No response (or no stream frame) within the allowed time.
    Timeout { endpoint: Endpoint },
}

impl BackendError {
    /// A short, non-technical description suitable for a chat transcript.
    pub fn summary(&self) -> String {
        match self {
            BackendError::Request { .. } => {
                "the connection could not be completed".to_string()
            }
            BackendError::Status { status, .. } => {
                format!("the backend answered with HTTP {status}")
            }
            BackendError::Decode { .. } => "the backend sent an unreadable response".to_string(),
            BackendError::Timeout { .. } => "the backend stopped responding".to_string(),
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Request { endpoint, source } => {
                write!(f, "Request to {} failed: {}", endpoint.key(), source)
            }
            BackendError::Status {
                endpoint,
                status,
                body,
            } => {
                let body = body.trim();
                if body.is_empty() {
                    write!(f, "{} responded with status {}", endpoint.key(), status)
                } else {
                    write!(
                        f,
                        "{} responded with status {}: {}",
                        endpoint.key(),
                        status,
                        body
                    )
                }
            }
            BackendError::Decode { endpoint, message } => {
                write!(f, "Invalid response from {}: {}", endpoint.key(), message)
            }
            BackendError::Timeout { endpoint } => {
                write!(f, "{} timed out", endpoint.key())
            }
        }
    }
}

impl StdError for BackendError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            BackendError::Request { source, .. } => Some(source),
            _ => None,
        }
    }
}
