use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use tracing::debug;

use super::{Backend, BackendError, ByteStream, Endpoint, Endpoints, IngestUpload};
use crate::api::{
    decode_ingest_queue, decode_ok, decode_search_hits, decode_sessions, AddMemoryRequest,
    ChatReply, ChatRequest, HealthResponse, IngestQueueEntry, RemoteSession, SearchHit,
    StreamChatRequest,
};

/// [`Backend`] over HTTP with `reqwest`.
///
/// Only the connectivity probe carries a timeout (applied by the caller); the
/// client itself imposes none so long streams are not cut off.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    endpoints: Endpoints,
}

impl HttpBackend {
    pub fn new(client: Client, endpoints: Endpoints) -> Self {
        Self { client, endpoints }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    async fn send(
        &self,
        endpoint: Endpoint,
        request: RequestBuilder,
    ) -> Result<Response, BackendError> {
        let response = request
            .send()
            .await
            .map_err(|source| BackendError::Request { endpoint, source })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(BackendError::Status {
                endpoint,
                status,
                body,
            });
        }
        Ok(response)
    }

    /// Send and decode a JSON body. An empty body decodes as `null`.
    async fn send_json(
        &self,
        endpoint: Endpoint,
        request: RequestBuilder,
    ) -> Result<Value, BackendError> {
        let response = self.send(endpoint, request).await?;
        let body = response
            .text()
            .await
            .map_err(|source| BackendError::Request { endpoint, source })?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|err| BackendError::Decode {
            endpoint,
            message: err.to_string(),
        })
    }

    fn get(&self, endpoint: Endpoint) -> RequestBuilder {
        self.client.get(self.endpoints.url(endpoint))
    }

    fn post(&self, endpoint: Endpoint) -> RequestBuilder {
        self.client
            .post(self.endpoints.url(endpoint))
            .header("Content-Type", "application/json")
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn health(&self) -> Result<HealthResponse, BackendError> {
        let value = self.send_json(Endpoint::Health, self.get(Endpoint::Health)).await?;
        Ok(HealthResponse::from_value(&value))
    }

    async fn list_sessions(&self) -> Result<Vec<RemoteSession>, BackendError> {
        let value = self
            .send_json(Endpoint::Sessions, self.get(Endpoint::Sessions))
            .await?;
        Ok(decode_sessions(&value))
    }

    async fn clear_session(&self, session_id: &str) -> Result<(), BackendError> {
        let url = self
            .endpoints
            .session_url(Endpoint::SessionClear, session_id);
        self.send(Endpoint::SessionClear, self.client.post(url))
            .await?;
        Ok(())
    }

    async fn search_memory(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, BackendError> {
        let request = self
            .get(Endpoint::MemorySearch)
            .query(&[("q", query), ("k", k.to_string().as_str())]);
        let value = self.send_json(Endpoint::MemorySearch, request).await?;
        Ok(decode_search_hits(&value))
    }

    async fn add_memory(&self, request: &AddMemoryRequest) -> Result<bool, BackendError> {
        let value = self
            .send_json(Endpoint::MemoryAdd, self.post(Endpoint::MemoryAdd).json(request))
            .await?;
        Ok(decode_ok(&value))
    }

    async fn ingest_file(&self, upload: IngestUpload) -> Result<bool, BackendError> {
        let IngestUpload {
            file_name,
            bytes,
            tag,
            mode,
        } = upload;
        debug!(file = %file_name, size = bytes.len(), "Uploading file for ingest");

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new().part("file", part);
        let request = self
            .client
            .post(self.endpoints.url(Endpoint::IngestFile))
            .query(&[("tag", tag.as_str()), ("mode", mode.as_str())])
            .multipart(form);
        let value = self.send_json(Endpoint::IngestFile, request).await?;
        Ok(decode_ok(&value))
    }

    async fn ingest_queue(&self) -> Result<Vec<IngestQueueEntry>, BackendError> {
        let value = self
            .send_json(Endpoint::IngestQueue, self.get(Endpoint::IngestQueue))
            .await?;
        Ok(decode_ingest_queue(&value))
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, BackendError> {
        let value = self
            .send_json(Endpoint::Chat, self.post(Endpoint::Chat).json(request))
            .await?;
        Ok(ChatReply::from_value(&value))
    }

    async fn open_chat_stream(
        &self,
        request: &StreamChatRequest,
    ) -> Result<ByteStream, BackendError> {
        let http_request = self
            .post(Endpoint::ChatStream)
            .header("Accept", "text/event-stream")
            .json(request);
        let response = self.send(Endpoint::ChatStream, http_request).await?;

        let stream = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|source| BackendError::Request {
                    endpoint: Endpoint::ChatStream,
                    source,
                })
        });
        Ok(stream.boxed())
    }
}
