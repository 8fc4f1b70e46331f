//! Base URL plus path-mapping table for the backend operations.
//!
//! Deployments that proxy the backend under different paths override entries
//! in the `[paths]` table of `config.toml` instead of rewriting requests.

use std::collections::BTreeMap;

use crate::core::config::Config;
use crate::utils::url::{construct_api_url, normalize_base_url};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Endpoint {
    Health,
    Sessions,
    SessionClear,
    MemorySearch,
    MemoryAdd,
    IngestFile,
    IngestQueue,
    Chat,
    ChatStream,
}

impl Endpoint {
    pub const ALL: [Endpoint; 9] = [
        Endpoint::Health,
        Endpoint::Sessions,
        Endpoint::SessionClear,
        Endpoint::MemorySearch,
        Endpoint::MemoryAdd,
        Endpoint::IngestFile,
        Endpoint::IngestQueue,
        Endpoint::Chat,
        Endpoint::ChatStream,
    ];

    /// Operation name used as the key in the path-mapping table.
    pub fn key(self) -> &'static str {
        match self {
            Endpoint::Health => "health",
            Endpoint::Sessions => "sessions",
            Endpoint::SessionClear => "session_clear",
            Endpoint::MemorySearch => "memory_search",
            Endpoint::MemoryAdd => "memory_add",
            Endpoint::IngestFile => "ingest_file",
            Endpoint::IngestQueue => "ingest_queue",
            Endpoint::Chat => "chat",
            Endpoint::ChatStream => "chat_stream",
        }
    }

    /// Default path; `{id}` is replaced by the session id.
    pub fn default_path(self) -> &'static str {
        match self {
            Endpoint::Health => "/health",
            Endpoint::Sessions => "/sessions",
            Endpoint::SessionClear => "/sessions/{id}/clear",
            Endpoint::MemorySearch => "/memory/search",
            Endpoint::MemoryAdd => "/memory/add",
            Endpoint::IngestFile => "/ingest/file",
            Endpoint::IngestQueue => "/ingest/queue",
            Endpoint::Chat => "/send3",
            Endpoint::ChatStream => "/chat/stream",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Endpoints {
    base_url: String,
    overrides: BTreeMap<Endpoint, String>,
}

impl Endpoints {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            overrides: BTreeMap::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut endpoints = Self::new(config.base_url());
        for endpoint in Endpoint::ALL {
            if let Some(path) = config.path_override(endpoint.key()) {
                endpoints = endpoints.with_path(endpoint, path);
            }
        }
        endpoints
    }

    pub fn with_path(mut self, endpoint: Endpoint, path: &str) -> Self {
        self.overrides.insert(endpoint, path.trim().to_string());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn path(&self, endpoint: Endpoint) -> &str {
        self.overrides
            .get(&endpoint)
            .map(String::as_str)
            .unwrap_or_else(|| endpoint.default_path())
    }

    pub fn url(&self, endpoint: Endpoint) -> String {
        construct_api_url(&self.base_url, self.path(endpoint))
    }

    /// URL for an endpoint addressed by session id.
    pub fn session_url(&self, endpoint: Endpoint, session_id: &str) -> String {
        let path = self.path(endpoint).replace("{id}", &encode_path_segment(session_id));
        construct_api_url(&self.base_url, &path)
    }
}

fn encode_path_segment(segment: &str) -> String {
    segment
        .bytes()
        .map(|byte| match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (byte as char).to_string()
            }
            other => format!("%{other:02X}"),
        })
        .collect()
}
