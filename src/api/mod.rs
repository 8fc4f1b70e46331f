//! Request and response payloads for the backend HTTP surface.
//!
//! The backend is loose about response shapes: lists arrive under several
//! keys or bare, and text fields have several historical names. Every such
//! fallback is declared once here in a `decode_*`/`from_value` function; call
//! sites never probe raw JSON themselves.

use serde::Serialize;
use serde_json::Value;

/// Keys a search response may carry its hit list under, in priority order.
const SEARCH_LIST_KEYS: &[&str] = &["results", "data", "items"];
/// Keys a search hit may carry its text under, in priority order.
const HIT_TEXT_KEYS: &[&str] = &["text", "chunk", "content", "value"];
/// Keys a one-shot chat response may carry its reply under.
const REPLY_TEXT_KEYS: &[&str] = &["reply", "text", "message", "content"];
/// Keys the health payload may report the model under.
const HEALTH_MODEL_KEYS: &[&str] = &["model", "llm", "LLM"];

/// Body of `POST /chat/stream`.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct StreamChatRequest {
    pub text: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Retrieved context merged into a system block.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

/// Body of the one-shot `POST /send3` chat call.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub text: String,
    pub session_id: String,
    pub style: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_override: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatReply {
    pub reply: String,
    pub session_id: Option<String>,
    pub memory_ids: Vec<String>,
}

impl ChatReply {
    pub fn from_value(value: &Value) -> Self {
        let reply = match value {
            Value::String(text) => text.clone(),
            _ => first_str(value, REPLY_TEXT_KEYS).unwrap_or_default(),
        };
        Self {
            reply,
            session_id: value
                .get("session_id")
                .and_then(Value::as_str)
                .map(str::to_owned),
            memory_ids: value
                .get("memory_ids")
                .and_then(Value::as_array)
                .map(|ids| ids.iter().filter_map(id_string).collect())
                .unwrap_or_default(),
        }
    }
}

/// Payload of `GET /health`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HealthResponse {
    pub model: Option<String>,
    pub memory_backend: Option<String>,
    /// Backend start time in epoch seconds.
    pub ts: Option<f64>,
}

impl HealthResponse {
    pub fn from_value(value: &Value) -> Self {
        Self {
            model: first_str(value, HEALTH_MODEL_KEYS),
            memory_backend: first_str(value, &["memory_backend", "memory"]),
            ts: value.get("ts").and_then(Value::as_f64),
        }
    }

    pub fn storage_label(&self) -> &'static str {
        match self.memory_backend.as_deref() {
            Some("chroma") => "ChromaDB (Vector)",
            _ => "Fallback (RAM)",
        }
    }
}

/// A session record as listed by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSession {
    pub id: String,
    pub title: String,
    /// Last update in epoch seconds, when reported.
    pub updated_at: Option<i64>,
}

/// Decode `GET /sessions`: either `{ "sessions": [...] }` or a bare array.
/// Records without an id are skipped.
pub fn decode_sessions(value: &Value) -> Vec<RemoteSession> {
    list_under(value, &["sessions"])
        .iter()
        .filter_map(|entry| {
            let id = entry.get("id").and_then(id_string)?;
            Some(RemoteSession {
                id,
                title: first_str(entry, &["title"]).unwrap_or_else(|| "New session".to_string()),
                updated_at: ["timestamp", "updated_at"]
                    .iter()
                    .find_map(|key| entry.get(*key).and_then(Value::as_i64)),
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: Option<String>,
    pub text: String,
    /// Present only when the backend reported a finite numeric score.
    pub score: Option<f64>,
    pub metadata: Option<Value>,
}

/// Decode `GET /memory/search`: hits under `results`, `data` or `items` (or a
/// bare array); text under `text`, `chunk`, `content` or `value`.
pub fn decode_search_hits(value: &Value) -> Vec<SearchHit> {
    list_under(value, SEARCH_LIST_KEYS)
        .iter()
        .map(|entry| SearchHit {
            id: entry.get("id").and_then(id_string),
            text: match entry {
                Value::String(text) => text.clone(),
                _ => first_str(entry, HIT_TEXT_KEYS).unwrap_or_default(),
            },
            score: entry.get("score").and_then(numeric_score),
            metadata: entry.get("metadata").filter(|meta| meta.is_object()).cloned(),
        })
        .collect()
}

/// Body of `POST /memory/add`.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AddMemoryRequest {
    pub text: String,
    pub metadata: MemoryMetadata,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MemoryMetadata {
    pub kind: String,
    pub source: String,
    /// Epoch seconds.
    pub ts: i64,
}

/// Decode a `{ "ok": bool }` acknowledgement. A bare 2xx with no body counts
/// as success.
pub fn decode_ok(value: &Value) -> bool {
    match value {
        Value::Null => true,
        _ => value.get("ok").and_then(Value::as_bool).unwrap_or(false),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestQueueEntry {
    pub id: String,
    pub file: String,
    pub status: String,
    /// 0-100
    pub progress: u8,
}

/// Decode `GET /ingest/queue`. The backend only reports files it still holds,
/// so entries without a status are `processing`, and progress defaults to 50.
pub fn decode_ingest_queue(value: &Value) -> Vec<IngestQueueEntry> {
    if value.get("ok").and_then(Value::as_bool) == Some(false) {
        return Vec::new();
    }
    list_under(value, &["queue"])
        .iter()
        .enumerate()
        .map(|(index, entry)| IngestQueueEntry {
            id: ["digest", "id"]
                .iter()
                .find_map(|key| entry.get(*key).and_then(id_string))
                .unwrap_or_else(|| format!("queued-{index}")),
            file: first_str(entry, &["file", "filename"]).unwrap_or_else(|| "Unknown".to_string()),
            status: first_str(entry, &["status"]).unwrap_or_else(|| "processing".to_string()),
            progress: entry
                .get("progress")
                .and_then(Value::as_f64)
                .map(|progress| progress.clamp(0.0, 100.0) as u8)
                .unwrap_or(50),
        })
        .collect()
}

fn list_under<'a>(value: &'a Value, keys: &[&str]) -> &'a [Value] {
    if let Value::Array(items) = value {
        return items;
    }
    keys.iter()
        .find_map(|key| value.get(*key).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn first_str(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .find(|text| !text.is_empty())
        .map(str::to_owned)
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

fn numeric_score(value: &Value) -> Option<f64> {
    let score = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    score.is_finite().then_some(score)
}
