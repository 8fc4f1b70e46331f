//! Retrieved context for outgoing chat requests.
//!
//! Retrieval is optional: a failed search yields no context and the exchange
//! goes ahead without it.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::api::SearchHit;
use crate::core::backend::Backend;
use crate::core::message::{MemoryItem, Namespace};
use crate::utils::ids::new_id;

pub const DEFAULT_THRESHOLD: f64 = 0.60;

/// Header placed in front of merged snippets.
const CONTEXT_HEADER: &str = "Relevant context:\n";
const SNIPPET_SEPARATOR: &str = "\n\n---\n";

/// Inputs shorter than this (after trimming) never trigger retrieval.
const MIN_QUERY_CHARS: usize = 5;
const GREETINGS: &[&str] = &["hi", "hello", "hey", "yo", "sup", "qq", "привет", "ку"];
const GREETING_PREFIXES: &[&str] = &["здрав"];

pub struct RetrievalMerger {
    backend: Arc<dyn Backend>,
    threshold: f64,
}

impl RetrievalMerger {
    pub fn new(backend: Arc<dyn Backend>, threshold: f64) -> Self {
        Self { backend, threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Snippet texts for `query`, in backend order after filtering.
    pub async fn fetch(&self, query: &str, k: usize) -> Vec<String> {
        self.fetch_hits(query, k)
            .await
            .into_iter()
            .map(|hit| hit.text)
            .collect()
    }

    /// Like [`fetch`](Self::fetch) but keeps ids, scores and metadata.
    pub async fn fetch_hits(&self, query: &str, k: usize) -> Vec<SearchHit> {
        match self.backend.search_memory(query, k).await {
            Ok(hits) => {
                let kept = filter_hits(hits, self.threshold);
                debug!(count = kept.len(), "Retrieved context");
                kept
            }
            Err(err) => {
                warn!(error = %err, "Memory search failed; continuing without context");
                Vec::new()
            }
        }
    }
}

/// Drop hits below `threshold` (only when they carry a score), blank hits,
/// and hits whose whitespace-normalized text was already seen.
pub fn filter_hits(hits: Vec<SearchHit>, threshold: f64) -> Vec<SearchHit> {
    let mut seen = HashSet::new();
    hits.into_iter()
        .filter(|hit| hit.score.is_none_or(|score| score >= threshold))
        .filter(|hit| {
            let key = normalize_whitespace(&hit.text);
            !key.is_empty() && seen.insert(key)
        })
        .collect()
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Short inputs and greetings carry nothing worth searching for.
pub fn is_trivial_query(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.chars().count() < MIN_QUERY_CHARS {
        return true;
    }
    let lower = trimmed.to_lowercase();
    let first_word = lower
        .split(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
        .next()
        .unwrap_or("");
    GREETINGS.contains(&first_word)
        || GREETING_PREFIXES
            .iter()
            .any(|prefix| first_word.starts_with(prefix))
}

/// The system block sent alongside the user text, or `None` without snippets.
pub fn merge_context(snippets: &[String]) -> Option<String> {
    if snippets.is_empty() {
        return None;
    }
    Some(format!("{CONTEXT_HEADER}{}", snippets.join(SNIPPET_SEPARATOR)))
}

/// Hits as attachable references for the assistant message.
pub fn to_memory_items(hits: &[SearchHit]) -> Vec<MemoryItem> {
    hits.iter()
        .map(|hit| MemoryItem {
            id: hit.id.clone().unwrap_or_else(new_id),
            content: hit.text.clone(),
            namespace: namespace_for(hit.metadata.as_ref()),
            relevance_score: hit.score,
            source: hit
                .metadata
                .as_ref()
                .and_then(|meta| meta.get("source"))
                .and_then(Value::as_str)
                .map(str::to_owned),
        })
        .collect()
}

/// References for one-shot replies, which only report memory ids.
pub fn memory_id_refs(ids: &[String]) -> Vec<MemoryItem> {
    ids.iter()
        .map(|id| MemoryItem {
            id: id.clone(),
            content: format!("Ref: {}...", id.chars().take(8).collect::<String>()),
            namespace: Namespace::Facts,
            relevance_score: None,
            source: None,
        })
        .collect()
}

pub fn namespace_for(metadata: Option<&Value>) -> Namespace {
    let Some(meta) = metadata else {
        return Namespace::Facts;
    };
    let field = |key: &str| meta.get(key).and_then(Value::as_str).unwrap_or("");

    if field("kind") == "file" || field("source") == "file" || meta.get("source_path").is_some() {
        Namespace::Docs
    } else if field("type") == "summary" || field("source") == "summary" {
        Namespace::Sessions
    } else {
        Namespace::Facts
    }
}
