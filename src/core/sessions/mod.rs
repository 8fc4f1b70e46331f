//! Durable conversation threads.
//!
//! [`SessionStore`] owns every [`ChatSession`] and writes the whole collection
//! through to a [`BlobStore`](crate::core::storage::BlobStore) after each
//! mutation. [`group_sessions`] buckets a listing by recency for display.

mod grouping;
mod io;
mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::message::Message;
use crate::utils::ids::new_id;

pub use grouping::{bucket_for, group_sessions, RecencyBucket, SessionGroup};
pub use io::{decode_sessions, encode_sessions};
pub use store::SessionStore;

pub const DEFAULT_SESSION_TITLE: &str = "New Session";
/// Title of the session created when the store starts out empty.
pub const INITIAL_SESSION_TITLE: &str = "Local Core Online";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(default = "default_title")]
    pub title: String,
    /// Preview of the most recent message.
    #[serde(default)]
    pub last_message: String,
    /// Last activity.
    #[serde(default, with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

fn default_title() -> String {
    DEFAULT_SESSION_TITLE.to_string()
}

impl ChatSession {
    /// A fresh session holding only the seed greeting.
    pub fn seeded(title: &str, model: &str) -> Self {
        Self {
            id: new_id(),
            title: title.to_string(),
            last_message: String::new(),
            timestamp: Utc::now(),
            messages: vec![Message::seed_greeting(model)],
        }
    }

    /// True until the first exchange has been committed.
    pub fn has_only_seed(&self) -> bool {
        self.messages.len() <= 1
    }
}
