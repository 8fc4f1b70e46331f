use serde_json::Value;
use tracing::warn;

use super::ChatSession;
use crate::core::message::Message;
use crate::core::preferences::DEFAULT_MODEL;

/// Decode the stored session collection.
///
/// Records are decoded one at a time so a single damaged entry does not take
/// the rest down with it. A session stored without messages gets its seed
/// greeting back. An unreadable blob yields an empty collection.
pub fn decode_sessions(raw: &str) -> Vec<ChatSession> {
    read_sessions(raw).0
}

/// Like [`decode_sessions`], also reporting whether anything was dropped.
pub(super) fn read_sessions(raw: &str) -> (Vec<ChatSession>, bool) {
    let entries = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(entries)) => entries,
        Ok(_) => {
            warn!("Stored sessions are not a list; starting empty");
            return (Vec::new(), false);
        }
        Err(err) => {
            warn!(error = %err, "Stored sessions are unreadable; starting empty");
            return (Vec::new(), false);
        }
    };

    let total = entries.len();
    let sessions: Vec<ChatSession> = entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<ChatSession>(entry) {
            Ok(session) => Some(repair(session)),
            Err(err) => {
                warn!(error = %err, "Skipping unreadable session record");
                None
            }
        })
        .collect();
    let intact = sessions.len() == total;
    (sessions, intact)
}

pub fn encode_sessions(sessions: &[ChatSession]) -> Result<String, serde_json::Error> {
    serde_json::to_string(sessions)
}

fn repair(mut session: ChatSession) -> ChatSession {
    if session.messages.is_empty() {
        session.messages.push(Message::seed_greeting(DEFAULT_MODEL));
    }
    session
}
