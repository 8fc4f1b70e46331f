//! Opaque identifiers for sessions and messages.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

static FALLBACK_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a new opaque identifier.
///
/// Identifiers start with the creation time in milliseconds (hex) so that they
/// sort roughly by creation, followed by 64 random bits. When the OS random
/// source is unavailable a process-local counter keeps them unique.
pub fn new_id() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let mut bytes = [0u8; 8];
    let suffix = match getrandom::fill(&mut bytes) {
        Ok(()) => u64::from_le_bytes(bytes),
        Err(_) => FALLBACK_COUNTER.fetch_add(1, Ordering::Relaxed),
    };
    format!("{millis:x}-{suffix:016x}")
}
