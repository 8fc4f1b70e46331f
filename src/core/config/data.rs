use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Deployment configuration read from `config.toml`.
///
/// Every field is optional; accessors in `defaults.rs` resolve the effective
/// value. Unknown operation names in `paths` are ignored.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Backend base URL (e.g., "http://127.0.0.1:8000")
    pub base_url: Option<String>,
    /// Hard timeout for the reachability probe
    pub probe_timeout_ms: Option<u64>,
    /// How long an OFFLINE verdict suppresses further probes
    pub offline_cooldown_secs: Option<u64>,
    /// Maximum silence between stream frames before an exchange fails
    pub stream_idle_timeout_secs: Option<u64>,
    /// Attach retrieved context to outgoing chat requests
    pub use_retrieval: Option<bool>,
    pub retrieval_k: Option<usize>,
    /// Minimum relevance score for retrieved snippets
    pub retrieval_threshold: Option<f64>,
    /// Characters per chunk when replaying a complete reply
    pub replay_chunk_size: Option<usize>,
    pub replay_delay_ms: Option<u64>,
    /// Characters per chunk for the offline notice
    pub offline_chunk_size: Option<usize>,
    pub offline_delay_ms: Option<u64>,
    /// Directory holding the session and preferences records
    pub data_dir: Option<PathBuf>,
    /// Path overrides keyed by operation name (e.g., chat_stream = "/v2/chat/stream")
    #[serde(default)]
    pub paths: BTreeMap<String, String>,
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
///
/// # Examples
/// - Unix: `/home/user/.config/air4/config.toml` → `~/.config/air4/config.toml`
/// - Windows: paths are displayed unchanged
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
