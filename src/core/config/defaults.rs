use crate::core::config::data::Config;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_OFFLINE_COOLDOWN_SECS: u64 = 10;
pub const DEFAULT_STREAM_IDLE_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_RETRIEVAL_K: usize = 4;
pub const DEFAULT_RETRIEVAL_THRESHOLD: f64 = 0.60;
pub const DEFAULT_REPLAY_CHUNK_SIZE: usize = 5;
pub const DEFAULT_REPLAY_DELAY_MS: u64 = 10;
pub const DEFAULT_OFFLINE_CHUNK_SIZE: usize = 4;
pub const DEFAULT_OFFLINE_DELAY_MS: u64 = 15;

/// Environment variable that overrides `base_url`.
pub const BASE_URL_ENV: &str = "AIR4_BASE_URL";

impl Config {
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn path_override(&self, operation: &str) -> Option<&str> {
        self.paths
            .get(operation)
            .map(String::as_str)
            .filter(|path| !path.trim().is_empty())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms.unwrap_or(DEFAULT_PROBE_TIMEOUT_MS))
    }

    pub fn offline_cooldown(&self) -> Duration {
        Duration::from_secs(
            self.offline_cooldown_secs
                .unwrap_or(DEFAULT_OFFLINE_COOLDOWN_SECS),
        )
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(
            self.stream_idle_timeout_secs
                .unwrap_or(DEFAULT_STREAM_IDLE_TIMEOUT_SECS)
                .max(1),
        )
    }

    pub fn use_retrieval(&self) -> bool {
        self.use_retrieval.unwrap_or(true)
    }

    pub fn retrieval_k(&self) -> usize {
        self.retrieval_k.unwrap_or(DEFAULT_RETRIEVAL_K).max(1)
    }

    pub fn retrieval_threshold(&self) -> f64 {
        self.retrieval_threshold
            .filter(|value| value.is_finite())
            .unwrap_or(DEFAULT_RETRIEVAL_THRESHOLD)
    }

    pub fn replay_chunk_size(&self) -> usize {
        self.replay_chunk_size
            .unwrap_or(DEFAULT_REPLAY_CHUNK_SIZE)
            .max(1)
    }

    pub fn replay_delay(&self) -> Duration {
        Duration::from_millis(self.replay_delay_ms.unwrap_or(DEFAULT_REPLAY_DELAY_MS))
    }

    pub fn offline_chunk_size(&self) -> usize {
        self.offline_chunk_size
            .unwrap_or(DEFAULT_OFFLINE_CHUNK_SIZE)
            .max(1)
    }

    pub fn offline_delay(&self) -> Duration {
        Duration::from_millis(self.offline_delay_ms.unwrap_or(DEFAULT_OFFLINE_DELAY_MS))
    }

    /// Apply environment overrides on top of the file contents.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                self.base_url = Some(url);
            }
        }
        self
    }
}
