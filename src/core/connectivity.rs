//! Backend reachability tracking.
//!
//! State moves `Unknown -> Online` on any successful backend call and to
//! `Offline` on any failure. `Offline` is sticky for a cooldown window so an
//! outage does not turn every caller into a network attempt; after the window
//! the next caller probes again.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::api::HealthResponse;
use crate::core::backend::{Backend, BackendError, Endpoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reachability {
    #[default]
    Unknown,
    Online,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConnectivityState {
    pub reachability: Reachability,
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl ConnectivityState {
    pub fn is_offline(&self) -> bool {
        self.reachability == Reachability::Offline
    }
}

/// Summary shown by `air4 status`.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemStatus {
    pub model_name: String,
    pub storage: String,
    pub ingest_queue_len: usize,
    pub is_offline: bool,
}

impl SystemStatus {
    fn offline() -> Self {
        Self {
            model_name: "Demo / Offline".to_string(),
            storage: "Offline Mode".to_string(),
            ingest_queue_len: 0,
            is_offline: true,
        }
    }
}

#[derive(Default)]
struct MonitorState {
    public: ConnectivityState,
    checked_at: Option<Instant>,
}

pub struct ConnectivityMonitor {
    backend: Arc<dyn Backend>,
    probe_timeout: Duration,
    cooldown: Duration,
    state: Mutex<MonitorState>,
}

impl ConnectivityMonitor {
    pub fn new(backend: Arc<dyn Backend>, probe_timeout: Duration, cooldown: Duration) -> Self {
        Self {
            backend,
            probe_timeout,
            cooldown,
            state: Mutex::new(MonitorState::default()),
        }
    }

    pub fn state(&self) -> ConnectivityState {
        self.lock().public.clone()
    }

    pub fn is_offline(&self) -> bool {
        self.lock().public.is_offline()
    }

    /// True while the backend is known to be offline and the cooldown since
    /// the last check has not yet elapsed.
    pub fn should_skip_probe(&self) -> bool {
        let state = self.lock();
        state.public.is_offline()
            && state
                .checked_at
                .is_some_and(|checked_at| checked_at.elapsed() < self.cooldown)
    }

    /// Hit the health endpoint with a hard timeout and record the outcome.
    pub async fn probe(&self) -> ConnectivityState {
        let _ = self.probe_health().await;
        self.state()
    }

    /// Record a successful call made anywhere in the system.
    pub fn mark_online(&self) {
        self.transition(Reachability::Online);
    }

    /// Record a failed call made anywhere in the system.
    pub fn mark_offline(&self) {
        self.transition(Reachability::Offline);
    }

    /// Probe plus ingest queue length. During cooldown the cached offline
    /// summary is returned without touching the network.
    pub async fn status(&self) -> SystemStatus {
        if self.should_skip_probe() {
            return SystemStatus::offline();
        }

        let health = match self.probe_health().await {
            Ok(health) => health,
            Err(_) => return SystemStatus::offline(),
        };

        let ingest_queue_len = match self.backend.ingest_queue().await {
            Ok(queue) => queue.len(),
            Err(err) => {
                debug!(error = %err, "Ingest queue unavailable");
                0
            }
        };

        SystemStatus {
            model_name: health
                .model
                .clone()
                .unwrap_or_else(|| "Unknown".to_string()),
            storage: health.storage_label().to_string(),
            ingest_queue_len,
            is_offline: false,
        }
    }

    async fn probe_health(&self) -> Result<HealthResponse, BackendError> {
        let outcome = match tokio::time::timeout(self.probe_timeout, self.backend.health()).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout {
                endpoint: Endpoint::Health,
            }),
        };

        match &outcome {
            Ok(_) => self.mark_online(),
            Err(err) => {
                debug!(error = %err, "Health probe failed");
                self.mark_offline();
            }
        }
        outcome
    }

    fn transition(&self, next: Reachability) {
        let mut state = self.lock();
        let previous = state.public.reachability;
        state.public.reachability = next;
        state.public.last_checked_at = Some(Utc::now());
        state.checked_at = Some(Instant::now());
        drop(state);

        if previous != next {
            match next {
                Reachability::Offline => info!("Backend unreachable; switching to offline mode"),
                Reachability::Online if previous == Reachability::Offline => {
                    info!("Backend reachable again")
                }
                _ => {}
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MonitorState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
