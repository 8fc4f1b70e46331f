//! The persisted preferences record (active model, response style, language,
//! ingest chunking profile, auto-titling).
//!
//! The record is stored as JSON and must load from partial or older data: any
//! missing field takes its default, and a blob that cannot be parsed at all is
//! replaced by defaults rather than failing startup.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::storage::{BlobStore, PREFERENCES_KEY};

pub const DEFAULT_MODEL: &str = "Mistral-7B";

/// Models the backend is known to route to.
pub const AVAILABLE_MODELS: &[&str] = &[
    "Mistral-7B",
    "Hermes-7B",
    "LLaMA-3.1-8B",
    "Qwen-2.5-14B",
    "Mixtral-8x7B",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub setup_complete: bool,
    pub user_name: String,
    pub active_model: String,
    pub response_style: String,
    pub language: String,
    pub ingest_mode: String,
    pub auto_title_sessions: bool,
    pub streaming: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            setup_complete: false,
            user_name: String::new(),
            active_model: DEFAULT_MODEL.to_string(),
            response_style: "normal".to_string(),
            language: "auto".to_string(),
            ingest_mode: "smart".to_string(),
            auto_title_sessions: true,
            streaming: true,
        }
    }
}

impl Preferences {
    /// Keys accepted by [`Preferences::set_field`], in display order.
    pub const KEYS: &'static [&'static str] = &[
        "user-name",
        "active-model",
        "response-style",
        "language",
        "ingest-mode",
        "auto-title",
        "streaming",
    ];

    /// Decode a stored blob, falling back to defaults for anything missing.
    pub fn from_json(raw: &str) -> Self {
        match serde_json::from_str(raw) {
            Ok(preferences) => preferences,
            Err(err) => {
                warn!(error = %err, "Stored preferences are unreadable; using defaults");
                Self::default()
            }
        }
    }

    pub fn display_name(&self) -> &str {
        if self.user_name.trim().is_empty() {
            "Operator"
        } else {
            &self.user_name
        }
    }

    pub fn set_field(&mut self, key: &str, value: &str) -> Result<(), String> {
        let value = value.trim();
        match key {
            "user-name" => self.user_name = value.to_string(),
            "active-model" => {
                if value.is_empty() {
                    return Err("active-model cannot be empty".to_string());
                }
                self.active_model = value.to_string();
            }
            "response-style" => self.response_style = non_empty(key, value)?,
            "language" => self.language = non_empty(key, value)?,
            "ingest-mode" => self.ingest_mode = non_empty(key, value)?,
            "auto-title" => self.auto_title_sessions = parse_bool(key, value)?,
            "streaming" => self.streaming = parse_bool(key, value)?,
            _ => {
                return Err(format!(
                    "Unknown preference: {key} (expected one of: {})",
                    Self::KEYS.join(", ")
                ))
            }
        }
        Ok(())
    }

    pub fn get_field(&self, key: &str) -> Option<String> {
        let value = match key {
            "user-name" => self.user_name.clone(),
            "active-model" => self.active_model.clone(),
            "response-style" => self.response_style.clone(),
            "language" => self.language.clone(),
            "ingest-mode" => self.ingest_mode.clone(),
            "auto-title" => format_bool(self.auto_title_sessions).to_string(),
            "streaming" => format_bool(self.streaming).to_string(),
            _ => return None,
        };
        Some(value)
    }
}

fn non_empty(key: &str, value: &str) -> Result<String, String> {
    if value.is_empty() {
        Err(format!("{key} cannot be empty"))
    } else {
        Ok(value.to_lowercase())
    }
}

/// Accepts: on/off, true/false, yes/no (case-insensitive).
fn parse_bool(key: &str, input: &str) -> Result<bool, String> {
    match input.to_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        _ => Err(format!("{key} expects on/off, got: {input}")),
    }
}

fn format_bool(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

/// Owns the live preferences record and writes it through to storage.
///
/// A failed write is logged and retried on the next update; readers always
/// see the in-memory value.
pub struct PreferencesStore {
    blobs: Arc<dyn BlobStore>,
    current: Mutex<Preferences>,
    needs_persist: AtomicBool,
}

impl PreferencesStore {
    pub fn load(blobs: Arc<dyn BlobStore>) -> Self {
        let current = match blobs.load(PREFERENCES_KEY) {
            Ok(Some(raw)) => Preferences::from_json(&raw),
            Ok(None) => Preferences::default(),
            Err(err) => {
                warn!(error = %err, "Failed to read preferences; using defaults");
                Preferences::default()
            }
        };

        Self {
            blobs,
            current: Mutex::new(current),
            needs_persist: AtomicBool::new(false),
        }
    }

    pub fn get(&self) -> Preferences {
        self.lock().clone()
    }

    /// Apply `mutator` and persist. Errors from the mutator leave the record
    /// untouched.
    pub fn update<F, T>(&self, mutator: F) -> Result<T, String>
    where
        F: FnOnce(&mut Preferences) -> Result<T, String>,
    {
        let mut guard = self.lock();
        let mut working = guard.clone();
        let result = mutator(&mut working)?;
        *guard = working;
        self.persist(&guard);
        Ok(result)
    }

    pub fn needs_persist(&self) -> bool {
        self.needs_persist.load(Ordering::SeqCst)
    }

    fn persist(&self, preferences: &Preferences) {
        let outcome = serde_json::to_string(preferences)
            .map_err(|err| err.to_string())
            .and_then(|json| {
                self.blobs
                    .save(PREFERENCES_KEY, &json)
                    .map_err(|err| err.to_string())
            });
        match outcome {
            Ok(()) => self.needs_persist.store(false, Ordering::SeqCst),
            Err(err) => {
                warn!(error = %err, "Failed to persist preferences; will retry on next change");
                self.needs_persist.store(true, Ordering::SeqCst);
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Preferences> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
