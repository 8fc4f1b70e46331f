//! Durable key/value storage for the client's JSON records.
//!
//! Two records live here under fixed keys: the session collection and the
//! preferences record. Both are opaque JSON blobs to this layer.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tempfile::NamedTempFile;

pub const PREFERENCES_KEY: &str = "air4_config";
pub const SESSIONS_KEY: &str = "air4_sessions";
/// Where an unreadable session collection is set aside before it is replaced.
pub const SESSIONS_BACKUP_KEY: &str = "air4_sessions.corrupt";

pub trait BlobStore: Send + Sync {
    /// Read the blob stored under `key`, or `None` if nothing was stored yet.
    fn load(&self, key: &str) -> io::Result<Option<String>>;

    fn save(&self, key: &str, contents: &str) -> io::Result<()>;

    fn remove(&self, key: &str) -> io::Result<()>;

    /// Copy the blob under `from` to `to` byte for byte, replacing `to`.
    fn copy(&self, from: &str, to: &str) -> io::Result<()>;
}

/// Stores each key as `<dir>/<key>.json`, replacing files atomically.
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl BlobStore for FileBlobStore {
    fn load(&self, key: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn save(&self, key: &str, contents: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let mut temp_file = NamedTempFile::new_in(&self.dir)?;
        temp_file.write_all(contents.as_bytes())?;
        temp_file.as_file_mut().sync_all()?;
        temp_file
            .persist(self.path_for(key))
            .map_err(|err| err.error)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }

    fn copy(&self, from: &str, to: &str) -> io::Result<()> {
        fs::copy(self.path_for(from), self.path_for(to))?;
        Ok(())
    }
}

/// In-memory store for isolated contexts. Writes can be made to fail to
/// exercise the non-fatal persistence path.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(self, key: &str, contents: &str) -> Self {
        self.lock().insert(key.to_string(), contents.to_string());
        self
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.blobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_writable(&self) -> io::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::other("storage is read-only"));
        }
        Ok(())
    }
}

impl BlobStore for MemoryBlobStore {
    fn load(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.get(key))
    }

    fn save(&self, key: &str, contents: &str) -> io::Result<()> {
        self.check_writable()?;
        self.lock().insert(key.to_string(), contents.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        self.check_writable()?;
        self.lock().remove(key);
        Ok(())
    }

    fn copy(&self, from: &str, to: &str) -> io::Result<()> {
        self.check_writable()?;
        let mut blobs = self.lock();
        let contents = blobs
            .get(from)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, from.to_string()))?;
        blobs.insert(to.to_string(), contents);
        Ok(())
    }
}
