//! Content-addressed cache for upstream answers.
//!
//! Keys are fingerprints of an operation name plus its arguments, in the order
//! the caller passes them. A key, once written, keeps its first value: upstream
//! answers are treated as stable, so later writes to the same key are no-ops.
//! An optional directory holds one JSON file per key so answers survive
//! between runs.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use crate::TARGET_CACHE;

const ARGUMENT_SEPARATOR: [u8; 1] = [0x1f];

/// Deterministic key for an operation and its ordered arguments.
pub fn fingerprint(operation: &str, args: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(operation.as_bytes());
    for arg in args {
        hasher.update(ARGUMENT_SEPARATOR);
        hasher.update(arg.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
}

pub struct ResultCache {
    entries: DashMap<String, Value>,
    directory: Option<PathBuf>,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

impl ResultCache {
    /// A cache that lives only as long as the process.
    pub fn in_memory() -> Self {
        ResultCache {
            entries: DashMap::new(),
            directory: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// A cache backed by `directory`, which is created if missing.
    pub fn persistent(directory: impl AsRef<Path>) -> io::Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory)?;
        Ok(ResultCache {
            directory: Some(directory),
            ..ResultCache::in_memory()
        })
    }

    pub fn get(&self, operation: &str, args: &[&str]) -> Option<Value> {
        let key = fingerprint(operation, args);

        if let Some(value) = self.entries.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(target: TARGET_CACHE, "Cache hit for {} ({})", operation, key);
            return Some(value.clone());
        }

        if let Some(value) = self.load(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(target: TARGET_CACHE, "Disk cache hit for {} ({})", operation, key);
            let value = self.entries.entry(key).or_insert(value).clone();
            return Some(value);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(target: TARGET_CACHE, "Cache miss for {} ({})", operation, key);
        None
    }

    /// Stores `value` unless the key already holds one.
    pub fn set(&self, operation: &str, args: &[&str], value: Value) {
        let key = fingerprint(operation, args);

        let inserted = match self.entries.entry(key.clone()) {
            Entry::Occupied(existing) => {
                if existing.get() != &value {
                    debug!(target: TARGET_CACHE, "Keeping first value for {} ({})", operation, key);
                }
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(value.clone());
                true
            }
        };

        if inserted {
            self.writes.fetch_add(1, Ordering::Relaxed);
            self.store(&key, &value);
        }
    }

    /// Drops the entry for a key, along with its file.
    pub fn remove(&self, operation: &str, args: &[&str]) {
        let key = fingerprint(operation, args);
        self.entries.remove(&key);

        if let Some(path) = self.path_for(&key) {
            if let Err(err) = fs::remove_file(&path) {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!(target: TARGET_CACHE, "Failed to remove cache file {}: {}", path.display(), err);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }

    fn path_for(&self, key: &str) -> Option<PathBuf> {
        self.directory
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", key)))
    }

    fn load(&self, key: &str) -> Option<Value> {
        let path = self.path_for(key)?;
        let contents = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(target: TARGET_CACHE, "Discarding unreadable cache file {}: {}", path.display(), err);
                let _ = fs::remove_file(&path);
                None
            }
        }
    }

    fn store(&self, key: &str, value: &Value) {
        let Some(path) = self.path_for(key) else {
            return;
        };
        if path.exists() {
            return;
        }

        let temp_path = path.with_extension("json.tmp");
        let result = serde_json::to_vec(value)
            .map_err(io::Error::from)
            .and_then(|bytes| fs::write(&temp_path, bytes))
            .and_then(|_| fs::rename(&temp_path, &path));

        if let Err(err) = result {
            warn!(target: TARGET_CACHE, "Failed to persist cache entry {}: {}", path.display(), err);
            let _ = fs::remove_file(&temp_path);
        }
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        ResultCache::in_memory()
    }
}
