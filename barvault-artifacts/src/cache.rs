//! Artifact cache — fingerprint-keyed results with single-flight
//! computation.
//!
//! Entries are JSON files named by the combined key hash, so the uniqueness
//! constraint (one live entry per key) is the filesystem's. On top of the
//! disk store sits an in-memory flight table: the first caller for a key
//! becomes the leader and runs the computation; concurrent callers for the
//! same key block on the flight and share the leader's outcome; callers for
//! different keys never contend.
//!
//! Failures are never cached: a failed computation propagates to every
//! waiter and the next call retries.

use chrono::{NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;
use thiserror::Error;

use barvault_core::domain::{ArtifactKind, CacheKey, DatasetFingerprint, ParamFingerprint};

/// Structured error types for cache operations.
///
/// Clone-able so one outcome can be delivered to every waiter of a flight.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("computation failed for key {key}: {message}")]
    Computation { key: String, message: String },

    #[error("cache I/O error at {}: {message}", .path.display())]
    Io { path: PathBuf, message: String },

    #[error("corrupt cache entry at {}: {message}", .path.display())]
    CorruptEntry { path: PathBuf, message: String },

    #[error("payload encode failed for key {key}: {message}")]
    Encode { key: String, message: String },

    #[error("payload decode failed for key {key}: {message}")]
    Decode { key: String, message: String },
}

/// One cached computation result.
///
/// The payload is opaque to the cache; typed access happens at the
/// `get_or_compute` boundary. Entries are superseded by atomic replacement,
/// never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub dataset_fingerprint: DatasetFingerprint,
    pub parameter_fingerprint: ParamFingerprint,
    pub kind: ArtifactKind,
    pub payload: serde_json::Value,
    pub created_at: NaiveDateTime,
    /// None = valid until the dataset or parameter fingerprint changes.
    pub expires_at: Option<NaiveDateTime>,
}

impl CacheEntry {
    pub fn is_expired_at(&self, now: NaiveDateTime) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

enum FlightState {
    Running,
    Done(Result<CacheEntry, CacheError>),
}

/// A single in-flight computation, shared between its leader and waiters.
struct Flight {
    state: Mutex<FlightState>,
    done: Condvar,
}

impl Flight {
    fn new() -> Self {
        Self {
            state: Mutex::new(FlightState::Running),
            done: Condvar::new(),
        }
    }

    fn publish(&self, outcome: Result<CacheEntry, CacheError>) {
        *self.state.lock().unwrap() = FlightState::Done(outcome);
        self.done.notify_all();
    }

    fn wait(&self) -> Result<CacheEntry, CacheError> {
        let mut state = self.state.lock().unwrap();
        loop {
            match &*state {
                FlightState::Running => state = self.done.wait(state).unwrap(),
                FlightState::Done(outcome) => return outcome.clone(),
            }
        }
    }
}

/// The artifact cache.
pub struct ArtifactCache {
    cache_dir: PathBuf,
    inflight: Mutex<HashMap<String, Arc<Flight>>>,
}

impl ArtifactCache {
    /// Open a cache rooted at `cache_dir`, creating the directory if needed.
    pub fn open(cache_dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir).map_err(|e| CacheError::Io {
            path: cache_dir.clone(),
            message: e.to_string(),
        })?;
        Ok(Self {
            cache_dir,
            inflight: Mutex::new(HashMap::new()),
        })
    }

    /// Root directory of the cache.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Return the cached artifact for `key`, or run `compute` exactly once
    /// among all concurrent callers for that key and cache its result.
    ///
    /// `ttl = None` means the entry never expires by time; it simply
    /// becomes unreachable once either fingerprint changes.
    pub fn get_or_compute<T, F>(
        &self,
        key: &CacheKey,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> anyhow::Result<T>,
    {
        let key_hash = key.combined_hash();

        // Fast path: live entry on disk, no flight needed
        if let Some(entry) = self.load_live(&key_hash)? {
            return self.decode_payload(key, &entry);
        }

        let (flight, is_leader) = {
            let mut inflight = self.inflight.lock().unwrap();
            match inflight.get(&key_hash) {
                Some(flight) => (flight.clone(), false),
                None => {
                    let flight = Arc::new(Flight::new());
                    inflight.insert(key_hash.clone(), flight.clone());
                    (flight, true)
                }
            }
        };

        if !is_leader {
            let entry = flight.wait()?;
            return self.decode_payload(key, &entry);
        }

        // Leader: re-check the disk entry (another leader may have finished
        // between the fast path and winning the flight), then compute.
        let outcome = match self.load_live(&key_hash) {
            Ok(Some(entry)) => Ok(entry),
            Ok(None) => self.run_compute(key, &key_hash, ttl, compute),
            Err(e) => Err(e),
        };

        flight.publish(outcome.clone());
        self.inflight.lock().unwrap().remove(&key_hash);

        let entry = outcome?;
        self.decode_payload(key, &entry)
    }

    /// Non-expired entry for `key`, if any, without computing.
    pub fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        self.load_live(&key.combined_hash())
    }

    /// Remove a specific entry. Returns whether an entry existed.
    ///
    /// Used when the caller has independent knowledge that the underlying
    /// dataset changed.
    pub fn evict(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let path = self.entry_path(&key.combined_hash());
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).map_err(|e| CacheError::Io {
            path,
            message: e.to_string(),
        })?;
        Ok(true)
    }

    /// Remove every entry whose expiry has passed. Returns the count
    /// removed. Callable on a schedule or on demand.
    pub fn sweep_expired(&self) -> Result<usize, CacheError> {
        let now = Utc::now().naive_utc();
        let mut removed = 0;
        for path in self.entry_paths()? {
            let entry = self.read_entry(&path)?;
            if entry.is_expired_at(now) {
                fs::remove_file(&path).map_err(|e| CacheError::Io {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Number of entries on disk, live or expired.
    pub fn len(&self) -> Result<usize, CacheError> {
        Ok(self.entry_paths()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }

    // ── Internals ─────────────────────────────────────────────────────

    fn entry_path(&self, key_hash: &str) -> PathBuf {
        self.cache_dir.join(format!("{key_hash}.json"))
    }

    fn entry_paths(&self) -> Result<Vec<PathBuf>, CacheError> {
        let entries = fs::read_dir(&self.cache_dir).map_err(|e| CacheError::Io {
            path: self.cache_dir.clone(),
            message: e.to_string(),
        })?;
        let mut paths = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    fn read_entry(&self, path: &Path) -> Result<CacheEntry, CacheError> {
        let content = fs::read_to_string(path).map_err(|e| CacheError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| CacheError::CorruptEntry {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load the entry for a key hash if it exists and has not expired.
    fn load_live(&self, key_hash: &str) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.entry_path(key_hash);
        if !path.exists() {
            return Ok(None);
        }
        let entry = self.read_entry(&path)?;
        if entry.is_expired_at(Utc::now().naive_utc()) {
            return Ok(None);
        }
        Ok(Some(entry))
    }

    fn run_compute<T, F>(
        &self,
        key: &CacheKey,
        key_hash: &str,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<CacheEntry, CacheError>
    where
        T: Serialize,
        F: FnOnce() -> anyhow::Result<T>,
    {
        let value = compute().map_err(|e| CacheError::Computation {
            key: key.to_string(),
            message: format!("{e:#}"),
        })?;
        let payload = serde_json::to_value(&value).map_err(|e| CacheError::Encode {
            key: key.to_string(),
            message: e.to_string(),
        })?;

        let created_at = Utc::now().naive_utc();
        let expires_at = ttl.and_then(|ttl| {
            chrono::Duration::from_std(ttl)
                .ok()
                .map(|ttl| created_at + ttl)
        });
        let entry = CacheEntry {
            dataset_fingerprint: key.dataset.clone(),
            parameter_fingerprint: key.params.clone(),
            kind: key.kind,
            payload,
            created_at,
            expires_at,
        };
        self.write_entry(key_hash, &entry)?;
        Ok(entry)
    }

    /// Atomic entry write: write to .tmp, rename into place. Replacement of
    /// an existing entry is supersession, never in-place mutation.
    fn write_entry(&self, key_hash: &str, entry: &CacheEntry) -> Result<(), CacheError> {
        let path = self.entry_path(key_hash);
        let tmp_path = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(entry).map_err(|e| CacheError::Encode {
            key: key_hash.to_string(),
            message: e.to_string(),
        })?;
        fs::write(&tmp_path, json).map_err(|e| CacheError::Io {
            path: tmp_path.clone(),
            message: e.to_string(),
        })?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            CacheError::Io {
                path,
                message: format!("atomic rename failed: {e}"),
            }
        })
    }

    fn decode_payload<T: DeserializeOwned>(
        &self,
        key: &CacheKey,
        entry: &CacheEntry,
    ) -> Result<T, CacheError> {
        serde_json::from_value(entry.payload.clone()).map_err(|e| CacheError::Decode {
            key: key.to_string(),
            message: e.to_string(),
        })
    }
}
