//! Two-tier TTL cache for expensive lookups (package search, alias lookups).
//!
//! - Memory tier: `LruCache` bounded by capacity, least recently used evicted.
//! - Disk tier: SQLite table, one row per key, `INSERT OR REPLACE` keeps each
//!   write atomic per key. Survives restarts until swept.
//!
//! `get` checks memory first, then disk, and promotes disk hits into memory.
//! `set` writes both tiers. Every `sweep_every` operations expired rows are
//! dropped from both tiers.
//!
//! A disk tier that cannot be opened or read degrades to memory-only
//! behaviour. Callers see a miss, never an error, through `get`/`set`.

use crate::config::CacheSettings;
use crate::error::CacheError;
use chrono::{DateTime, Utc};
use lru::LruCache;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Default cache capacity (number of entries).
const DEFAULT_CAPACITY: usize = 1000;

/// Default TTL for entries stored without one.
const DEFAULT_TTL: Duration = Duration::from_secs(3600);

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_entries (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    created_at_ms INTEGER NOT NULL,
    ttl_seconds INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cache_created ON cache_entries(created_at_ms);
"#;

/// One cached value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    /// Opaque JSON payload
    pub value: serde_json::Value,
    pub created_at_ms: i64,
    pub ttl_seconds: u64,
}

impl CacheEntry {
    fn new(key: &str, value: serde_json::Value, ttl: Duration) -> Self {
        Self {
            key: key.to_string(),
            value,
            created_at_ms: now_ms(),
            ttl_seconds: ttl_to_secs(ttl),
        }
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.created_at_ms)
    }

    /// Expired once its age reaches the TTL.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        let ttl_ms = i64::try_from(self.ttl_seconds.saturating_mul(1000)).unwrap_or(i64::MAX);
        now_ms.saturating_sub(self.created_at_ms) >= ttl_ms
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_ms())
    }
}

/// Counters reported by `nixiectl cache stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub memory_entries: usize,
    pub memory_capacity: usize,
    /// None when running memory-only
    pub disk_entries: Option<usize>,
    pub disk_path: Option<PathBuf>,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct DiskTier {
    conn: Mutex<Connection>,
    path: PathBuf,
}

/// Memory plus optional SQLite cache. Safe to share between threads.
pub struct Cache {
    memory: Mutex<LruCache<String, CacheEntry>>,
    capacity: usize,
    disk: Option<DiskTier>,
    default_ttl: Duration,
    sweep_every: u64,
    ops: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Cache {
    /// Memory-only cache.
    pub fn in_memory(capacity: usize, default_ttl: Duration) -> Self {
        let capacity = capacity.max(1);
        let lru_capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            memory: Mutex::new(LruCache::new(lru_capacity)),
            capacity,
            disk: None,
            default_ttl,
            sweep_every: 0,
            ops: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Memory cache backed by a SQLite file at `path`.
    pub fn with_disk(path: &Path, capacity: usize, default_ttl: Duration) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        let mut cache = Self::in_memory(capacity, default_ttl);
        cache.disk = Some(DiskTier {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        });
        Ok(cache)
    }

    /// Build from settings. A disk tier that fails to open is logged and
    /// skipped.
    pub fn from_settings(settings: &CacheSettings) -> Self {
        let capacity = settings.effective_memory_capacity();
        let ttl = Duration::from_secs(settings.default_ttl_secs);
        let cache = match settings.db_path() {
            Some(path) => match Self::with_disk(&path, capacity, ttl) {
                Ok(cache) => cache,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "disk cache unavailable, running memory-only");
                    Self::in_memory(capacity, ttl)
                }
            },
            None => Self::in_memory(capacity, ttl),
        };
        cache.sweeping_every(settings.sweep_every)
    }

    /// Sweep expired entries every `n` get/set calls (0 disables).
    pub fn sweeping_every(mut self, n: u64) -> Self {
        self.sweep_every = n;
        self
    }

    pub fn is_persistent(&self) -> bool {
        self.disk.is_some()
    }

    /// Fetch and decode `key`. Failures degrade to a miss.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.try_get(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    pub fn try_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        self.tick();
        let now = now_ms();

        let from_memory = {
            let mut memory = lock(&self.memory);
            let cached = memory
                .get(key)
                .map(|entry| (entry.is_expired_at(now), entry.value.clone()));
            match cached {
                Some((true, _)) => {
                    memory.pop(key);
                    None
                }
                Some((false, value)) => Some(value),
                None => None,
            }
        };

        let value = match from_memory {
            Some(value) => {
                tracing::trace!(key = %key, tier = "memory", "cache hit");
                Some(value)
            }
            None => match self.disk_get(key, now)? {
                Some(entry) => {
                    tracing::trace!(key = %key, tier = "disk", "cache hit");
                    let value = entry.value.clone();
                    lock(&self.memory).put(key.to_string(), entry);
                    Some(value)
                }
                None => None,
            },
        };

        let Some(value) = value else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(key = %key, "cache miss");
            return Ok(None);
        };

        self.hits.fetch_add(1, Ordering::Relaxed);
        serde_json::from_value(value)
            .map(Some)
            .map_err(|source| CacheError::Decode {
                key: key.to_string(),
                source,
            })
    }

    /// Store `value` under `key` in both tiers. Disk failures are logged.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        if let Err(e) = self.try_set(key, value, ttl) {
            tracing::warn!(key = %key, error = %e, "cache write failed");
        }
    }

    pub fn try_set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.tick();
        let json = serde_json::to_value(value).map_err(|source| CacheError::Encode {
            key: key.to_string(),
            source,
        })?;
        let entry = CacheEntry::new(key, json, ttl.unwrap_or(self.default_ttl));

        lock(&self.memory).put(key.to_string(), entry.clone());

        if let Some(disk) = &self.disk {
            let text = entry.value.to_string();
            lock(&disk.conn).execute(
                "INSERT OR REPLACE INTO cache_entries (key, value, created_at_ms, ttl_seconds)
                 VALUES (?1, ?2, ?3, ?4)",
                params![entry.key, text, entry.created_at_ms, secs_to_sql(entry.ttl_seconds)],
            )?;
        }
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<(), CacheError> {
        lock(&self.memory).pop(key);
        if let Some(disk) = &self.disk {
            lock(&disk.conn).execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
        }
        Ok(())
    }

    /// Drop every entry from both tiers.
    pub fn clear(&self) -> Result<(), CacheError> {
        lock(&self.memory).clear();
        if let Some(disk) = &self.disk {
            lock(&disk.conn).execute("DELETE FROM cache_entries", [])?;
        }
        tracing::debug!("cache cleared");
        Ok(())
    }

    /// Remove expired entries from both tiers, returning how many went.
    pub fn sweep(&self) -> Result<usize, CacheError> {
        let now = now_ms();
        let mut removed = {
            let mut memory = lock(&self.memory);
            let expired: Vec<String> = memory
                .iter()
                .filter(|(_, entry)| entry.is_expired_at(now))
                .map(|(key, _)| key.clone())
                .collect();
            for key in &expired {
                memory.pop(key);
            }
            expired.len()
        };

        if let Some(disk) = &self.disk {
            removed += lock(&disk.conn).execute(
                "DELETE FROM cache_entries WHERE created_at_ms + ttl_seconds * 1000 <= ?1",
                params![now],
            )?;
        }

        if removed > 0 {
            tracing::debug!(removed, "cache sweep");
        }
        Ok(removed)
    }

    pub fn stats(&self) -> CacheStats {
        let memory_entries = lock(&self.memory).len();
        let disk_entries = self.disk.as_ref().and_then(|disk| {
            lock(&disk.conn)
                .query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get::<_, i64>(0))
                .ok()
                .map(|n| n.max(0) as usize)
        });
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            memory_entries,
            memory_capacity: self.capacity,
            disk_entries,
            disk_path: self.disk.as_ref().map(|d| d.path.clone()),
        }
    }

    fn disk_get(&self, key: &str, now: i64) -> Result<Option<CacheEntry>, CacheError> {
        let Some(disk) = &self.disk else {
            return Ok(None);
        };
        let conn = lock(&disk.conn);
        let row = conn
            .query_row(
                "SELECT value, created_at_ms, ttl_seconds FROM cache_entries WHERE key = ?1",
                params![key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((text, created_at_ms, ttl_seconds)) = row else {
            return Ok(None);
        };
        let value = serde_json::from_str(&text).map_err(|source| CacheError::Decode {
            key: key.to_string(),
            source,
        })?;
        let entry = CacheEntry {
            key: key.to_string(),
            value,
            created_at_ms,
            ttl_seconds: ttl_seconds.max(0) as u64,
        };
        if entry.is_expired_at(now) {
            conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
            return Ok(None);
        }
        Ok(Some(entry))
    }

    fn tick(&self) {
        if self.sweep_every == 0 {
            return;
        }
        let n = self.ops.fetch_add(1, Ordering::Relaxed) + 1;
        if n % self.sweep_every == 0 {
            if let Err(e) = self.sweep() {
                tracing::warn!(error = %e, "cache sweep failed");
            }
        }
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::in_memory(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Whole seconds, rounding sub-second TTLs up.
fn ttl_to_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

fn secs_to_sql(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX / 1000)
}
