//! TTL cache contract
//!
//! Every cache backend obeys the same rules: entries remember their birth
//! time and TTL, expiry is lazy (checked on read), and a read may override
//! the stored TTL to demand fresher data. [`MemoCache`] is the in-memory
//! reference implementation, used as the per-render-pass cache. There are
//! no background timers: `sweep` evicts eagerly on demand, and the runtime
//! clears the cache when a pass ends.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value as JsonValue;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum CacheError {
    #[error("TTL must be greater than zero")]
    ZeroTtl,
}

/// The shared TTL cache contract.
pub trait Cache {
    /// Store a value. Replaces any previous entry, resetting its age.
    fn set(&mut self, key: &str, value: JsonValue, ttl: Duration) -> Result<(), CacheError>;

    /// Read a value if it is still alive. `ttl_override` judges the entry's
    /// age against a different TTL than the one it was stored with; an entry
    /// found dead is removed.
    fn get(&mut self, key: &str, ttl_override: Option<Duration>) -> Option<JsonValue>;

    /// Is this key present and alive?
    fn has(&mut self, key: &str, ttl_override: Option<Duration>) -> bool;

    /// Remove one entry. Returns whether it existed.
    fn delete(&mut self, key: &str) -> bool;

    /// Evict every expired entry now.
    fn sweep(&mut self);

    /// Drop everything.
    fn clear(&mut self);
}

struct Entry {
    value: JsonValue,
    born: Instant,
    ttl: Duration,
}

impl Entry {
    fn alive(&self, ttl_override: Option<Duration>) -> bool {
        self.born.elapsed() < ttl_override.unwrap_or(self.ttl)
    }
}

/// In-memory TTL cache.
#[derive(Default)]
pub struct MemoCache {
    bucket: HashMap<String, Entry>,
}

impl MemoCache {
    pub fn new() -> Self {
        MemoCache::default()
    }

    pub fn len(&self) -> usize {
        self.bucket.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bucket.is_empty()
    }
}

impl Cache for MemoCache {
    fn set(&mut self, key: &str, value: JsonValue, ttl: Duration) -> Result<(), CacheError> {
        if ttl.is_zero() {
            return Err(CacheError::ZeroTtl);
        }
        self.bucket.insert(
            key.to_string(),
            Entry {
                value,
                born: Instant::now(),
                ttl,
            },
        );
        Ok(())
    }

    fn get(&mut self, key: &str, ttl_override: Option<Duration>) -> Option<JsonValue> {
        let entry = self.bucket.get(key)?;
        if entry.alive(ttl_override) {
            return Some(entry.value.clone());
        }
        self.bucket.remove(key);
        None
    }

    fn has(&mut self, key: &str, ttl_override: Option<Duration>) -> bool {
        self.get(key, ttl_override).is_some()
    }

    fn delete(&mut self, key: &str) -> bool {
        self.bucket.remove(key).is_some()
    }

    fn sweep(&mut self) {
        self.bucket.retain(|_, e| e.alive(None));
    }

    fn clear(&mut self) {
        self.bucket.clear();
    }
}
