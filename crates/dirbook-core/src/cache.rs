//! Cache collaborator
//!
//! Get/set/remove primitives over JSON values. Atomicity is the
//! implementation's concern, not the adapter's; the adapter only relies on
//! single-call semantics. `MemoryCache` is the in-process implementation used
//! by tests and single-node deployments.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value;

/// Cache storage primitives consumed by the adapter core.
pub trait Cache: Send + Sync {
    /// Fetch a value, `None` when absent or expired.
    fn get(&self, key: &str) -> Option<Value>;

    /// Store a value, optionally expiring after `ttl`.
    fn set(&self, key: &str, value: Value, ttl: Option<Duration>);

    /// Remove a value.
    fn remove(&self, key: &str);

    /// Evict all expired entries.
    fn expunge(&self);
}

struct CacheSlot {
    value: Value,
    expires: Option<Instant>,
}

impl CacheSlot {
    fn expired(&self, now: Instant) -> bool {
        self.expires.is_some_and(|at| at <= now)
    }
}

/// In-memory TTL cache.
#[derive(Default)]
pub struct MemoryCache {
    slots: Mutex<HashMap<String, CacheSlot>>,
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        let mut slots = self.slots.lock().expect("cache lock poisoned");
        let now = Instant::now();
        if slots.get(key).is_some_and(|slot| slot.expired(now)) {
            slots.remove(key);
            return None;
        }
        slots.get(key).map(|slot| slot.value.clone())
    }

    fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let slot = CacheSlot {
            value,
            expires: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.slots
            .lock()
            .expect("cache lock poisoned")
            .insert(key.to_string(), slot);
    }

    fn remove(&self, key: &str) {
        self.slots.lock().expect("cache lock poisoned").remove(key);
    }

    fn expunge(&self) {
        let now = Instant::now();
        self.slots
            .lock()
            .expect("cache lock poisoned")
            .retain(|_, slot| !slot.expired(now));
    }
}
