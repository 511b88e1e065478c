//! Bounded LRU cache for lookup results.
//!
//! Chain evaluation tends to ask about the same certificate repeatedly in
//! quick succession; caching the last computed [`ValidInfo`] avoids a
//! database read per repetition. The cache has its own lock, independent
//! of any database lock: cache hits must never serialize behind an
//! in-progress write transaction.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use tracing::trace;

use crate::types::ValidInfo;

/// Fixed result-cache capacity.
pub const CACHE_CAPACITY: usize = 100;

/// LRU map from `digest(cert_hash ‖ issuer_hash)` to the last computed
/// lookup result. Cleared in full whenever an update commits or a
/// cross-process change notification arrives.
pub struct LookupCache {
    inner: Mutex<Inner>,
    capacity: usize,
}

struct Inner {
    map: HashMap<[u8; 32], ValidInfo>,
    /// Keys ordered from least- to most-recently used.
    order: VecDeque<[u8; 32]>,
}

impl LookupCache {
    /// Create a cache with the given capacity (0 falls back to
    /// [`CACHE_CAPACITY`]).
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 { CACHE_CAPACITY } else { capacity };
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
            }),
            capacity,
        }
    }

    /// Derive the cache key for a (certificate, issuer) digest pair.
    pub fn key(cert_hash: &[u8; 32], issuer_hash: &[u8; 32]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(cert_hash);
        hasher.update(issuer_hash);
        hasher.finalize().into()
    }

    /// Look up a cached result and promote it to most-recently-used.
    ///
    /// The stored digests are compared against the requested ones so that a
    /// key-derivation collision can never surface a result computed for a
    /// different certificate.
    pub fn get(
        &self,
        key: &[u8; 32],
        cert_hash: &[u8; 32],
        issuer_hash: &[u8; 32],
    ) -> Option<ValidInfo> {
        let mut inner = self.inner.lock().ok()?;
        let info = inner.map.get(key)?.clone();
        if info.cert_hash != *cert_hash || info.issuer_hash != *issuer_hash {
            trace!("cache key collision, treating as miss");
            return None;
        }
        if let Some(pos) = inner.order.iter().position(|k| k == key) {
            inner.order.remove(pos);
        }
        inner.order.push_back(*key);
        Some(info)
    }

    /// Insert a computed result, evicting the least-recently-used entry if
    /// the cache is full. Negative results ("known issuer, no match") are
    /// cached the same way as positive ones.
    pub fn put(&self, key: [u8; 32], info: ValidInfo) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        if inner.map.insert(key, info).is_some() {
            if let Some(pos) = inner.order.iter().position(|k| *k == key) {
                inner.order.remove(pos);
            }
        } else if inner.map.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.map.remove(&oldest);
            }
        }
        inner.order.push_back(key);
    }

    /// Discard every entry.
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.map.clear();
            inner.order.clear();
        }
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.map.len()).unwrap_or(0)
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
