//! Bounded correlation cache for pending approvals.
//!
//! Telegram limits callback data to 64 bytes, so inline buttons cannot
//! carry their state. Each button instead carries an opaque token that
//! indexes this cache. Entries are evicted LRU-first when the cache is
//! full; a missed lookup (evicted or restarted) must fail gracefully with
//! a stale-token error at the call site.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use lru::LruCache;
use rand::Rng;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Random bytes per token: 256 bits, URL-safe, 43 characters encoded.
const TOKEN_BYTES: usize = 32;

/// Generate an opaque correlation token.
pub fn new_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill(&mut bytes[..]);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Token-indexed LRU cache of pending approval state.
pub struct TokenCache<V> {
    inner: Mutex<LruCache<String, V>>,
}

impl<V: Clone> TokenCache<V> {
    pub fn new(capacity: usize) -> Self {
        TokenCache {
            inner: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).unwrap(),
            )),
        }
    }

    /// Store `value` under a fresh token and return the token.
    pub fn insert(&self, value: V) -> String {
        let token = new_token();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.put(token.clone(), value);
        token
    }

    /// Look up a token, promoting the entry to most recently used.
    pub fn get(&self, token: &str) -> Option<V> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.get(token).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
