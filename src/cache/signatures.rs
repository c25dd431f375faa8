//! Signature Cache Module
//!
//! Bounded, least-recently-used registry of wrapped functions' parameter
//! lists, keyed by cache prefix. Lets name-based key computation normalise
//! arguments exactly like the wrapped call does.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use tracing::debug;

/// Default number of signatures kept.
pub const DEFAULT_SIGNATURE_CAPACITY: usize = 1024;

// == Signature ==
/// What key construction needs to know about a wrapped function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Declared parameter names, receiver already skipped
    pub params: Vec<String>,
    /// Whether arguments are normalised before hashing
    pub normalize: bool,
}

// == Recency Order ==
/// Access order of names.
///
/// - Front = Most recently used
/// - Back = Least recently used
#[derive(Debug, Default)]
struct RecencyOrder {
    order: VecDeque<String>,
}

impl RecencyOrder {
    /// Marks a name as recently used (moves it to the front).
    fn touch(&mut self, name: &str) {
        self.remove(name);
        self.order.push_front(name.to_string());
    }

    fn remove(&mut self, name: &str) {
        self.order.retain(|n| n != name);
    }

    fn evict_oldest(&mut self) -> Option<String> {
        self.order.pop_back()
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Signature>,
    order: RecencyOrder,
}

// == Signature Cache ==
#[derive(Debug)]
pub struct SignatureCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl SignatureCache {
    /// Creates a cache holding at most `capacity` signatures (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    // == Register ==
    /// Records the signature for `name`, evicting the least recently used
    /// entry when full.
    pub fn register(&self, name: &str, signature: Signature) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        if !inner.entries.contains_key(name) && inner.entries.len() >= self.capacity {
            if let Some(oldest) = inner.order.evict_oldest() {
                debug!(name = %oldest, "Evicting function signature");
                inner.entries.remove(&oldest);
            }
        }

        inner.entries.insert(name.to_string(), signature);
        inner.order.touch(name);
    }

    // == Lookup ==
    /// Returns the signature for `name` and marks it recently used.
    pub fn lookup(&self, name: &str) -> Option<Signature> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let signature = inner.entries.get(name).cloned()?;
        inner.order.touch(name);
        Some(signature)
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for SignatureCache {
    fn default() -> Self {
        Self::new(DEFAULT_SIGNATURE_CAPACITY)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn sig(params: &[&str]) -> Signature {
        Signature {
            params: params.iter().map(|p| p.to_string()).collect(),
            normalize: true,
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let cache = SignatureCache::new(4);
        cache.register("app.get_user", sig(&["user_id"]));

        assert_eq!(cache.lookup("app.get_user"), Some(sig(&["user_id"])));
        assert_eq!(cache.lookup("app.missing"), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_reregister_replaces_without_growing() {
        let cache = SignatureCache::new(2);
        cache.register("f", sig(&["a"]));
        cache.register("f", sig(&["a", "b"]));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup("f").unwrap().params.len(), 2);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = SignatureCache::new(2);
        cache.register("f1", sig(&["a"]));
        cache.register("f2", sig(&["b"]));

        // Touch f1 so f2 becomes the oldest
        cache.lookup("f1");
        cache.register("f3", sig(&["c"]));

        assert_eq!(cache.len(), 2);
        assert!(cache.lookup("f1").is_some());
        assert!(cache.lookup("f2").is_none());
        assert!(cache.lookup("f3").is_some());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let cache = SignatureCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.register("f1", sig(&[]));
        cache.register("f2", sig(&[]));
        assert_eq!(cache.len(), 1);
    }
}
