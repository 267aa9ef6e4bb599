//! Refcounted-object kernel: 64-bit weak ids resolved through sharded registries.
//!
//! Every long-lived engine object (stream, pipe, session) is held with
//! ordinary [`Arc`] strong references — `Arc`'s `Drop` already gives us
//! "decref to zero runs the destructor exactly once" for free. What the
//! original design needs beyond that is a way for one object to refer to
//! *another* without a strong reference and without a direct `Weak<T>`
//! field (the cyclic pipe/stream relationship is broken by id, not by
//! pointer — see `stream::StreamEndpoint::peer_stream_id`). [`WeakRegistry`]
//! is that indirection: ids are handed out from a single process-wide
//! counter, and each shard is an independently-locked bucket so that
//! registration under one id never blocks a lookup under another.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

/// Id `0` is reserved to mean "no target"; real ids start at 1.
pub const NONE_ID: u64 = 0;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh, process-wide unique id.
pub fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

const SHARDS: usize = 16;

fn shard_of(id: u64) -> usize {
    (id as usize) % SHARDS
}

/// A sharded table mapping 64-bit ids to [`Weak`] references.
///
/// `register` never fails (the backing `HashMap` grows); `lookup`
/// upgrades the stored weak reference, returning `None` once the
/// target has actually been dropped — there is no separate "trap
/// table" needed, `Weak::upgrade` already encodes that check.
pub struct WeakRegistry<T> {
    shards: Vec<RwLock<HashMap<u64, Weak<T>>>>,
}

impl<T> WeakRegistry<T> {
    pub fn new() -> Self {
        let mut shards = Vec::with_capacity(SHARDS);
        for _ in 0..SHARDS {
            shards.push(RwLock::new(HashMap::new()));
        }
        Self { shards }
    }

    /// Register `target` under `id`, replacing any prior registration.
    pub fn register(&self, id: u64, target: &Arc<T>) {
        self.shards[shard_of(id)]
            .write()
            .insert(id, Arc::downgrade(target));
    }

    /// Remove the registration for `id`, if any.
    pub fn unregister(&self, id: u64) {
        self.shards[shard_of(id)].write().remove(&id);
    }

    /// Resolve `id` to a strong hold, if the target is still alive.
    pub fn lookup(&self, id: u64) -> Option<Arc<T>> {
        if id == NONE_ID {
            return None;
        }
        self.shards[shard_of(id)].read().get(&id)?.upgrade()
    }

    /// Number of live entries across all shards (includes ids whose
    /// target has since been dropped but not yet unregistered).
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for WeakRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_resolves_while_alive() {
        let reg: WeakRegistry<String> = WeakRegistry::new();
        let id = next_id();
        let obj = Arc::new("hello".to_string());
        reg.register(id, &obj);

        let resolved = reg.lookup(id).expect("should resolve");
        assert_eq!(*resolved, "hello");
    }

    #[test]
    fn lookup_fails_after_drop() {
        let reg: WeakRegistry<String> = WeakRegistry::new();
        let id = next_id();
        {
            let obj = Arc::new("bye".to_string());
            reg.register(id, &obj);
            assert!(reg.lookup(id).is_some());
        }
        assert!(reg.lookup(id).is_none());
    }

    #[test]
    fn unregister_removes_entry() {
        let reg: WeakRegistry<String> = WeakRegistry::new();
        let id = next_id();
        let obj = Arc::new("x".to_string());
        reg.register(id, &obj);
        reg.unregister(id);
        assert!(reg.lookup(id).is_none());
        assert_eq!(reg.len(), 0);
    }

    #[test]
    fn none_id_never_resolves() {
        let reg: WeakRegistry<String> = WeakRegistry::new();
        assert!(reg.lookup(NONE_ID).is_none());
    }

    #[test]
    fn ids_are_monotonic_and_unique() {
        let a = next_id();
        let b = next_id();
        assert_ne!(a, b);
        assert!(b > a);
    }
}
