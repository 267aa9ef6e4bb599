//! Packet observer manager (C7): taps other engine components (DTMF
//! detection, accounting, recording) attach to the data plane without
//! the data plane itself knowing about them. Each observer is a pair
//! of closures — `taste` decides whether this packet is interesting,
//! `enqueue` hands it off (typically onto a module's own work queue,
//! see [`queue`](crate::queue)) — so the hot forwarding path pays only
//! for a cheap predicate call when nobody's watching.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;

/// Everything an observer might need to decide and act on a packet.
/// Borrowed for the duration of dispatch; observers that need to keep
/// data past that must copy it (typically into a queued work item).
pub struct PacketCtx<'a> {
    pub payload: &'a [u8],
    pub src: SocketAddr,
    pub pt: Option<u8>,
    pub rtp_timestamp: Option<u32>,
    pub side: &'static str,
    pub stream_id: u64,
}

pub type TasteFn = dyn Fn(&PacketCtx) -> bool + Send + Sync;
pub type EnqueueFn = dyn Fn(&PacketCtx) + Send + Sync;

struct Observer {
    id: u64,
    taste: Arc<TasteFn>,
    enqueue: Arc<EnqueueFn>,
}

/// Ordered list of observers, dispatched in registration order. All
/// matching observers are invoked — observers are independent taps,
/// not a first-match-wins chain.
pub struct PacketObserverManager {
    observers: RwLock<Vec<Observer>>,
}

impl PacketObserverManager {
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Register an observer, returning an id usable with `unreg`.
    pub fn reg(&self, taste: Arc<TasteFn>, enqueue: Arc<EnqueueFn>) -> u64 {
        let id = crate::weakref::next_id();
        self.observers.write().push(Observer { id, taste, enqueue });
        id
    }

    pub fn unreg(&self, id: u64) {
        self.observers.write().retain(|o| o.id != id);
    }

    /// Run every observer's taste predicate against `ctx`, enqueueing
    /// for each one that matches. Returns how many observers accepted
    /// the packet.
    pub fn dispatch(&self, ctx: &PacketCtx) -> usize {
        let observers = self.observers.read();
        let mut count = 0;
        for obs in observers.iter() {
            if (obs.taste)(ctx) {
                (obs.enqueue)(ctx);
                count += 1;
            }
        }
        count
    }

    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PacketObserverManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ctx(pt: Option<u8>) -> PacketCtx<'static> {
        PacketCtx {
            payload: b"x",
            src: SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 1),
            pt,
            rtp_timestamp: Some(0),
            side: "caller",
            stream_id: 1,
        }
    }

    #[test]
    fn unmatched_taste_never_enqueues() {
        let mgr = PacketObserverManager::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        mgr.reg(
            Arc::new(|c: &PacketCtx| c.pt == Some(101)),
            Arc::new(move |_: &PacketCtx| {
                hits2.fetch_add(1, Ordering::Relaxed);
            }),
        );
        let matched = mgr.dispatch(&ctx(Some(0)));
        assert_eq!(matched, 0);
        assert_eq!(hits.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn matching_taste_enqueues() {
        let mgr = PacketObserverManager::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        mgr.reg(
            Arc::new(|c: &PacketCtx| c.pt == Some(101)),
            Arc::new(move |_: &PacketCtx| {
                hits2.fetch_add(1, Ordering::Relaxed);
            }),
        );
        let matched = mgr.dispatch(&ctx(Some(101)));
        assert_eq!(matched, 1);
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn multiple_observers_all_run() {
        let mgr = PacketObserverManager::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let hits2 = hits.clone();
            mgr.reg(
                Arc::new(|_: &PacketCtx| true),
                Arc::new(move |_: &PacketCtx| {
                    hits2.fetch_add(1, Ordering::Relaxed);
                }),
            );
        }
        let matched = mgr.dispatch(&ctx(None));
        assert_eq!(matched, 3);
        assert_eq!(hits.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn unreg_removes_observer() {
        let mgr = PacketObserverManager::new();
        let id = mgr.reg(Arc::new(|_: &PacketCtx| true), Arc::new(|_: &PacketCtx| {}));
        assert_eq!(mgr.len(), 1);
        mgr.unreg(id);
        assert!(mgr.is_empty());
    }
}
