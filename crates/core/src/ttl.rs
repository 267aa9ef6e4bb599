//! TTL (time-to-live) countdown shared by streams and pipes.

use std::sync::atomic::{AtomicI64, Ordering};

/// An integer-seconds countdown, reset by control-plane activity and by
/// receive events. Stored as `AtomicI64` so the data plane can bump it
/// on every packet without taking a lock.
pub struct Ttl {
    remaining: AtomicI64,
    max: AtomicI64,
}

impl Ttl {
    pub fn new(max_seconds: i64) -> Self {
        Self {
            remaining: AtomicI64::new(max_seconds),
            max: AtomicI64::new(max_seconds),
        }
    }

    /// Remaining seconds before this side is considered dead.
    pub fn get_remaining(&self) -> i64 {
        self.remaining.load(Ordering::Relaxed)
    }

    /// Reset to the configured max.
    pub fn reset(&self) {
        let max = self.max.load(Ordering::Relaxed);
        self.remaining.store(max, Ordering::Relaxed);
    }

    /// Reset to `max_seconds`, also becoming the new default for future resets.
    pub fn reset_with(&self, max_seconds: i64) {
        self.max.store(max_seconds, Ordering::Relaxed);
        self.remaining.store(max_seconds, Ordering::Relaxed);
    }

    /// Decrement by one tick (called by the TTL scanner thread).
    /// Returns the post-decrement value; never goes below zero.
    pub fn tick(&self) -> i64 {
        let mut cur = self.remaining.load(Ordering::Relaxed);
        loop {
            let next = (cur - 1).max(0);
            match self.remaining.compare_exchange_weak(
                cur,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(observed) => cur = observed,
            }
        }
    }

    pub fn is_expired(&self) -> bool {
        self.get_remaining() <= 0
    }
}
