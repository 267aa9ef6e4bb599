//! Bounded work queue shared by module worker threads.
//!
//! Each consumer thread owns exactly one [`WorkQueue`]; ordering is FIFO
//! within a single producer and arbitrary between producers, matching a
//! bounded MPMC channel. `crossbeam_channel` gives us `recv_timeout`
//! directly, which `std::sync::mpsc` (MPSC-only, no timed receive on
//! stable in the shape we need) does not.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};

/// Shutdown sentinel carried as a [`WorkItem::Signal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Term,
}

/// A typed item placed on a worker's queue.
#[derive(Debug, Clone)]
pub enum WorkItem<D, A> {
    /// Control signal (currently just shutdown).
    Signal(Signal),
    /// Opaque data payload (e.g. a DTMF work packet).
    Data(D),
    /// An API call dispatched to a worker (module control-plane hook).
    Api(A),
}

/// Bounded multi-producer/single-consumer-per-thread work queue.
///
/// `put` is non-blocking: when the queue is full the item is dropped
/// and the caller is told so (`false`), matching "the producer may
/// drop... when full" from the queue policy. `get` blocks up to
/// `timeout` and returns `None` on timeout or a closed channel.
pub struct WorkQueue<D, A> {
    tx: Sender<WorkItem<D, A>>,
    rx: Receiver<WorkItem<D, A>>,
}

impl<D, A> WorkQueue<D, A> {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self { tx, rx }
    }

    /// A cloneable handle producers use to push items without touching
    /// the consumer side.
    pub fn sender(&self) -> QueueSender<D, A> {
        QueueSender {
            tx: self.tx.clone(),
        }
    }

    /// Pop the next item, waiting up to `timeout`. Returns `None` on
    /// timeout or once every sender has been dropped.
    pub fn get(&self, timeout: Duration) -> Option<WorkItem<D, A>> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Some(item),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

/// Producer-side handle, cheap to clone and share across threads.
#[derive(Clone)]
pub struct QueueSender<D, A> {
    tx: Sender<WorkItem<D, A>>,
}

impl<D, A> QueueSender<D, A> {
    /// Push an item without blocking. Returns `false` if the queue was
    /// full and the item was dropped.
    pub fn put(&self, item: WorkItem<D, A>) -> bool {
        match self.tx.try_send(item) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Push the termination signal, used by shutdown paths.
    pub fn put_term(&self) {
        // A full queue must never swallow a shutdown request: block
        // briefly rather than non-blockingly dropping it like `put`.
        let _ = self.tx.send(WorkItem::Signal(Signal::Term));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_within_single_producer() {
        let q: WorkQueue<u32, ()> = WorkQueue::new(8);
        let sender = q.sender();
        for i in 0..4 {
            assert!(sender.put(WorkItem::Data(i)));
        }
        for i in 0..4 {
            match q.get(Duration::from_millis(10)) {
                Some(WorkItem::Data(v)) => assert_eq!(v, i),
                other => panic!("unexpected item: {other:?}"),
            }
        }
    }

    #[test]
    fn put_drops_when_full() {
        let q: WorkQueue<u32, ()> = WorkQueue::new(1);
        let sender = q.sender();
        assert!(sender.put(WorkItem::Data(1)));
        assert!(!sender.put(WorkItem::Data(2)));
    }

    #[test]
    fn get_times_out_when_empty() {
        let q: WorkQueue<u32, ()> = WorkQueue::new(1);
        assert!(q.get(Duration::from_millis(5)).is_none());
    }

    #[test]
    fn term_signal_delivered() {
        let q: WorkQueue<u32, ()> = WorkQueue::new(1);
        let sender = q.sender();
        sender.put_term();
        match q.get(Duration::from_millis(10)) {
            Some(WorkItem::Signal(Signal::Term)) => {}
            other => panic!("expected term signal, got {other:?}"),
        }
    }
}
