//! Single-shot, closeable result channel returned to query submitters.

use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;

use crate::error::{HandleClosed, WorkerError};

/// Terminal outcome of a submitted worker: its payload or its failure.
pub type QueryResult<T> = Result<T, WorkerError>;

enum Slot<T> {
    Pending,
    Settled(QueryResult<T>),
    Consumed,
    Closed,
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    event: Notify,
}

/// A single-slot receptacle for exactly one worker outcome.
///
/// The producer side calls [`deliver`](ResultHandle::deliver) (first delivery
/// wins); the consumer side calls [`recv`](ResultHandle::recv) once, or
/// [`close`](ResultHandle::close) to give up. Closing before a value arrives
/// is the cancellation signal: the admission supervisor watches
/// [`closed`](ResultHandle::closed) and interrupts the worker.
///
/// Handles are cheaply cloneable; all clones observe the same slot.
pub struct ResultHandle<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for ResultHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Default for ResultHandle<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ResultHandle<T> {
    /// Creates an empty, open handle.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot::Pending),
                event: Notify::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.shared.slot.lock().expect("result slot lock poisoned")
    }

    /// Publishes the terminal outcome.
    ///
    /// Returns `true` if this call settled the handle. Delivery after a close
    /// drops the value silently; delivery after a prior delivery is ignored
    /// (first wins).
    pub fn deliver(&self, outcome: QueryResult<T>) -> bool {
        let mut slot = self.lock();
        if !matches!(*slot, Slot::Pending) {
            return false;
        }
        *slot = Slot::Settled(outcome);
        drop(slot);
        self.shared.event.notify_waiters();
        true
    }

    /// Waits for the terminal outcome and takes it.
    ///
    /// Fails with [`HandleClosed`] if the handle was closed before delivery,
    /// or if the value was already consumed by an earlier `recv`.
    pub async fn recv(&self) -> Result<QueryResult<T>, HandleClosed> {
        loop {
            let mut notified = pin!(self.shared.event.notified());
            notified.as_mut().enable();
            {
                let mut slot = self.lock();
                if matches!(*slot, Slot::Settled(_)) {
                    if let Slot::Settled(outcome) = std::mem::replace(&mut *slot, Slot::Consumed) {
                        return Ok(outcome);
                    }
                }
                if matches!(*slot, Slot::Closed | Slot::Consumed) {
                    return Err(HandleClosed);
                }
            }
            notified.await;
        }
    }

    /// Abandons the pending outcome.
    ///
    /// If no value has been delivered yet, the handle transitions to closed
    /// and the producer side is woken; this cancels the associated worker.
    /// Closing a settled handle is a no-op.
    pub fn close(&self) {
        let mut slot = self.lock();
        if !matches!(*slot, Slot::Pending) {
            return;
        }
        *slot = Slot::Closed;
        drop(slot);
        self.shared.event.notify_waiters();
    }

    /// Completes once the handle has been closed without a delivery.
    ///
    /// Never completes for handles that settle normally; producers select
    /// this against the worker's own completion.
    pub async fn closed(&self) {
        loop {
            let mut notified = pin!(self.shared.event.notified());
            notified.as_mut().enable();
            if self.is_closed() {
                return;
            }
            notified.await;
        }
    }

    /// Whether a value has been delivered (and possibly consumed).
    pub fn is_settled(&self) -> bool {
        matches!(*self.lock(), Slot::Settled(_) | Slot::Consumed)
    }

    /// Whether the handle was closed before any delivery.
    pub fn is_closed(&self) -> bool {
        matches!(*self.lock(), Slot::Closed)
    }
}

impl<T> std::fmt::Debug for ResultHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match *self.lock() {
            Slot::Pending => "pending",
            Slot::Settled(_) => "settled",
            Slot::Consumed => "consumed",
            Slot::Closed => "closed",
        };
        f.debug_struct("ResultHandle").field("state", &state).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_delivery_wins() {
        let handle = ResultHandle::new();
        assert!(handle.deliver(Ok(1)));
        assert!(!handle.deliver(Ok(2)));
        assert_eq!(handle.recv().await.unwrap(), Ok(1));
    }

    #[tokio::test]
    async fn deliver_after_close_is_dropped() {
        let handle = ResultHandle::<u32>::new();
        handle.close();
        assert!(!handle.deliver(Ok(1)));
        assert_eq!(handle.recv().await, Err(HandleClosed));
    }

    #[tokio::test]
    async fn close_after_deliver_is_noop() {
        let handle = ResultHandle::new();
        handle.deliver(Ok(7));
        handle.close();
        assert!(handle.is_settled());
        assert!(!handle.is_closed());
        assert_eq!(handle.recv().await.unwrap(), Ok(7));
    }

    #[tokio::test]
    async fn second_recv_fails() {
        let handle = ResultHandle::new();
        handle.deliver(Ok(3));
        assert_eq!(handle.recv().await.unwrap(), Ok(3));
        assert_eq!(handle.recv().await, Err(HandleClosed));
    }

    #[tokio::test]
    async fn recv_wakes_on_late_delivery() {
        let handle = ResultHandle::new();
        let receiver = handle.clone();
        let recv = tokio::spawn(async move { receiver.recv().await });
        tokio::task::yield_now().await;
        handle.deliver(Ok("done"));
        assert_eq!(recv.await.unwrap().unwrap(), Ok("done"));
    }

    #[tokio::test]
    async fn closed_completes_on_close() {
        let handle = ResultHandle::<u32>::new();
        let watcher = handle.clone();
        let watch = tokio::spawn(async move { watcher.closed().await });
        tokio::task::yield_now().await;
        handle.close();
        watch.await.unwrap();
    }
}
