//! Coarse-locked endpoint adapters.
//!
//! A [`SharedSender`] or [`SharedReceiver`] puts one spinlock in front of
//! an endpoint so several threads can use it. FIFO order across producers
//! follows lock acquisition order. Throughput does not scale with the
//! thread count; this is a convenience for occasional extra endpoints, and
//! sustained multi-producer traffic belongs on an MPMC queue.
//!
//! The two locks are independent and each padded to its own cache line, so
//! the producer side and consumer side never contend with each other.

use std::fmt;
use std::hint;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_utils::CachePadded;

use super::{Receiver, Sender, TryRecvError, TrySendError};

/// Test-and-test-and-set spinlock with an RAII guard.
struct SpinLock {
    locked: AtomicBool,
}

impl SpinLock {
    const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> SpinGuard<'_> {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            // Spin on the read until the holder is gone.
            while self.locked.load(Ordering::Relaxed) {
                hint::spin_loop();
            }
        }
        SpinGuard { lock: self }
    }
}

struct SpinGuard<'a> {
    lock: &'a SpinLock,
}

impl Drop for SpinGuard<'_> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

impl<T> Sender<T> {
    /// Wraps this sender behind a spinlock so multiple threads may share it
    /// (typically via an `Arc`).
    pub fn into_shared(self) -> SharedSender<T> {
        SharedSender {
            lock: CachePadded::new(SpinLock::new()),
            inner: self,
        }
    }
}

impl<T> Receiver<T> {
    /// Wraps this receiver behind a spinlock so multiple threads may share
    /// it (typically via an `Arc`).
    pub fn into_shared(self) -> SharedReceiver<T> {
        SharedReceiver {
            lock: CachePadded::new(SpinLock::new()),
            inner: self,
        }
    }
}

/// A sender shareable between threads, serialized by a spinlock.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// let (tx, rx) = cascade_queue::spsc::channel::<u32>(8);
/// let tx = Arc::new(tx.into_shared());
///
/// let tx2 = Arc::clone(&tx);
/// tx.try_send(1).unwrap();
/// tx2.try_send(2).unwrap();
/// assert_eq!(rx.try_recv().unwrap(), 1);
/// assert_eq!(rx.try_recv().unwrap(), 2);
/// ```
pub struct SharedSender<T> {
    lock: CachePadded<SpinLock>,
    inner: Sender<T>,
}

// Safety: every touch of `inner` happens under the lock, so the wrapped
// sender still sees single-threaded access.
unsafe impl<T: Send> Send for SharedSender<T> {}
unsafe impl<T: Send> Sync for SharedSender<T> {}

impl<T> SharedSender<T> {
    /// Locked [`Sender::try_send`]. Scalar sends only; batching does not
    /// combine with a shared producer lock.
    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        let _guard = self.lock.lock();
        self.inner.try_send(value)
    }

    /// Approximate number of values currently enqueued.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the channel appears empty. Advisory.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// The effective per-ring capacity.
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Unwraps the exclusive sender. Safe because `self` is consumed.
    pub fn into_inner(self) -> Sender<T> {
        self.inner
    }
}

impl<T> fmt::Debug for SharedSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSender")
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}

/// A receiver shareable between threads, serialized by a spinlock.
pub struct SharedReceiver<T> {
    lock: CachePadded<SpinLock>,
    inner: Receiver<T>,
}

// Safety: as for `SharedSender`.
unsafe impl<T: Send> Send for SharedReceiver<T> {}
unsafe impl<T: Send> Sync for SharedReceiver<T> {}

impl<T> SharedReceiver<T> {
    /// Locked [`Receiver::try_recv`].
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        let _guard = self.lock.lock();
        self.inner.try_recv()
    }

    /// Approximate number of values currently enqueued.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the channel appears empty. Advisory. Takes the lock, since
    /// the exclusive check walks consumer-side state.
    pub fn is_empty(&self) -> bool {
        let _guard = self.lock.lock();
        self.inner.is_empty()
    }

    /// The effective per-ring capacity.
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Unwraps the exclusive receiver. Safe because `self` is consumed.
    pub fn into_inner(self) -> Receiver<T> {
        self.inner
    }
}

impl<T> fmt::Debug for SharedReceiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedReceiver")
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}
