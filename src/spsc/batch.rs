//! Burst publication for the sending side.
//!
//! Scalar sends publish one release store per value, which keeps the
//! consumer's cache line bouncing. A [`BatchSender`] stages values in a
//! thread-local buffer and publishes up to [`BATCH_CAPACITY`] of them with
//! a single store, cutting the hand-off traffic at the cost of latency for
//! values sitting in the stage.

use std::fmt;
use std::mem::{self, MaybeUninit};
use std::ptr;
use std::sync::atomic::Ordering;

use super::Sender;

/// Number of values staged locally before a batch is published.
pub const BATCH_CAPACITY: usize = 16;

impl<T> Sender<T> {
    /// Converts this sender into a batching one.
    ///
    /// Fails, handing the sender back unchanged, when the channel is
    /// fixed-size or its rings are not strictly larger than
    /// [`BATCH_CAPACITY`]: a batch must always fit into a fresh ring.
    ///
    /// # Example
    ///
    /// ```
    /// let (tx, rx) = cascade_queue::spsc::channel::<u32>(64);
    /// let mut tx = tx.into_batched().unwrap();
    ///
    /// tx.send(1);
    /// tx.send(2);
    /// tx.flush();
    /// assert_eq!(rx.try_recv().unwrap(), 1);
    /// assert_eq!(rx.try_recv().unwrap(), 2);
    /// ```
    pub fn into_batched(self) -> Result<BatchSender<T>, Sender<T>> {
        let shared = unsafe { self.shared.as_ref() };
        if shared.fixed_size || shared.capacity <= BATCH_CAPACITY {
            return Err(self);
        }
        Ok(BatchSender {
            inner: self,
            staged: unsafe { MaybeUninit::<[MaybeUninit<T>; BATCH_CAPACITY]>::uninit().assume_init() },
            len: 0,
        })
    }
}

/// A sender that publishes values in bursts.
///
/// Values handed to [`send`](BatchSender::send) become visible to the
/// consumer when the stage fills, on [`flush`](BatchSender::flush), or when
/// the handle is dropped. Only available on growable channels, so staging
/// and publication never fail.
pub struct BatchSender<T> {
    inner: Sender<T>,
    staged: [MaybeUninit<T>; BATCH_CAPACITY],
    len: usize,
}

impl<T> BatchSender<T> {
    /// Stages a value, publishing the whole batch once the stage is full.
    #[inline]
    pub fn send(&mut self, value: T) {
        self.staged[self.len].write(value);
        self.len += 1;
        if self.len == BATCH_CAPACITY {
            self.commit();
        }
    }

    /// Publishes any staged values immediately.
    #[inline]
    pub fn flush(&mut self) {
        if self.len > 0 {
            self.commit();
        }
    }

    fn commit(&mut self) {
        let shared = unsafe { self.inner.shared.as_ref() };
        let len = self.len;
        let src = self.staged.as_ptr() as *const T;

        let write = self.inner.write.get();
        let ring = unsafe { write.as_ref() };
        // Safety: staged[..len] is initialized; a successful publish moves
        // the values out, and `len = 0` below forgets our copies.
        if !unsafe { ring.push_many(src, len) } {
            // Same advance as the scalar path: chain first, publish second.
            let fresh = shared.pool.acquire();
            shared.write.store(fresh.as_ptr(), Ordering::Release);
            self.inner.write.set(fresh);

            let ring = unsafe { fresh.as_ref() };
            if !unsafe { ring.push_many(src, len) } {
                unreachable!("batch larger than a fresh ring");
            }
        }

        self.len = 0;
        self.inner.record_push(len);
    }

    /// Number of values staged but not yet published.
    #[inline]
    pub fn staged(&self) -> usize {
        self.len
    }

    /// The effective per-ring capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Whether the receiving half has been dropped. Staged and published
    /// values are reclaimed at teardown either way.
    #[inline]
    pub fn is_disconnected(&self) -> bool {
        self.inner.is_disconnected()
    }

    /// Flushes and returns the underlying scalar sender.
    pub fn into_inner(mut self) -> Sender<T> {
        self.flush();
        // Safety: the stage is empty after the flush; we take `inner` out
        // and forget `self` so nothing is dropped twice.
        let inner = unsafe { ptr::read(&self.inner) };
        mem::forget(self);
        inner
    }
}

impl<T> Drop for BatchSender<T> {
    fn drop(&mut self) {
        self.flush();
    }
}

impl<T> fmt::Debug for BatchSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchSender")
            .field("staged", &self.len)
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}
