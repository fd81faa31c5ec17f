//! Recycling pool for channel segments.
//!
//! Two SPSC lanes in opposite directions. `in_flight` carries every ring the
//! producer has acquired, oldest first, until the consumer adopts it as the
//! read ring. `spares` carries drained, reset rings back for reuse and is
//! itself a bounded ring, which caps the pool's memory at
//! [`SPARE_CAPACITY`] idle segments.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

use super::chain::LinkQueue;
use super::ring::RingBuffer;

/// Upper bound on idle rings retained for reuse. Releases beyond this are
/// freed outright.
pub const SPARE_CAPACITY: usize = 32;

/// Acquire-side counters, written only by the producer.
struct AcquireStats {
    hits: AtomicUsize,
    misses: AtomicUsize,
}

/// Snapshot of the pool's counters. All values are advisory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Ring acquisitions served from the spare cache.
    pub hits: usize,
    /// Ring acquisitions that had to allocate.
    pub misses: usize,
    /// Reset rings currently idle in the spare cache.
    pub cached: usize,
    /// Rings acquired by the producer that the consumer has not reached yet
    /// (the current write ring included; the initial ring is not counted).
    pub chained: usize,
}

pub(crate) struct RingPool<T> {
    in_flight: LinkQueue<NonNull<RingBuffer<T>>>,
    spares: RingBuffer<Box<RingBuffer<T>>>,
    acquire_stats: CachePadded<AcquireStats>,
    chained: CachePadded<AtomicUsize>,
    ring_capacity: usize,
}

// Safety: the raw ring pointers in `in_flight` are owned by the queue while
// they sit in it; both lanes follow the SPSC discipline documented on their
// types. Payload hand-off across threads needs `T: Send`, nothing more.
unsafe impl<T: Send> Send for RingPool<T> {}
unsafe impl<T: Send> Sync for RingPool<T> {}

impl<T> RingPool<T> {
    pub(crate) fn new(ring_capacity: usize) -> Self {
        Self {
            in_flight: LinkQueue::new(),
            spares: RingBuffer::new(SPARE_CAPACITY),
            acquire_stats: CachePadded::new(AcquireStats {
                hits: AtomicUsize::new(0),
                misses: AtomicUsize::new(0),
            }),
            chained: CachePadded::new(AtomicUsize::new(0)),
            ring_capacity,
        }
    }

    /// Fills the spare cache with ready rings. Construction-time only, while
    /// the pool is still owned by one thread.
    pub(crate) fn prewarm(&self) {
        for _ in 0..SPARE_CAPACITY {
            if self
                .spares
                .push(Box::new(RingBuffer::new(self.ring_capacity)))
                .is_err()
            {
                break;
            }
        }
    }

    /// Producer side: hands out a ready ring and records it on `in_flight`
    /// so the consumer will find it in retirement order.
    pub(crate) fn acquire(&self) -> NonNull<RingBuffer<T>> {
        let ring = match self.spares.pop() {
            Some(boxed) => {
                self.acquire_stats.hits.fetch_add(1, Ordering::Relaxed);
                NonNull::from(Box::leak(boxed))
            }
            None => {
                self.acquire_stats.misses.fetch_add(1, Ordering::Relaxed);
                NonNull::from(Box::leak(Box::new(RingBuffer::new(self.ring_capacity))))
            }
        };
        self.in_flight.push(ring);
        self.chained.fetch_add(1, Ordering::Relaxed);
        ring
    }

    /// Consumer side: the oldest ring the producer has moved into, if any.
    pub(crate) fn take_next(&self) -> Option<NonNull<RingBuffer<T>>> {
        let ring = self.in_flight.pop()?;
        self.chained.fetch_sub(1, Ordering::Relaxed);
        Some(ring)
    }

    /// Consumer side: returns a drained ring for reuse, or frees it when the
    /// spare cache is already full.
    ///
    /// The caller must be the ring's sole owner; nothing else may reference
    /// it once it is released.
    pub(crate) fn release(&self, ring: NonNull<RingBuffer<T>>) {
        let mut boxed = unsafe { Box::from_raw(ring.as_ptr()) };
        boxed.reset();
        // A full cache means we are over the retention ceiling; let it go.
        let _ = self.spares.push(boxed);
    }

    pub(crate) fn stats(&self) -> PoolStats {
        PoolStats {
            hits: self.acquire_stats.hits.load(Ordering::Relaxed),
            misses: self.acquire_stats.misses.load(Ordering::Relaxed),
            cached: self.spares.len(),
            chained: self.chained.load(Ordering::Relaxed),
        }
    }
}

impl<T> Drop for RingPool<T> {
    fn drop(&mut self) {
        // Rings on the chain are raw and owned; reclaim them explicitly.
        // The spare cache holds boxes and cleans up after itself.
        while let Some(ring) = self.in_flight.pop() {
            unsafe { drop(Box::from_raw(ring.as_ptr())) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_then_hit() {
        let pool = RingPool::<u64>::new(8);
        assert_eq!(pool.stats(), PoolStats::default());

        let a = pool.acquire();
        assert_eq!(pool.stats().misses, 1);
        assert_eq!(pool.stats().chained, 1);

        let got = pool.take_next().unwrap();
        assert_eq!(got, a);
        pool.release(got);
        assert_eq!(pool.stats().cached, 1);
        assert_eq!(pool.stats().chained, 0);

        pool.acquire();
        let stats = pool.stats();
        assert_eq!((stats.misses, stats.hits, stats.cached), (1, 1, 0));
    }

    #[test]
    fn take_next_preserves_retirement_order() {
        let pool = RingPool::<u64>::new(4);
        let a = pool.acquire();
        let b = pool.acquire();
        let c = pool.acquire();
        assert_eq!(pool.take_next(), Some(a));
        assert_eq!(pool.take_next(), Some(b));
        assert_eq!(pool.take_next(), Some(c));
        assert_eq!(pool.take_next(), None);
        for ring in [a, b, c] {
            pool.release(ring);
        }
    }

    #[test]
    fn prewarm_fills_cache() {
        let pool = RingPool::<u64>::new(4);
        pool.prewarm();
        assert_eq!(pool.stats().cached, SPARE_CAPACITY);

        pool.acquire();
        let stats = pool.stats();
        assert_eq!((stats.hits, stats.misses), (1, 0));
        assert_eq!(stats.cached, SPARE_CAPACITY - 1);
    }

    #[test]
    fn release_drops_when_cache_full() {
        let pool = RingPool::<u64>::new(4);

        // More live rings than the cache may retain.
        let count = SPARE_CAPACITY + 2;
        for _ in 0..count {
            pool.acquire();
        }
        assert_eq!(pool.stats().misses, count);

        while let Some(ring) = pool.take_next() {
            pool.release(ring);
        }
        // The overflow rings were freed, not retained.
        assert_eq!(pool.stats().cached, SPARE_CAPACITY);
    }

    #[test]
    fn released_rings_come_back_reset() {
        let pool = RingPool::<u64>::new(4);
        let ring = pool.acquire();
        unsafe { ring.as_ref() }.push(7).unwrap();
        unsafe { ring.as_ref() }.pop().unwrap();

        pool.take_next().unwrap();
        pool.release(ring);

        let again = pool.acquire();
        let again_ref = unsafe { again.as_ref() };
        assert!(again_ref.is_empty());
        assert_eq!(again_ref.len(), 0);
        again_ref.push(9).unwrap();
        assert_eq!(again_ref.pop(), Some(9));
    }
}
