//! The bounded wait-free ring each channel segment is made of.
//!
//! One contiguous allocation, two cache-line-padded index groups. Each side
//! owns its line: the authoritative index it publishes plus a cached copy of
//! the other side's index. The cached copy is only refreshed (one acquire
//! load) when the ring looks full or empty, so the hot path performs no
//! atomic loads at all.
//!
//! Unlike a split-handle ring, all protocol state lives in this one object.
//! Rings migrate between endpoints through the pool, and whoever holds a
//! side picks up exactly where the previous holder left off.

use std::cell::Cell;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

/// Producer-owned line: write index plus a cached view of the read index.
struct WritePos {
    tail: AtomicUsize,
    cached_head: Cell<usize>,
}

/// Consumer-owned line: read index plus a cached view of the write index.
struct ReadPos {
    head: AtomicUsize,
    cached_tail: Cell<usize>,
}

/// Fixed-capacity SPSC ring over `T` slots.
///
/// Indices grow without bound and are masked on access; capacity is rounded
/// up to a power of two (minimum 2).
pub(crate) struct RingBuffer<T> {
    write: CachePadded<WritePos>,
    read: CachePadded<ReadPos>,
    data_ptr: *mut T,
    capacity: usize,
    mask: usize,
}

// Safety: the ring is shared between exactly one producer thread (push side)
// and one consumer thread (pop side). The atomics synchronize slot hand-off;
// the `Cell` caches are only ever touched by their own side's single thread.
// That discipline is upheld by the owning handles, not by this type.
unsafe impl<T: Send> Send for RingBuffer<T> {}
unsafe impl<T: Send> Sync for RingBuffer<T> {}

impl<T> RingBuffer<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.next_power_of_two().max(2);

        // Vec guarantees alignment; we keep the raw parts and rebuild it in Drop.
        let data_ptr = {
            let mut v = Vec::<T>::with_capacity(capacity);
            let ptr = v.as_mut_ptr();
            std::mem::forget(v);
            ptr
        };

        Self {
            write: CachePadded::new(WritePos {
                tail: AtomicUsize::new(0),
                cached_head: Cell::new(0),
            }),
            read: CachePadded::new(ReadPos {
                head: AtomicUsize::new(0),
                cached_tail: Cell::new(0),
            }),
            data_ptr,
            capacity,
            mask: capacity - 1,
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Producer side. Returns the value when the ring is full.
    #[inline]
    pub(crate) fn push(&self, value: T) -> Result<(), T> {
        let tail = self.write.tail.load(Ordering::Relaxed);

        if tail.wrapping_sub(self.write.cached_head.get()) == self.capacity {
            let head = self.read.head.load(Ordering::Acquire);
            self.write.cached_head.set(head);
            if tail.wrapping_sub(head) == self.capacity {
                return Err(value);
            }
        }

        unsafe { self.data_ptr.add(tail & self.mask).write(value) };
        self.write.tail.store(tail.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Producer side. Moves `len` values out of `src` and publishes them
    /// with a single release store. Fails without side effects when fewer
    /// than `len` slots are free.
    ///
    /// # Safety
    ///
    /// `src` must be valid for `len` reads. On success the values are moved
    /// into the ring and the caller must forget its copies.
    #[inline]
    pub(crate) unsafe fn push_many(&self, src: *const T, len: usize) -> bool {
        let tail = self.write.tail.load(Ordering::Relaxed);

        if self.capacity - tail.wrapping_sub(self.write.cached_head.get()) < len {
            let head = self.read.head.load(Ordering::Acquire);
            self.write.cached_head.set(head);
            if self.capacity - tail.wrapping_sub(head) < len {
                return false;
            }
        }

        // The batch may wrap; at most two contiguous copies.
        let start = tail & self.mask;
        let first = len.min(self.capacity - start);
        unsafe {
            ptr::copy_nonoverlapping(src, self.data_ptr.add(start), first);
            ptr::copy_nonoverlapping(src.add(first), self.data_ptr, len - first);
        }
        self.write.tail.store(tail.wrapping_add(len), Ordering::Release);
        true
    }

    /// Producer advisory: whether a subsequent `push` would succeed.
    #[inline]
    pub(crate) fn has_space(&self) -> bool {
        let tail = self.write.tail.load(Ordering::Relaxed);
        if tail.wrapping_sub(self.write.cached_head.get()) < self.capacity {
            return true;
        }
        let head = self.read.head.load(Ordering::Acquire);
        self.write.cached_head.set(head);
        tail.wrapping_sub(head) < self.capacity
    }

    /// Consumer side. A `None` here has already refreshed the cached write
    /// index, so the caller can trust it as an up-to-date emptiness check.
    #[inline]
    pub(crate) fn pop(&self) -> Option<T> {
        let head = self.read.head.load(Ordering::Relaxed);

        if head == self.read.cached_tail.get() {
            let tail = self.write.tail.load(Ordering::Acquire);
            self.read.cached_tail.set(tail);
            if head == tail {
                return None;
            }
        }

        let value = unsafe { self.data_ptr.add(head & self.mask).read() };
        self.read.head.store(head.wrapping_add(1), Ordering::Release);
        Some(value)
    }

    /// Consumer advisory emptiness check.
    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.read.head.load(Ordering::Relaxed) == self.write.tail.load(Ordering::Acquire)
    }

    /// Advisory occupancy, callable from either side.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        let head = self.read.head.load(Ordering::Acquire);
        let tail = self.write.tail.load(Ordering::Acquire);
        tail.wrapping_sub(head)
    }

    /// Reinitializes a drained ring for reuse. Exclusive access (the `&mut`)
    /// is required because the cached indices are plain cells.
    pub(crate) fn reset(&mut self) {
        *self.write.tail.get_mut() = 0;
        self.write.cached_head.set(0);
        *self.read.head.get_mut() = 0;
        self.read.cached_tail.set(0);
    }
}

impl<T> Drop for RingBuffer<T> {
    fn drop(&mut self) {
        let head = *self.read.head.get_mut();
        let tail = *self.write.tail.get_mut();

        let mut pos = head;
        while pos != tail {
            unsafe { ptr::drop_in_place(self.data_ptr.add(pos & self.mask)) };
            pos = pos.wrapping_add(1);
        }

        unsafe {
            drop(Vec::from_raw_parts(self.data_ptr, 0, self.capacity));
        }
    }
}
