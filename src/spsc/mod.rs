//! Unbounded single-producer single-consumer channel.
//!
//! The channel is a chain of bounded wait-free rings. The producer owns the
//! write end of the chain, the consumer owns the read end, and a recycling
//! pool carries drained rings back to the producer so steady-state traffic
//! allocates nothing.
//!
//! # Example
//!
//! ```
//! use cascade_queue::spsc;
//!
//! let (tx, rx) = spsc::channel::<u64>(4);
//!
//! // Growable by default: pushing past the ring size chains a new ring.
//! for i in 0..10 {
//!     tx.try_send(i).unwrap();
//! }
//! for i in 0..10 {
//!     assert_eq!(rx.try_recv().unwrap(), i);
//! }
//! ```
//!
//! # Modes
//!
//! - Growable (default): `try_send` never reports full; a full ring is
//!   retired and a fresh one takes its place.
//! - Fixed-size ([`Builder::fixed_size`]): the channel is a single ring and
//!   `try_send` returns [`TrySendError::Full`] until the consumer catches
//!   up. Retry-later semantics, never an error state.
//!
//! # Disconnection
//!
//! Dropping either handle disconnects the channel. The producer observes
//! [`TrySendError::Disconnected`]; the consumer drains whatever is left and
//! then observes [`TryRecvError::Disconnected`].

mod batch;
mod chain;
mod pool;
mod ring;
mod sync;

pub use batch::{BatchSender, BATCH_CAPACITY};
pub use pool::{PoolStats, SPARE_CAPACITY};
pub use sync::{SharedReceiver, SharedSender};

use std::cell::Cell;
use std::fmt;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_utils::CachePadded;

use pool::RingPool;
use ring::RingBuffer;

/// Creates a growable SPSC channel whose rings hold `capacity` values.
///
/// The ring capacity is rounded up to the next power of two (minimum 2).
/// Equivalent to `Builder::new(capacity).build()`.
///
/// # Example
///
/// ```
/// let (tx, rx) = cascade_queue::spsc::channel::<String>(64);
///
/// tx.try_send("hello".to_string()).unwrap();
/// assert_eq!(rx.try_recv().unwrap(), "hello");
/// ```
pub fn channel<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    Builder::new(capacity).build()
}

/// Configures an SPSC channel before splitting it into its two handles.
///
/// # Example
///
/// ```
/// use cascade_queue::spsc::{Builder, TrySendError};
///
/// let (tx, rx) = Builder::new(2).fixed_size(true).build::<u32>();
///
/// tx.try_send(1).unwrap();
/// tx.try_send(2).unwrap();
/// assert!(matches!(tx.try_send(3), Err(TrySendError::Full(3))));
///
/// assert_eq!(rx.try_recv().unwrap(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct Builder {
    capacity: usize,
    fixed_size: bool,
    prewarm: bool,
}

impl Builder {
    /// Starts a configuration with the given per-ring capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            fixed_size: false,
            prewarm: false,
        }
    }

    /// Caps the channel at a single ring. `try_send` then reports
    /// [`TrySendError::Full`] instead of growing.
    pub fn fixed_size(mut self, fixed: bool) -> Self {
        self.fixed_size = fixed;
        self
    }

    /// Pre-populates the pool with [`SPARE_CAPACITY`] ready rings so early
    /// growth never allocates.
    pub fn prewarm(mut self, prewarm: bool) -> Self {
        self.prewarm = prewarm;
        self
    }

    /// Builds the channel and returns its two endpoint handles.
    pub fn build<T>(self) -> (Sender<T>, Receiver<T>) {
        // The first ring belongs to the endpoints, not the pool; both sides
        // start on it.
        let first = NonNull::from(Box::leak(Box::new(RingBuffer::<T>::new(self.capacity))));
        let capacity = unsafe { first.as_ref() }.capacity();

        let pool = RingPool::new(self.capacity);
        if self.prewarm {
            pool.prewarm();
        }

        let shared = NonNull::from(Box::leak(Box::new(Shared {
            write: CachePadded::new(AtomicPtr::new(first.as_ptr())),
            pushed: CachePadded::new(AtomicUsize::new(0)),
            popped: CachePadded::new(AtomicUsize::new(0)),
            pool,
            capacity,
            fixed_size: self.fixed_size,
            sender_gone: AtomicBool::new(false),
            receiver_gone: AtomicBool::new(false),
            ref_count: AtomicUsize::new(2),
            parked_read: AtomicPtr::new(ptr::null_mut()),
        })));

        (
            Sender {
                shared,
                write: Cell::new(first),
                pushed: Cell::new(0),
            },
            Receiver {
                shared,
                read: Cell::new(first),
                popped: Cell::new(0),
            },
        )
    }
}

/// State shared by the two handles. Fields written by different endpoints
/// sit on separate cache lines.
struct Shared<T> {
    /// Current write ring, published by the producer when it moves on. The
    /// consumer compares it against its read ring to tell "drained for now"
    /// from "drained for good".
    write: CachePadded<AtomicPtr<RingBuffer<T>>>,
    /// Producer's lifetime push count.
    pushed: CachePadded<AtomicUsize>,
    /// Consumer's lifetime pop count.
    popped: CachePadded<AtomicUsize>,
    pool: RingPool<T>,
    capacity: usize,
    fixed_size: bool,
    sender_gone: AtomicBool,
    receiver_gone: AtomicBool,
    ref_count: AtomicUsize,
    /// Where the receiver leaves its read ring at drop so the last handle
    /// can free it.
    parked_read: AtomicPtr<RingBuffer<T>>,
}

/// Drops one handle's reference to the shared state; the second caller
/// tears everything down.
///
/// # Safety
///
/// Must be called exactly once per handle, from its `Drop`. The pointer must
/// not be used afterwards.
unsafe fn release_shared<T>(shared: NonNull<Shared<T>>) {
    let state = unsafe { shared.as_ref() };
    if state.ref_count.fetch_sub(1, Ordering::AcqRel) == 1 {
        let parked = state.parked_read.load(Ordering::Acquire);
        // The pool frees every ring it still owns, which covers the write
        // ring whenever it differs from the parked read ring.
        unsafe { drop(Box::from_raw(shared.as_ptr())) };
        if !parked.is_null() {
            unsafe { drop(Box::from_raw(parked)) };
        }
    }
}

/// The sending half of the channel.
///
/// Owned by a single thread at a time (`Send` but not `Sync`). Convert with
/// [`Sender::into_batched`] for burst publication or
/// [`Sender::into_shared`] to admit additional producer threads.
pub struct Sender<T> {
    shared: NonNull<Shared<T>>,
    /// Current write ring. Aliases a ring owned by the chain (or the
    /// initial ring); never freed through this handle.
    write: Cell<NonNull<RingBuffer<T>>>,
    pushed: Cell<usize>,
}

// Safety: the handle migrates between threads whole; all cross-thread state
// it touches is synchronized through the shared cell and the rings.
unsafe impl<T: Send> Send for Sender<T> {}

impl<T> Sender<T> {
    /// Attempts to enqueue a value.
    ///
    /// On a growable channel this fails only when the receiver has been
    /// dropped. On a fixed-size channel a full ring yields
    /// [`TrySendError::Full`], returning the value for a later retry.
    ///
    /// # Example
    ///
    /// ```
    /// let (tx, rx) = cascade_queue::spsc::channel::<u32>(8);
    ///
    /// tx.try_send(7).unwrap();
    /// drop(rx);
    /// assert!(tx.try_send(8).is_err());
    /// ```
    #[inline]
    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        let shared = unsafe { self.shared.as_ref() };
        if shared.receiver_gone.load(Ordering::Relaxed) {
            return Err(TrySendError::Disconnected(value));
        }

        let write = self.write.get();
        let ring = unsafe { write.as_ref() };
        match ring.push(value) {
            Ok(()) => {
                self.record_push(1);
                Ok(())
            }
            Err(value) => self.try_send_slow(value),
        }
    }

    #[cold]
    fn try_send_slow(&self, value: T) -> Result<(), TrySendError<T>> {
        let shared = unsafe { self.shared.as_ref() };
        if shared.fixed_size {
            return Err(TrySendError::Full(value));
        }

        // `acquire` records the fresh ring on the chain before we publish
        // it, so a consumer that observes the new write ring is guaranteed
        // to find it there.
        let fresh = shared.pool.acquire();
        shared.write.store(fresh.as_ptr(), Ordering::Release);
        self.write.set(fresh);

        let ring = unsafe { fresh.as_ref() };
        if ring.push(value).is_err() {
            unreachable!("fresh ring rejected a push");
        }
        self.record_push(1);
        Ok(())
    }

    #[inline]
    fn record_push(&self, n: usize) {
        let shared = unsafe { self.shared.as_ref() };
        let total = self.pushed.get().wrapping_add(n);
        self.pushed.set(total);
        shared.pushed.store(total, Ordering::Relaxed);
    }

    /// Whether the current write ring has room for at least one more value
    /// without retiring it. Advisory; mainly useful in fixed-size mode.
    #[inline]
    pub fn available(&self) -> bool {
        let write = self.write.get();
        unsafe { write.as_ref() }.has_space()
    }

    /// The effective per-ring capacity (requested capacity rounded up to a
    /// power of two).
    #[inline]
    pub fn capacity(&self) -> usize {
        unsafe { self.shared.as_ref() }.capacity
    }

    /// Approximate number of values currently enqueued.
    ///
    /// A snapshot of two counters updated independently; may be stale the
    /// moment it returns.
    #[inline]
    pub fn len(&self) -> usize {
        let shared = unsafe { self.shared.as_ref() };
        let popped = shared.popped.load(Ordering::Relaxed);
        let pushed = shared.pushed.load(Ordering::Relaxed);
        pushed.saturating_sub(popped)
    }

    /// Whether the channel appears empty. Advisory, like [`Sender::len`].
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the receiving half has been dropped. May be stale.
    #[inline]
    pub fn is_disconnected(&self) -> bool {
        unsafe { self.shared.as_ref() }.receiver_gone.load(Ordering::Relaxed)
    }

    /// Counters of the segment pool behind this channel.
    pub fn pool_stats(&self) -> PoolStats {
        unsafe { self.shared.as_ref() }.pool.stats()
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        unsafe { self.shared.as_ref() }
            .sender_gone
            .store(true, Ordering::Release);
        unsafe { release_shared(self.shared) };
    }
}

impl<T> fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender")
            .field("capacity", &self.capacity())
            .field("disconnected", &self.is_disconnected())
            .finish_non_exhaustive()
    }
}

/// The receiving half of the channel.
///
/// Owned by a single thread at a time (`Send` but not `Sync`). Convert with
/// [`Receiver::into_shared`] to admit additional consumer threads.
pub struct Receiver<T> {
    shared: NonNull<Shared<T>>,
    /// Current read ring. Owned by this handle until released to the pool.
    read: Cell<NonNull<RingBuffer<T>>>,
    popped: Cell<usize>,
}

// Safety: as for `Sender`.
unsafe impl<T: Send> Send for Receiver<T> {}

impl<T> Receiver<T> {
    /// Attempts to dequeue the oldest value.
    ///
    /// # Errors
    ///
    /// [`TryRecvError::Empty`] when no value is ready;
    /// [`TryRecvError::Disconnected`] when the sender is gone and everything
    /// it sent has been drained.
    ///
    /// # Example
    ///
    /// ```
    /// use cascade_queue::spsc::{self, TryRecvError};
    ///
    /// let (tx, rx) = spsc::channel::<u32>(8);
    ///
    /// assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    /// tx.try_send(3).unwrap();
    /// assert_eq!(rx.try_recv().unwrap(), 3);
    /// ```
    #[inline]
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        let read = self.read.get();
        let ring = unsafe { read.as_ref() };
        if let Some(value) = ring.pop() {
            self.record_pop();
            return Ok(value);
        }
        self.try_recv_slow()
    }

    #[cold]
    fn try_recv_slow(&self) -> Result<T, TryRecvError> {
        let shared = unsafe { self.shared.as_ref() };
        let read = self.read.get();
        let ring = unsafe { read.as_ref() };

        if ptr::eq(shared.write.load(Ordering::Acquire), read.as_ptr()) {
            // Nothing beyond this ring. Look once more before reporting
            // disconnection; the sender may have pushed right before going.
            if shared.sender_gone.load(Ordering::Acquire) {
                return match ring.pop() {
                    Some(value) => {
                        self.record_pop();
                        Ok(value)
                    }
                    None => Err(TryRecvError::Disconnected),
                };
            }
            return Err(TryRecvError::Empty);
        }

        // The writer has moved on. Re-check this ring before advancing: a
        // value may have landed here between our failed pop and the move,
        // and advancing past it would lose it.
        if let Some(value) = ring.pop() {
            self.record_pop();
            return Ok(value);
        }

        match shared.pool.take_next() {
            Some(next) => {
                shared.pool.release(read);
                self.read.set(next);
                let ring = unsafe { next.as_ref() };
                match ring.pop() {
                    Some(value) => {
                        self.record_pop();
                        Ok(value)
                    }
                    // Caught up with a freshly acquired write ring.
                    None => Err(TryRecvError::Empty),
                }
            }
            // Stale view of the write ring; the chain entry is on its way.
            None => Err(TryRecvError::Empty),
        }
    }

    #[inline]
    fn record_pop(&self) {
        let shared = unsafe { self.shared.as_ref() };
        let total = self.popped.get().wrapping_add(1);
        self.popped.set(total);
        shared.popped.store(total, Ordering::Relaxed);
    }

    /// Receives a value, sleeping `poll` between attempts while the channel
    /// is empty. The only blocking entry point in the crate.
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// let (tx, rx) = cascade_queue::spsc::channel::<u32>(8);
    /// tx.try_send(11).unwrap();
    /// assert_eq!(rx.recv(Duration::from_micros(10)).unwrap(), 11);
    /// ```
    pub fn recv(&self, poll: Duration) -> Result<T, RecvError> {
        loop {
            match self.try_recv() {
                Ok(value) => return Ok(value),
                Err(TryRecvError::Empty) => thread::sleep(poll),
                Err(TryRecvError::Disconnected) => return Err(RecvError),
            }
        }
    }

    /// Whether the channel is empty from the consumer's point of view: the
    /// read ring is drained and the writer has nothing chained after it.
    /// May be stale the moment it returns.
    #[inline]
    pub fn is_empty(&self) -> bool {
        let shared = unsafe { self.shared.as_ref() };
        let read = self.read.get();
        let ring = unsafe { read.as_ref() };
        ring.is_empty() && ptr::eq(shared.write.load(Ordering::Acquire), read.as_ptr())
    }

    /// Approximate number of values currently enqueued. See [`Sender::len`].
    #[inline]
    pub fn len(&self) -> usize {
        let shared = unsafe { self.shared.as_ref() };
        let popped = shared.popped.load(Ordering::Relaxed);
        let pushed = shared.pushed.load(Ordering::Relaxed);
        pushed.saturating_sub(popped)
    }

    /// The effective per-ring capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        unsafe { self.shared.as_ref() }.capacity
    }

    /// Whether the sending half has been dropped. Values it already sent
    /// remain receivable.
    #[inline]
    pub fn is_disconnected(&self) -> bool {
        unsafe { self.shared.as_ref() }.sender_gone.load(Ordering::Relaxed)
    }

    /// Counters of the segment pool behind this channel.
    pub fn pool_stats(&self) -> PoolStats {
        unsafe { self.shared.as_ref() }.pool.stats()
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        let shared = unsafe { self.shared.as_ref() };
        shared
            .parked_read
            .store(self.read.get().as_ptr(), Ordering::Release);
        shared.receiver_gone.store(true, Ordering::Release);
        unsafe { release_shared(self.shared) };
    }
}

impl<T> fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("capacity", &self.capacity())
            .field("disconnected", &self.is_disconnected())
            .finish_non_exhaustive()
    }
}

/// Error returned by [`Sender::try_send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrySendError<T> {
    /// The channel is fixed-size and its ring is full. Contains the value
    /// that could not be sent; retry later.
    Full(T),
    /// The receiver has been dropped. Contains the value that could not be
    /// sent.
    Disconnected(T),
}

impl<T> TrySendError<T> {
    /// Returns the value that could not be sent.
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(value) | Self::Disconnected(value) => value,
        }
    }

    /// Returns `true` for the `Full` variant.
    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }

    /// Returns `true` for the `Disconnected` variant.
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected(_))
    }
}

impl<T: fmt::Debug> fmt::Display for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => write!(f, "channel is full"),
            Self::Disconnected(_) => write!(f, "receiver disconnected"),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for TrySendError<T> {}

/// Error returned by [`Receiver::try_recv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    /// No value is currently ready.
    Empty,
    /// The sender has been dropped and the channel is drained.
    Disconnected,
}

impl TryRecvError {
    /// Returns `true` for the `Empty` variant.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Returns `true` for the `Disconnected` variant.
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

impl fmt::Display for TryRecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "channel is empty"),
            Self::Disconnected => write!(f, "sender disconnected"),
        }
    }
}

impl std::error::Error for TryRecvError {}

/// Error returned by [`Receiver::recv`] when the sender is gone and the
/// channel is drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecvError;

impl fmt::Display for RecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sender disconnected")
    }
}

impl std::error::Error for RecvError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let (tx, rx) = channel::<u64>(8);
        tx.try_send(42).unwrap();
        assert_eq!(rx.try_recv().unwrap(), 42);
        assert!(rx.is_empty());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn fixed_size_fills_then_rejects() {
        let (tx, rx) = Builder::new(8).fixed_size(true).build::<u64>();

        for i in 1..=8 {
            tx.try_send(i).unwrap();
        }
        assert!(!tx.available());
        assert!(matches!(tx.try_send(9), Err(TrySendError::Full(9))));

        for want in 1..=8 {
            assert_eq!(rx.try_recv().unwrap(), want);
        }
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        // Retry-later semantics: draining made room.
        tx.try_send(9).unwrap();
        assert_eq!(rx.try_recv().unwrap(), 9);
    }

    #[test]
    fn grows_across_rings_and_recycles() {
        let (tx, rx) = channel::<u64>(4);

        for i in 1..=4 {
            tx.try_send(i).unwrap();
        }
        assert_eq!(tx.pool_stats().misses, 0);

        tx.try_send(5).unwrap();
        assert_eq!(tx.pool_stats().misses, 1);

        for i in 6..=8 {
            tx.try_send(i).unwrap();
        }
        tx.try_send(9).unwrap();
        assert_eq!(tx.pool_stats().misses, 2);
        tx.try_send(10).unwrap();

        assert_eq!(tx.len(), 10);
        assert_eq!(tx.pool_stats().chained, 2);

        for want in 1..=4 {
            assert_eq!(rx.try_recv().unwrap(), want);
        }
        assert_eq!(rx.pool_stats().cached, 0);

        // Advancing past the first ring hands it back to the pool.
        assert_eq!(rx.try_recv().unwrap(), 5);
        assert_eq!(rx.pool_stats().cached, 1);

        for want in 6..=8 {
            assert_eq!(rx.try_recv().unwrap(), want);
        }
        assert_eq!(rx.try_recv().unwrap(), 9);
        assert_eq!(rx.pool_stats().cached, 2);

        assert_eq!(rx.try_recv().unwrap(), 10);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert!(rx.is_empty());
        assert_eq!(rx.len(), 0);
    }

    #[test]
    fn prewarmed_pool_never_allocates_early() {
        let (tx, rx) = Builder::new(4).prewarm(true).build::<u64>();

        for i in 1..=12 {
            tx.try_send(i).unwrap();
        }
        let stats = tx.pool_stats();
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.hits, 2);

        for want in 1..=12 {
            assert_eq!(rx.try_recv().unwrap(), want);
        }
    }

    #[test]
    fn orders_across_many_rings() {
        let (tx, rx) = channel::<u64>(2);
        for i in 0..50 {
            tx.try_send(i).unwrap();
        }
        for want in 0..50 {
            assert_eq!(rx.try_recv().unwrap(), want);
        }
        assert!(rx.is_empty());
    }

    #[test]
    fn interleaved_traffic_reuses_rings() {
        let (tx, rx) = channel::<u64>(2);
        for round in 0..200u64 {
            tx.try_send(round * 2).unwrap();
            tx.try_send(round * 2 + 1).unwrap();
            tx.try_send(round * 2 + 2).unwrap();
            assert_eq!(rx.try_recv().unwrap(), round * 2);
            assert_eq!(rx.try_recv().unwrap(), round * 2 + 1);
            assert_eq!(rx.try_recv().unwrap(), round * 2 + 2);
            // keep the streams aligned
            tx.try_send(round * 2 + 3).unwrap();
            rx.try_recv().unwrap();
        }
        // Steady state runs out of the recycled rings, not fresh memory.
        assert!(rx.pool_stats().misses <= SPARE_CAPACITY);
    }

    #[test]
    fn available_tracks_current_ring() {
        let (tx, _rx) = channel::<u64>(2);
        assert!(tx.available());
        tx.try_send(1).unwrap();
        tx.try_send(2).unwrap();
        assert!(!tx.available());
        tx.try_send(3).unwrap();
        assert!(tx.available());
    }

    #[test]
    fn empty_is_stable_when_quiescent() {
        let (tx, rx) = channel::<u64>(4);
        assert!(rx.is_empty());
        tx.try_send(1).unwrap();
        assert!(!rx.is_empty());
        rx.try_recv().unwrap();
        assert!(rx.is_empty());
        assert!(rx.is_empty());
    }

    #[test]
    fn sender_disconnect_drains_then_reports() {
        let (tx, rx) = channel::<u64>(2);
        for i in 0..6 {
            tx.try_send(i).unwrap();
        }
        drop(tx);

        assert!(rx.is_disconnected());
        for want in 0..6 {
            assert_eq!(rx.try_recv().unwrap(), want);
        }
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Disconnected)));
        assert_eq!(rx.recv(Duration::from_micros(1)), Err(RecvError));
    }

    #[test]
    fn receiver_disconnect_rejects_push() {
        let (tx, rx) = channel::<u64>(4);
        drop(rx);
        assert!(tx.is_disconnected());
        assert!(matches!(
            tx.try_send(1),
            Err(TrySendError::Disconnected(1))
        ));
    }

    #[test]
    fn values_dropped_exactly_once() {
        use std::sync::atomic::AtomicUsize;
        use std::sync::Arc;

        struct Counted(Arc<AtomicUsize>);
        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let drops = Arc::new(AtomicUsize::new(0));
        {
            let (tx, rx) = channel::<Counted>(4);
            for _ in 0..100 {
                assert!(tx.try_send(Counted(Arc::clone(&drops))).is_ok());
            }
            for _ in 0..30 {
                drop(rx.try_recv());
            }
            assert_eq!(drops.load(Ordering::SeqCst), 30);
            drop(rx);
            drop(tx);
        }
        // 30 popped, the rest freed with the rings at teardown.
        assert_eq!(drops.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn cross_thread_stress() {
        const COUNT: u64 = 100_000;

        let (tx, rx) = channel::<u64>(8);
        let producer = thread::spawn(move || {
            for i in 0..COUNT {
                tx.try_send(i).unwrap();
            }
        });

        let mut expected = 0u64;
        while expected < COUNT {
            match rx.try_recv() {
                Ok(v) => {
                    assert_eq!(v, expected);
                    expected += 1;
                }
                Err(TryRecvError::Empty) => std::hint::spin_loop(),
                Err(TryRecvError::Disconnected) => panic!("producer left early"),
            }
        }
        producer.join().unwrap();
        assert!(rx.is_empty());
    }

    #[test]
    fn cross_thread_stress_fixed_size() {
        const COUNT: u64 = 50_000;

        let (tx, rx) = Builder::new(8).fixed_size(true).build::<u64>();
        let producer = thread::spawn(move || {
            for i in 0..COUNT {
                let mut value = i;
                loop {
                    match tx.try_send(value) {
                        Ok(()) => break,
                        Err(TrySendError::Full(v)) => {
                            value = v;
                            std::hint::spin_loop();
                        }
                        Err(TrySendError::Disconnected(_)) => panic!("consumer left early"),
                    }
                }
            }
        });

        let mut expected = 0u64;
        while expected < COUNT {
            if let Ok(v) = rx.try_recv() {
                assert_eq!(v, expected);
                expected += 1;
            } else {
                std::hint::spin_loop();
            }
        }
        producer.join().unwrap();
    }

    #[test]
    fn len_is_advisory_but_bounded() {
        let (tx, rx) = channel::<u64>(4);
        for i in 0..10 {
            tx.try_send(i).unwrap();
        }
        assert_eq!(tx.len(), 10);
        assert_eq!(rx.len(), 10);
        for _ in 0..3 {
            rx.try_recv().unwrap();
        }
        assert_eq!(rx.len(), 7);
    }
}
