//! Unbounded lock-free SPSC queue for latency-critical pipelines.
//!
//! `cascade-queue` provides a single-producer, single-consumer FIFO that
//! grows on demand: values move through a chain of bounded wait-free ring
//! buffers, and drained rings are recycled through a small pool so steady
//! state allocates nothing.
//!
//! # Quick Start
//!
//! ```
//! use cascade_queue::spsc;
//!
//! let (tx, rx) = spsc::channel::<u64>(1024);
//!
//! tx.try_send(42).unwrap();
//! assert_eq!(rx.try_recv().unwrap(), 42);
//! ```
//!
//! # Design
//!
//! The producer writes into its current ring; when the ring fills, it pulls
//! a fresh one from the pool and keeps going. The consumer drains its
//! current ring and then advances along the chain, handing each exhausted
//! ring back to the pool. Neither side ever blocks, takes a lock, or issues
//! a compare-and-swap: the hot path is a slot write plus one release store.
//!
//! Three access modes are layered on the same core:
//!
//! - [`spsc::channel`] / [`spsc::Builder`]: the plain split-handle channel,
//!   optionally fixed-size (push reports full instead of growing).
//! - [`spsc::BatchSender`]: stages values locally and publishes them in
//!   bursts of up to 16, trading latency for fewer cache-line handoffs.
//! - [`spsc::SharedSender`] / [`spsc::SharedReceiver`]: spinlock-guarded
//!   endpoints for the occasional extra producer or consumer. Safe, FIFO,
//!   and deliberately not scalable; workloads with sustained multi-producer
//!   contention belong on an MPMC queue instead.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, missing_debug_implementations)]

pub mod spsc;
