//! Unbounded SPSC FIFO of heap nodes.
//!
//! This is the hand-off lane between the two endpoints: the producer links
//! a node per retired ring, the consumer follows the links in order. A stub
//! node keeps push and pop on disjoint ends so neither side ever touches
//! the other's pointer.

use std::cell::Cell;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crossbeam_utils::CachePadded;

struct Node<T> {
    next: AtomicPtr<Node<T>>,
    value: MaybeUninit<T>,
}

impl<T> Node<T> {
    fn alloc(value: MaybeUninit<T>) -> *mut Self {
        Box::into_raw(Box::new(Node {
            next: AtomicPtr::new(ptr::null_mut()),
            value,
        }))
    }
}

/// Linked SPSC queue. One allocation per push, freed on pop.
///
/// The node whose value has already been taken (or the initial stub) serves
/// as the consumer's anchor; values always live one link ahead of it.
pub(crate) struct LinkQueue<T> {
    /// Producer-owned: most recently linked node.
    tail: CachePadded<Cell<*mut Node<T>>>,
    /// Consumer-owned: current stub node, its value slot vacant.
    head: CachePadded<Cell<*mut Node<T>>>,
}

// Safety: single producer touches `tail`, single consumer touches `head`,
// and node hand-off goes through the release/acquire pair on `next`. The
// owning pool enforces that discipline.
unsafe impl<T: Send> Send for LinkQueue<T> {}
unsafe impl<T: Send> Sync for LinkQueue<T> {}

impl<T> LinkQueue<T> {
    pub(crate) fn new() -> Self {
        let stub = Node::alloc(MaybeUninit::uninit());
        Self {
            tail: CachePadded::new(Cell::new(stub)),
            head: CachePadded::new(Cell::new(stub)),
        }
    }

    /// Producer side.
    pub(crate) fn push(&self, value: T) {
        let node = Node::alloc(MaybeUninit::new(value));
        let prev = self.tail.get();
        // Publishing the link is what makes the value visible downstream.
        unsafe { (*prev).next.store(node, Ordering::Release) };
        self.tail.set(node);
    }

    /// Consumer side.
    pub(crate) fn pop(&self) -> Option<T> {
        let stub = self.head.get();
        let next = unsafe { (*stub).next.load(Ordering::Acquire) };
        if next.is_null() {
            return None;
        }

        let value = unsafe { (*next).value.assume_init_read() };
        self.head.set(next);
        // `next` is the new stub; the old one is done.
        unsafe { drop(Box::from_raw(stub)) };
        Some(value)
    }
}

impl<T> Drop for LinkQueue<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
        unsafe { drop(Box::from_raw(self.head.get())) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fifo_order() {
        let q = LinkQueue::new();
        assert_eq!(q.pop(), None);
        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.pop(), Some(1));
        q.push(4);
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
        assert_eq!(q.pop(), Some(4));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn drop_frees_remaining_values() {
        struct Counted(Arc<AtomicUsize>);
        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let drops = Arc::new(AtomicUsize::new(0));
        {
            let q = LinkQueue::new();
            for _ in 0..10 {
                q.push(Counted(Arc::clone(&drops)));
            }
            drop(q.pop());
            assert_eq!(drops.load(Ordering::SeqCst), 1);
        }
        assert_eq!(drops.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn cross_thread_hand_off() {
        let q = Arc::new(LinkQueue::new());
        let producer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                for i in 0..10_000u64 {
                    q.push(i);
                }
            })
        };

        let mut expected = 0u64;
        while expected < 10_000 {
            if let Some(v) = q.pop() {
                assert_eq!(v, expected);
                expected += 1;
            } else {
                std::hint::spin_loop();
            }
        }
        producer.join().unwrap();
    }
}
