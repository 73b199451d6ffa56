//! The transmit permit
//!
//! There's one write request, so at most one frame can be in flight. A
//! counting semaphore, initialized to one, guards it: the TX path waits
//! before claiming the request, and the write completion posts.

use core::sync::atomic::{AtomicBool, Ordering};

/// The wait was interrupted before the semaphore was available
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

/// A counting semaphore
pub trait Semaphore {
    /// Block until the count is positive, then decrement it
    fn wait(&self) -> Result<(), Interrupted>;
    /// Increment the count, waking a waiter. Safe to call from a completion.
    fn post(&self);
    /// Force the count
    fn reset(&self, count: u32);
}

/// The single TX permit
pub struct TxPermit<S> {
    sem: S,
    held: AtomicBool,
}

impl<S: Semaphore> TxPermit<S> {
    pub fn new(sem: S) -> Self {
        TxPermit {
            sem,
            held: AtomicBool::new(false),
        }
    }

    /// Wait for the permit, retrying interrupted waits
    pub fn acquire(&self) {
        while self.sem.wait().is_err() {
            trace!("TX permit wait interrupted");
        }
        let was_held = self.held.swap(true, Ordering::AcqRel);
        debug_assert!(!was_held, "TX permit acquired twice");
    }

    /// Give the permit back
    pub fn release(&self) {
        self.held.store(false, Ordering::Release);
        self.sem.post();
    }

    /// Returns `true` while a frame owns the write request
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    /// Make the permit available again, no matter who held it
    pub fn reset(&self) {
        self.held.store(false, Ordering::Release);
        self.sem.reset(1);
    }
}
