//! Deferred work
//!
//! Completions can't touch the network stack. They post a [`Work`] item
//! and the platform runs it later, by calling
//! [`CdcEcm::run()`](crate::CdcEcm::run) from a context that can block.
//! Each kind of work has a single slot: posting while the slot is full is
//! a no-op, and the slot frees once the job starts running.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::permit::Semaphore;

/// A unit of deferred work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Work {
    /// Process completions: received frames and finished transmits
    Interrupt,
    /// Offer the network stack a chance to transmit
    Poll,
}

/// Outcome of posting work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    Queued,
    /// The job was already pending; it'll observe the new state
    Dropped,
}

/// Platform services that the driver needs
pub trait Kernel {
    type Semaphore: Semaphore;

    /// Create a counting semaphore
    fn semaphore(&self, initial: u32) -> Self::Semaphore;
    /// Arrange for `CdcEcm::run(work)` to be called from the work context
    ///
    /// Must not block, and must not call `run()` synchronously.
    fn queue_work(&self, work: Work);
    /// Sleep for `ms` milliseconds
    fn delay_ms(&self, ms: u32);
}

/// Single-slot mailbox for one kind of work
#[derive(Debug)]
pub struct WorkSlot {
    pending: AtomicBool,
}

impl WorkSlot {
    pub const fn new() -> Self {
        WorkSlot {
            pending: AtomicBool::new(false),
        }
    }

    /// Post `work`, unless it's already pending
    pub fn try_enqueue<K: Kernel>(&self, kernel: &K, work: Work) -> Enqueue {
        if self.pending.swap(true, Ordering::AcqRel) {
            Enqueue::Dropped
        } else {
            kernel.queue_work(work);
            Enqueue::Queued
        }
    }

    /// The job is running; later posts queue it again
    pub fn begin(&self) {
        self.pending.store(false, Ordering::Release);
    }
}

impl Default for WorkSlot {
    fn default() -> Self {
        Self::new()
    }
}
