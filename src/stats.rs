//! Driver statistics
//!
//! Counters are atomics, so completions can bump them without a lock.

use core::sync::atomic::{AtomicU32, Ordering};

/// Live counters
#[derive(Debug, Default)]
pub struct Statistics {
    pub(crate) rx_packets: AtomicU32,
    pub(crate) rx_ipv4: AtomicU32,
    pub(crate) rx_ipv6: AtomicU32,
    pub(crate) rx_arp: AtomicU32,
    pub(crate) rx_dropped: AtomicU32,
    pub(crate) rx_errors: AtomicU32,
    pub(crate) tx_packets: AtomicU32,
    pub(crate) tx_done: AtomicU32,
    pub(crate) ep0_submit_failures: AtomicU32,
}

/// A copy of the counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counters {
    /// Frames received from the host
    pub rx_packets: u32,
    pub rx_ipv4: u32,
    pub rx_ipv6: u32,
    pub rx_arp: u32,
    /// Frames with an unknown Ethertype, or too short for a header
    pub rx_dropped: u32,
    /// Failed bulk OUT transfers
    pub rx_errors: u32,
    /// Frames submitted to the host
    pub tx_packets: u32,
    /// Write completions
    pub tx_done: u32,
    /// EP0 submissions that the controller refused
    pub ep0_submit_failures: u32,
}

impl Statistics {
    pub const fn new() -> Self {
        Statistics {
            rx_packets: AtomicU32::new(0),
            rx_ipv4: AtomicU32::new(0),
            rx_ipv6: AtomicU32::new(0),
            rx_arp: AtomicU32::new(0),
            rx_dropped: AtomicU32::new(0),
            rx_errors: AtomicU32::new(0),
            tx_packets: AtomicU32::new(0),
            tx_done: AtomicU32::new(0),
            ep0_submit_failures: AtomicU32::new(0),
        }
    }

    pub(crate) fn bump(counter: &AtomicU32) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Counters {
        let load = |counter: &AtomicU32| counter.load(Ordering::Relaxed);
        Counters {
            rx_packets: load(&self.rx_packets),
            rx_ipv4: load(&self.rx_ipv4),
            rx_ipv6: load(&self.rx_ipv6),
            rx_arp: load(&self.rx_arp),
            rx_dropped: load(&self.rx_dropped),
            rx_errors: load(&self.rx_errors),
            tx_packets: load(&self.tx_packets),
            tx_done: load(&self.tx_done),
            ep0_submit_failures: load(&self.ep0_submit_failures),
        }
    }
}
