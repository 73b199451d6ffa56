//! The CDC-ECM class driver
//!
//! [`CdcEcm`] presents the device to a USB host as an Ethernet adapter.
//! Frames from the host arrive on the bulk OUT endpoint and go to the
//! network stack; frames from the stack leave on the bulk IN endpoint.
//!
//! # Usage
//!
//! 1. Implement [`UsbDevice`] for your controller, [`Network`] for your
//!    network stack, and [`Kernel`] for your executor.
//! 2. Construct the driver with [`CdcEcm::new()`], which registers the
//!    network interface.
//! 3. Call the [`ClassDriver`](crate::ClassDriver) methods from your
//!    controller's event handling. Route every finished transfer to
//!    `complete()`.
//! 4. Whenever the kernel runs a queued [`Work`] item, call
//!    [`CdcEcm::run()`].
//!
//! # Design
//!
//! This section describes the driver internals. If you just want to use
//! the driver, you can skip it.
//!
//! ## Contexts
//!
//! The driver runs in two contexts. The completion context is wherever the
//! controller finishes transfers, typically an interrupt handler. It never
//! blocks, and never calls into the network stack. It returns requests to
//! their slots, sets a flag, and posts work. The work context runs that
//! work. It takes the network lock, then the [`NetDev`], and it's the only
//! place that the stack sees received frames.
//!
//! Controller state lives in a critical section mutex, so both contexts
//! can reach it. Take locks in this order: the network lock, the
//! `NetDev`, then the critical section. Never call the network stack from
//! within a critical section.
//!
//! ## Requests
//!
//! There are exactly three requests: one for EP0 responses, one for reads,
//! and one for writes. A single frame buffer in [`NetDev`] serves both
//! directions, so there's never more than one frame in flight each way.
//!
//! The read request is always either queued on bulk OUT, or holding a
//! frame that's waiting for the work context. The work context dispatches
//! the frame, then queues the request again.
//!
//! The write request is guarded by the TX permit. Transmitting blocks on
//! the permit until the previous write completes. That's why transmits
//! may only come from a context that can block.
//!
//! ## Shutdown
//!
//! Disabling an endpoint hands back the request that was queued on it,
//! marked as shut down. The driver runs those requests through the same
//! completion handling as any other, after it leaves the critical section.

mod configure;
mod driver;
mod netif;
mod rx;
mod setup;
mod tx;

use core::{
    cell::RefCell,
    sync::atomic::{AtomicBool, Ordering},
};

use usb_device::endpoint::EndpointAddress;

use crate::{
    config::{Config, DeviceInfo},
    descriptor::{Descriptors, CONFIG_ID_NONE},
    netdev::{NetDev, Network},
    permit::TxPermit,
    slot::Slot,
    stats::{Counters, Statistics},
    usbdev::{Speed, UsbDevice},
    work::{Kernel, Work, WorkSlot},
};

/// Configuration state, as selected by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Configuration {
    Unconfigured,
    Configured(u8),
}

impl Configuration {
    fn id(self) -> u8 {
        match self {
            Configuration::Unconfigured => CONFIG_ID_NONE,
            Configuration::Configured(id) => id,
        }
    }
}

/// Requests that a disabled endpoint handed back, with their endpoint
type Returned<R> = [Option<(EndpointAddress, R)>; 3];

/// Everything that the completion context may touch
struct Usb<U: UsbDevice> {
    dev: U,
    /// Speed of the last descriptor request
    speed: Speed,
    ctrlreq: Slot<U::Request>,
    rdreq: Slot<U::Request>,
    wrreq: Slot<U::Request>,
    /// Indexed by `EndpointRole`
    eps: [Option<U::Endpoint>; 3],
    configuration: Configuration,
}

impl<U: UsbDevice> Usb<U> {
    fn new(dev: U, speed: Speed) -> Self {
        Usb {
            dev,
            speed,
            ctrlreq: Slot::Unallocated,
            rdreq: Slot::Unallocated,
            wrreq: Slot::Unallocated,
            eps: [None, None, None],
            configuration: Configuration::Unconfigured,
        }
    }

    fn is_configured(&self) -> bool {
        self.configuration != Configuration::Unconfigured
    }
}

/// A CDC-ECM class driver
///
/// `U` is the USB controller, `N` is the network stack, and `K` provides
/// the work queue and semaphores. Share the driver by reference between
/// the completion context and the work context.
pub struct CdcEcm<U: UsbDevice, N: Network, K: Kernel> {
    config: Config,
    info: DeviceInfo,
    usb: critical_section::Mutex<RefCell<Usb<U>>>,
    netdev: spin::Mutex<NetDev>,
    net: N,
    kernel: K,
    tx_permit: TxPermit<K::Semaphore>,
    /// The read request holds a frame for the work context
    rx_pending: AtomicBool,
    /// A write completed since the last interrupt work
    tx_done: AtomicBool,
    /// The network stack brought the interface up
    if_up: AtomicBool,
    irq_slot: WorkSlot,
    poll_slot: WorkSlot,
    stats: Statistics,
}

impl<U, N, K> CdcEcm<U, N, K>
where
    U: UsbDevice,
    N: Network,
    K: Kernel,
{
    /// Run `f` with the controller state, inside a critical section
    fn with_usb_mut<R>(&self, f: impl FnOnce(&mut Usb<U>) -> R) -> R {
        critical_section::with(|cs| {
            let mut usb = self.usb.borrow_ref_mut(cs);
            f(&mut usb)
        })
    }

    /// Run `f` with the USB controller
    ///
    /// `f` runs in a critical section. Don't call back into the driver
    /// from `f`.
    pub fn with_controller<R>(&self, f: impl FnOnce(&mut U) -> R) -> R {
        self.with_usb_mut(|usb| f(&mut usb.dev))
    }

    fn descriptors(&self) -> Descriptors<'_> {
        Descriptors::new(&self.config, &self.info)
    }

    /// The configuration that the driver was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The selected configuration value, or zero when unconfigured
    pub fn configuration(&self) -> u8 {
        self.with_usb_mut(|usb| usb.configuration.id())
    }

    /// Returns `true` if the network stack brought the interface up
    pub fn is_up(&self) -> bool {
        self.if_up.load(Ordering::Acquire)
    }

    /// A snapshot of the driver statistics
    pub fn stats(&self) -> Counters {
        self.stats.snapshot()
    }

    /// Run a work item that the driver queued with [`Kernel::queue_work()`]
    ///
    /// May block on the network lock, and on the TX permit.
    pub fn run(&self, work: Work) {
        match work {
            Work::Interrupt => self.interrupt_work(),
            Work::Poll => self.poll_work(),
        }
    }
}
