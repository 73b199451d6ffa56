//! A USB CDC-ECM class driver
//!
//! `usbd-cdc-ecm` presents a USB device to the host as an Ethernet adapter,
//! using the Communication Device Class' Ethernet Control Model. Frames
//! that the host sends arrive at your network stack, and frames that your
//! stack sends go to the host.
//!
//! The driver sits between three things that you provide:
//!
//! - a USB device controller, through [`UsbDevice`]
//! - a network stack and its lock, through [`Network`] and [`NetStack`]
//! - a work queue and semaphores, through [`Kernel`]
//!
//! See [`CdcEcm`] for the driver, and [`Config`] for what you can adjust.
//!
//! The driver works standalone, where it owns the whole USB device, or as
//! one function of a composite device. For a composite device, use
//! [`composite_description()`] to learn how many interfaces, strings, and
//! endpoints to reserve, then hand the reserved numbers to the driver in a
//! [`DeviceInfo`].
//!
//! ```
//! use usbd_cdc_ecm::{composite_description, Config, Mode};
//!
//! const CONFIG: Config = Config::new().with_mode(Mode::Composite { iad: true });
//!
//! let description = composite_description(&CONFIG).unwrap();
//! assert_eq!(description.num_interfaces, 2);
//! assert_eq!(description.num_endpoints, 3);
//! ```
//!
//! # Features
//!
//! - `log` logs driver events with the `log` crate. Only enable it when
//!   your logger doesn't send its records over this interface.
//! - `defmt-03` enables `defmt` support in `usb-device`.
//! - `cortex-m` provides a single core critical section implementation.

#![no_std]

#[cfg(test)]
extern crate std;

#[macro_use]
mod log;

mod config;
mod descriptor;
mod ecm;
mod error;
mod netdev;
mod permit;
mod slot;
mod stats;
mod usbdev;
mod work;

#[cfg(test)]
mod mock;

pub use config::{Config, DeviceInfo, EndpointConfig, Mode};
pub use descriptor::{
    composite_description, CompositeDescription, Descriptors, EndpointRole, CONFIG_ID,
    MAX_DESC_LEN, NUM_ENDPOINTS, NUM_INTERFACES, NUM_STRINGS,
};
pub use ecm::CdcEcm;
pub use error::{Error, Result};
pub use netdev::{
    IfFlags, LinkType, NetDev, NetDriver, NetStack, Network, ETHERTYPE_ARP, ETHERTYPE_IPV4,
    ETHERTYPE_IPV6, ETH_FRAME_LEN, ETH_HDR_LEN, GUARD_SIZE,
};
pub use permit::{Interrupted, Semaphore};
pub use stats::Counters;
pub use usbdev::{ClassDriver, Rejected, RequestFlags, Speed, TransferError, UsbDevice, UsbRequest};
pub use work::{Enqueue, Kernel, Work};
