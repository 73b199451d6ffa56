//! Network device and network stack interfaces
//!
//! The driver owns one [`NetDev`]: a single frame buffer shared by both
//! directions, plus the interface state that the stack reads. The stack
//! itself lives behind [`Network`], which serializes every call into it
//! with the network lock.

use bitflags::bitflags;

use crate::error::Result;

/// Largest Ethernet frame, without the FCS
pub const ETH_FRAME_LEN: usize = 1514;
/// Slack after the frame, so that a short overrun can't corrupt other state
pub const GUARD_SIZE: usize = 2;
/// Ethernet header: destination, source, and Ethertype
pub const ETH_HDR_LEN: usize = 14;

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_ARP: u16 = 0x0806;
pub const ETHERTYPE_IPV6: u16 = 0x86dd;

bitflags! {
    /// Interface state flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct IfFlags : u8 {
        /// The stack brought the interface up
        const UP = 1 << 0;
        /// The carrier is on
        const RUNNING = 1 << 1;
    }
}

/// Link layer of the interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Ethernet,
}

/// The network device
///
/// `len` describes the frame in `buf`. After the stack consumes an RX
/// frame, it may leave a response of a new length in the same buffer.
pub struct NetDev {
    buf: [u8; ETH_FRAME_LEN + GUARD_SIZE],
    len: usize,
    /// Device-side MAC address
    pub mac: [u8; 6],
    pub flags: IfFlags,
    /// Interface number, used to name the device
    pub minor: u8,
}

impl NetDev {
    pub const fn new(minor: u8, mac: [u8; 6]) -> Self {
        NetDev {
            buf: [0; ETH_FRAME_LEN + GUARD_SIZE],
            len: 0,
            mac,
            flags: IfFlags::empty(),
            minor,
        }
    }

    /// The current frame
    pub fn frame(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// The whole frame buffer, for building a frame
    ///
    /// Call [`set_len()`](Self::set_len) once the frame is in place.
    pub fn buf_mut(&mut self) -> &mut [u8] {
        &mut self.buf[..ETH_FRAME_LEN]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Set the frame length, saturating at [`ETH_FRAME_LEN`]
    pub fn set_len(&mut self, len: usize) {
        self.len = len.min(ETH_FRAME_LEN);
    }

    /// Copy `frame` into the buffer
    ///
    /// Returns `None` if the frame doesn't fit.
    pub fn load(&mut self, frame: &[u8]) -> Option<()> {
        if frame.len() > ETH_FRAME_LEN {
            return None;
        }
        self.buf[..frame.len()].copy_from_slice(frame);
        self.len = frame.len();
        Some(())
    }

    /// The Ethertype of the current frame, if it has a full header
    pub fn ethertype(&self) -> Option<u16> {
        let frame = self.frame();
        if frame.len() < ETH_HDR_LEN {
            return None;
        }
        Some(u16::from_be_bytes([frame[12], frame[13]]))
    }
}

/// The network stack
///
/// All calls happen under the network lock.
pub trait NetStack {
    /// A new interface is available
    fn register(&mut self, dev: &mut NetDev, link: LinkType) -> Result<()>;
    /// The interface is going away
    fn unregister(&mut self, dev: &mut NetDev);

    /// Handle an IPv4 frame
    ///
    /// On return, a non-zero `dev.len()` is a response to transmit.
    fn ipv4_input(&mut self, dev: &mut NetDev);
    /// Handle an IPv6 frame
    ///
    /// On return, a non-zero `dev.len()` is a response to transmit.
    fn ipv6_input(&mut self, dev: &mut NetDev);
    /// Handle an ARP frame
    ///
    /// On return, a non-zero `dev.len()` is a response to transmit.
    fn arp_input(&mut self, dev: &mut NetDev);

    /// Tap for every received frame, before dispatch
    fn pkt_input(&mut self, dev: &mut NetDev) {
        let _ = dev;
    }

    /// Offer the interface a chance to send
    ///
    /// The stack builds each frame in `dev` and calls `txpoll`. When
    /// `txpoll` returns `true`, the stack must stop polling.
    fn poll(&mut self, dev: &mut NetDev, txpoll: &mut dyn FnMut(&mut NetDev) -> bool);

    /// The link is usable
    fn carrier_on(&mut self, dev: &mut NetDev) {
        dev.flags.insert(IfFlags::RUNNING);
    }
}

/// Access to the network stack
pub trait Network {
    type Stack: NetStack;

    /// Run `f` with the network lock held
    fn lock<R>(&self, f: impl FnOnce(&mut Self::Stack) -> R) -> R;
}

/// Calls that the network stack makes into the driver
pub trait NetDriver {
    /// Bring the interface up
    fn ifup(&self) -> Result<()>;
    /// Take the interface down
    fn ifdown(&self) -> Result<()>;
    /// The stack has frames to send
    fn txavail(&self) -> Result<()>;
    /// Add a multicast address to the filter
    fn addmac(&self, mac: &[u8; 6]) -> Result<()>;
    /// Remove a multicast address from the filter
    fn rmmac(&self, mac: &[u8; 6]) -> Result<()>;
    /// Driver specific control
    fn ioctl(&self, cmd: u32, arg: usize) -> Result<()>;
}
