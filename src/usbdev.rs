//! USB peripheral controller abstraction
//!
//! The class driver never talks to hardware. It consumes a controller
//! through [`UsbDevice`], and exchanges transfers as [`UsbRequest`]s.
//! Requests move by value: submitting a request hands it to the controller,
//! and the controller hands it back through
//! [`ClassDriver::complete()`](crate::ClassDriver::complete) once the
//! transfer finishes (or through [`UsbDevice::disable()`] when the
//! endpoint shuts down).

use bitflags::bitflags;
use usb_device::{
    control::Request,
    endpoint::{EndpointAddress, EndpointType},
    UsbDirection, UsbError,
};

/// Bus speed, ordered from slowest to fastest
///
/// `Unknown` sorts first, like an unset speed register. The descriptor
/// builder treats it as "size for the largest layout."
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Speed {
    Unknown,
    Low,
    Full,
    High,
    Super,
    SuperPlus,
}

impl Speed {
    /// Returns `true` for the speeds that carry endpoint companion descriptors
    pub const fn is_super(self) -> bool {
        matches!(self, Speed::Super | Speed::SuperPlus)
    }
}

bitflags! {
    /// Request submission flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RequestFlags : u8 {
        /// Terminate the transfer with a short or zero-length packet when
        /// the length is a multiple of the max packet size.
        const NULL_PACKET = 1 << 0;
    }
}

/// Why a transfer didn't complete normally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferError {
    /// The endpoint was disabled, or the device disconnected. The request
    /// is back with its owner; nothing else will happen to it.
    Shutdown,
    /// Any other transfer failure.
    Failed(UsbError),
}

/// A transfer request
///
/// Each request owns a buffer sized at allocation time. The controller
/// records the transferred length and the result before handing the
/// request back.
pub trait UsbRequest {
    /// The entire request buffer
    fn buf(&self) -> &[u8];
    /// The entire request buffer, for filling before a write
    fn buf_mut(&mut self) -> &mut [u8];
    /// Requested transfer length
    fn len(&self) -> usize;
    /// Set the requested transfer length
    fn set_len(&mut self, len: usize);
    /// Set the submission flags
    fn set_flags(&mut self, flags: RequestFlags);
    /// Number of bytes the controller actually moved
    fn transferred(&self) -> usize;
    /// Result of the last transfer
    fn result(&self) -> Result<(), TransferError>;
    /// Overwrite the result
    ///
    /// Used when the class driver completes a request on its own.
    fn set_result(&mut self, result: Result<(), TransferError>);
}

/// A submission that the controller refused
///
/// The request comes back to the caller, unchanged.
#[derive(Debug)]
pub struct Rejected<R> {
    pub error: UsbError,
    pub request: R,
}

/// The USB peripheral controller
///
/// # Contract
///
/// - `submit()` and `submit_ep0()` never complete a request synchronously.
///   Completions are delivered later through
///   [`ClassDriver::complete()`](crate::ClassDriver::complete).
/// - `disable()` forces completion of the transfer queued on the endpoint,
///   if any, and returns that request instead of delivering it.
///   `cancel_ep0()` does the same for EP0, without disabling it.
pub trait UsbDevice {
    /// An allocated endpoint
    type Endpoint;
    /// A transfer request
    type Request: UsbRequest;

    /// The negotiated bus speed
    fn speed(&self) -> Speed;
    /// Allocate the endpoint at `addr`
    ///
    /// Returns `None` if the endpoint is taken or doesn't exist.
    fn alloc_ep(&mut self, addr: EndpointAddress, kind: EndpointType) -> Option<Self::Endpoint>;
    /// Return an endpoint to the controller
    fn free_ep(&mut self, ep: Self::Endpoint);
    /// Allocate a request, with a `len` byte buffer, for the endpoint at `addr`
    fn alloc_request(&mut self, addr: EndpointAddress, len: usize) -> Option<Self::Request>;
    /// Free a request that was allocated for the endpoint at `addr`
    fn free_request(&mut self, addr: EndpointAddress, req: Self::Request);
    /// Configure and enable an endpoint from its descriptor bytes
    ///
    /// `descriptor` holds the endpoint descriptor, followed by the
    /// SuperSpeed companion when one applies. `last` is set for the final
    /// endpoint of the configuration.
    fn configure(
        &mut self,
        ep: &mut Self::Endpoint,
        descriptor: &[u8],
        last: bool,
    ) -> Result<(), UsbError>;
    /// Disable an endpoint
    ///
    /// Returns the request that was queued on the endpoint. It carries a
    /// [`TransferError::Shutdown`] result.
    fn disable(&mut self, ep: &mut Self::Endpoint) -> Option<Self::Request>;
    /// Queue `req` on `ep`
    fn submit(
        &mut self,
        ep: &mut Self::Endpoint,
        req: Self::Request,
    ) -> Result<(), Rejected<Self::Request>>;
    /// Queue a control response on EP0
    fn submit_ep0(&mut self, req: Self::Request) -> Result<(), Rejected<Self::Request>>;
    /// Cancel the control response queued on EP0
    ///
    /// Returns the request, if one was still queued. The controller won't
    /// deliver a completion for it.
    fn cancel_ep0(&mut self) -> Option<Self::Request>;
    /// Pull up the data line
    fn connect(&mut self) {}
    /// Report the device as self-powered
    fn set_self_powered(&mut self) {}
}

/// The class driver role
///
/// The controller stack calls into the class driver through this trait.
/// `bind()`, `unbind()`, `setup()`, and `disconnect()` may block, so call
/// them from a thread or task. `complete()` never blocks, and it's safe to
/// call from an interrupt handler.
pub trait ClassDriver {
    /// The controller's request type
    type Request: UsbRequest;

    /// Claim the endpoints and requests, then connect
    fn bind(&self) -> crate::Result<()>;
    /// Release everything that `bind()` claimed
    fn unbind(&self);
    /// Handle a control request
    ///
    /// On success, returns the length of the response queued on EP0.
    fn setup(&self, req: &Request, dataout: &[u8]) -> crate::Result<usize>;
    /// The host went away
    fn disconnect(&self);
    /// A transfer on `ep` finished; the request is back with the driver
    fn complete(&self, ep: EndpointAddress, req: Self::Request);
}

/// Address of the control IN endpoint, used for EP0 requests
pub(crate) fn ep0_in() -> EndpointAddress {
    EndpointAddress::from_parts(0, UsbDirection::In)
}

/// Returns the `bmAttributes` transfer type bits for an endpoint type
pub(crate) fn transfer_type(kind: EndpointType) -> u8 {
    match kind {
        EndpointType::Control => 0b00,
        EndpointType::Isochronous { .. } => 0b01,
        EndpointType::Bulk => 0b10,
        EndpointType::Interrupt => 0b11,
    }
}
