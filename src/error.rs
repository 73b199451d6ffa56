//! Driver errors

use core::fmt;
use usb_device::UsbError;

/// Errors reported by the CDC-ECM driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Couldn't allocate a request or its buffer.
    NoMemory,
    /// The controller couldn't provide one of the endpoints.
    NoDevice,
    /// Unknown configuration value, string index, or other argument.
    InvalidArgument,
    /// Unsupported descriptor type or control request.
    NotSupported,
    /// Unsupported network ioctl command.
    NotTty,
    /// The operation needs the configured endpoints, but the host hasn't
    /// selected a configuration.
    NotConfigured,
    /// The controller rejected an operation.
    Usb(UsbError),
}

impl From<UsbError> for Error {
    fn from(err: UsbError) -> Self {
        Error::Usb(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NoMemory => f.write_str("out of request memory"),
            Error::NoDevice => f.write_str("endpoint unavailable"),
            Error::InvalidArgument => f.write_str("invalid argument"),
            Error::NotSupported => f.write_str("not supported"),
            Error::NotTty => f.write_str("unsupported ioctl"),
            Error::NotConfigured => f.write_str("device not configured"),
            Error::Usb(err) => write!(f, "USB error: {err:?}"),
        }
    }
}

/// Driver result
pub type Result<T> = core::result::Result<T, Error>;
