//! CDC-ECM descriptor builder
//!
//! Every builder supports two passes. Call it without a buffer to learn
//! how many bytes the descriptor occupies; call it again with a buffer to
//! fill it. Both passes return the same length. Composite devices rely on
//! the first pass to size their configuration descriptor before any driver
//! instance exists.
//!
//! References:
//!
//! - Universal Serial Bus Class Definitions for Communications Devices,
//!   Revision 1.2
//! - Universal Serial Bus Communications Class Subclass Specification for
//!   Ethernet Control Model Devices, Revision 1.2

use crate::{
    config::{Config, DeviceInfo, EndpointConfig, Mode},
    error::{Error, Result},
    usbdev::{transfer_type, Speed},
    ETH_FRAME_LEN,
};
use usb_device::{
    descriptor::descriptor_type,
    endpoint::{EndpointAddress, EndpointType},
    UsbError,
};

/// Largest descriptor that the driver produces; also the control request size
pub const MAX_DESC_LEN: usize = 128;
/// Largest UTF-16 payload of a string descriptor
pub const MAX_STR_LEN: usize = MAX_DESC_LEN - 2;

/// The only configuration value the device accepts
pub const CONFIG_ID: u8 = 1;
/// "Not configured"
pub const CONFIG_ID_NONE: u8 = 0;
pub const NUM_CONFIGS: u8 = 1;
pub const NUM_INTERFACES: u8 = 2;
pub const NUM_ENDPOINTS: u8 = 3;

pub const MANUFACTURER_STR: u8 = 1;
pub const PRODUCT_STR: u8 = 2;
pub const SERIAL_STR: u8 = 3;
pub const CONFIG_STR: u8 = 4;
pub const MAC_STR: u8 = 5;
pub const NUM_STRINGS: u8 = 5;

const LANGUAGE_EN_US: u16 = 0x0409;

/// Descriptor types that `usb-device` doesn't name
pub mod extra_type {
    pub const OTHER_SPEED_CONFIGURATION: u8 = 0x07;
    pub const CS_INTERFACE: u8 = 0x24;
    pub const ENDPOINT_COMPANION: u8 = 0x30;
}

const USB_CLASS_CDC: u8 = 0x02;
const USB_CLASS_CDC_DATA: u8 = 0x0a;
const CDC_SUBCLASS_ECM: u8 = 0x06;
const CDC_PROTO_NONE: u8 = 0x00;

const CDC_DSUBTYPE_HEADER: u8 = 0x00;
const CDC_DSUBTYPE_UNION: u8 = 0x06;
const CDC_DSUBTYPE_ECM: u8 = 0x0f;

const SIZEOF_DEVICE: usize = 18;
const SIZEOF_CONFIG: usize = 9;
const SIZEOF_IAD: usize = 8;
const SIZEOF_INTERFACE: usize = 9;
const SIZEOF_HEADER_FUNC: usize = 5;
const SIZEOF_UNION_FUNC: usize = 5;
const SIZEOF_ECM_FUNC: usize = 13;
const SIZEOF_ENDPOINT: usize = 7;
const SIZEOF_COMPANION: usize = 6;

/// Endpoint descriptor plus companion
pub(crate) const MAX_ENDPOINT_DESC_LEN: usize = SIZEOF_ENDPOINT + SIZEOF_COMPANION;

const SS_INT_MAX_BURST: u8 = 3;
const SS_BULK_MAX_BURST: u8 = 16;
const SS_BULK_MAX_STREAMS: u8 = 16;

const CONFIG_ATTR_ONE: u8 = 0x80;
const CONFIG_ATTR_SELF_POWERED: u8 = 0x40;
const CONFIG_ATTR_REMOTE_WAKEUP: u8 = 0x20;

const INTERRUPT_INTERVAL: u8 = 5;

/// The three endpoints of a CDC-ECM function
///
/// The discriminant indexes [`DeviceInfo::epno`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointRole {
    /// Notifications to the host; carries no frames
    InterruptIn = 0,
    /// Frames to the host
    BulkIn = 1,
    /// Frames from the host
    BulkOut = 2,
}

impl EndpointRole {
    pub const ALL: [EndpointRole; 3] = [
        EndpointRole::InterruptIn,
        EndpointRole::BulkIn,
        EndpointRole::BulkOut,
    ];

    pub(crate) fn kind(self) -> EndpointType {
        match self {
            EndpointRole::InterruptIn => EndpointType::Interrupt,
            EndpointRole::BulkIn | EndpointRole::BulkOut => EndpointType::Bulk,
        }
    }

    /// Endpoint address, including the direction bit
    pub(crate) fn address(self, info: &DeviceInfo) -> u8 {
        let number = info.epno[self as usize] & 0x7f;
        match self {
            EndpointRole::InterruptIn | EndpointRole::BulkIn => 0x80 | number,
            EndpointRole::BulkOut => number,
        }
    }

    pub(crate) fn endpoint_address(self, info: &DeviceInfo) -> EndpointAddress {
        EndpointAddress::from(self.address(info))
    }

    fn config(self, config: &Config) -> &EndpointConfig {
        match self {
            EndpointRole::InterruptIn => &config.interrupt_in,
            EndpointRole::BulkIn => &config.bulk_in,
            EndpointRole::BulkOut => &config.bulk_out,
        }
    }
}

/// Sequential descriptor output
///
/// Without a buffer, the writer only counts.
struct Writer<'a> {
    buf: Option<&'a mut [u8]>,
    len: usize,
}

impl<'a> Writer<'a> {
    fn new(buf: Option<&'a mut [u8]>) -> Self {
        Writer { buf, len: 0 }
    }

    fn is_sizing(&self) -> bool {
        self.buf.is_none()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if let Some(buf) = self.buf.as_deref_mut() {
            let dst = buf
                .get_mut(self.len..self.len + bytes.len())
                .ok_or(Error::Usb(UsbError::BufferOverflow))?;
            dst.copy_from_slice(bytes);
        }
        self.len += bytes.len();
        Ok(())
    }

    /// Reserve `len` bytes and hand them to `fill`, unless sizing
    fn write_with(&mut self, len: usize, fill: impl FnOnce(&mut [u8])) -> Result<()> {
        if let Some(buf) = self.buf.as_deref_mut() {
            let dst = buf
                .get_mut(self.len..self.len + len)
                .ok_or(Error::Usb(UsbError::BufferOverflow))?;
            fill(dst);
        }
        self.len += len;
        Ok(())
    }
}

const fn lsb(value: u16) -> u8 {
    value as u8
}

const fn msb(value: u16) -> u8 {
    (value >> 8) as u8
}

/// `bMaxPower`, in 2 mA units, capped at the 500 mA that USB 2.0 allows
const fn max_power(max_power_ma: u16) -> u8 {
    let units = max_power_ma.saturating_add(1) / 2;
    if units > 250 {
        250
    } else {
        units as u8
    }
}

/// Descriptor builder for one driver instance
#[derive(Debug, Clone, Copy)]
pub struct Descriptors<'a> {
    config: &'a Config,
    info: &'a DeviceInfo,
}

impl<'a> Descriptors<'a> {
    pub fn new(config: &'a Config, info: &'a DeviceInfo) -> Self {
        Descriptors { config, info }
    }

    /// Build the descriptor for a GET_DESCRIPTOR request
    ///
    /// `desc_type` and `index` are the high and low bytes of `wValue`.
    pub fn get(
        &self,
        desc_type: u8,
        index: u8,
        speed: Speed,
        out: Option<&mut [u8]>,
    ) -> Result<usize> {
        debug!("GET_DESCRIPTOR type {} index {}", desc_type, index);
        match desc_type {
            descriptor_type::DEVICE if !self.config.is_composite() => self.device(speed, out),
            descriptor_type::CONFIGURATION => self.configuration(speed, desc_type, out),
            extra_type::OTHER_SPEED_CONFIGURATION if self.config.max_speed >= Speed::High => {
                self.configuration(speed, desc_type, out)
            }
            descriptor_type::STRING => self.string(index, out),
            _ => {
                warn!("Unsupported descriptor type: {}", desc_type);
                Err(Error::NotSupported)
            }
        }
    }

    /// The device descriptor
    ///
    /// Composite devices serve their own device descriptor, so this is
    /// not supported in composite mode.
    pub fn device(&self, speed: Speed, out: Option<&mut [u8]>) -> Result<usize> {
        if self.config.is_composite() {
            return Err(Error::NotSupported);
        }
        let (bcd_usb, ep0_max_packet) = if speed.is_super() {
            // bMaxPacketSize0 is an exponent at SuperSpeed: 2^9 = 512
            (0x0300, 9)
        } else {
            (0x0200, self.config.ep0_max_packet)
        };
        let config = self.config;
        let mut w = Writer::new(out);
        w.write(&[
            SIZEOF_DEVICE as u8,
            descriptor_type::DEVICE,
            lsb(bcd_usb),
            msb(bcd_usb),
            USB_CLASS_CDC,
            CDC_SUBCLASS_ECM,
            CDC_PROTO_NONE,
            ep0_max_packet,
            lsb(config.vendor_id),
            msb(config.vendor_id),
            lsb(config.product_id),
            msb(config.product_id),
            lsb(config.device_version),
            msb(config.device_version),
            MANUFACTURER_STR,
            PRODUCT_STR,
            SERIAL_STR,
            NUM_CONFIGS,
        ])?;
        Ok(w.len)
    }

    /// The configuration descriptor, and everything that it encloses
    ///
    /// `desc_type` is either the configuration or the other-speed
    /// configuration type. For the other-speed configuration, the
    /// endpoints describe the other of full and high speed.
    pub fn configuration(
        &self,
        speed: Speed,
        desc_type: u8,
        out: Option<&mut [u8]>,
    ) -> Result<usize> {
        let speed = if desc_type == extra_type::OTHER_SPEED_CONFIGURATION && speed < Speed::Super
        {
            if speed == Speed::High {
                Speed::Full
            } else {
                Speed::High
            }
        } else {
            speed
        };

        if out.is_none() {
            return self.write_configuration(&mut Writer::new(None), speed, desc_type, 0);
        }
        let total = self.write_configuration(&mut Writer::new(None), speed, desc_type, 0)?;
        let written = self.write_configuration(&mut Writer::new(out), speed, desc_type, total)?;

        debug_assert_eq!(written, total);
        debug_assert!(written <= MAX_DESC_LEN);
        Ok(written)
    }

    fn write_configuration(
        &self,
        w: &mut Writer<'_>,
        speed: Speed,
        desc_type: u8,
        total: usize,
    ) -> Result<usize> {
        let info = self.info;
        let config = self.config;

        match config.mode {
            Mode::Standalone => {
                let mut attr = CONFIG_ATTR_ONE;
                if config.self_powered {
                    attr |= CONFIG_ATTR_SELF_POWERED;
                }
                if config.remote_wakeup {
                    attr |= CONFIG_ATTR_REMOTE_WAKEUP;
                }
                let total = total as u16;
                w.write(&[
                    SIZEOF_CONFIG as u8,
                    desc_type,
                    lsb(total),
                    msb(total),
                    NUM_INTERFACES,
                    CONFIG_ID,
                    info.strbase.wrapping_add(CONFIG_STR),
                    attr,
                    max_power(config.max_power_ma),
                ])?;
            }
            Mode::Composite { iad: true } => {
                w.write(&[
                    SIZEOF_IAD as u8,
                    descriptor_type::IAD,
                    info.ifnobase,
                    NUM_INTERFACES,
                    USB_CLASS_CDC,
                    CDC_SUBCLASS_ECM,
                    CDC_PROTO_NONE,
                    0,
                ])?;
            }
            Mode::Composite { iad: false } => {}
        }

        // Communications class interface
        w.write(&[
            SIZEOF_INTERFACE as u8,
            descriptor_type::INTERFACE,
            info.ifnobase,
            0,
            1,
            USB_CLASS_CDC,
            CDC_SUBCLASS_ECM,
            CDC_PROTO_NONE,
            0,
        ])?;
        w.write(&[
            SIZEOF_HEADER_FUNC as u8,
            extra_type::CS_INTERFACE,
            CDC_DSUBTYPE_HEADER,
            lsb(0x0110),
            msb(0x0110),
        ])?;
        w.write(&[
            SIZEOF_UNION_FUNC as u8,
            extra_type::CS_INTERFACE,
            CDC_DSUBTYPE_UNION,
            info.ifnobase,
            info.ifnobase.wrapping_add(1),
        ])?;
        let max_segment = ETH_FRAME_LEN as u16;
        w.write(&[
            SIZEOF_ECM_FUNC as u8,
            extra_type::CS_INTERFACE,
            CDC_DSUBTYPE_ECM,
            info.strbase.wrapping_add(MAC_STR),
            // bmEthernetStatistics: none
            0,
            0,
            0,
            0,
            lsb(max_segment),
            msb(max_segment),
            // wNumberMCFilters
            0,
            0,
            // bNumberPowerFilters
            0,
        ])?;
        self.write_endpoint(w, EndpointRole::InterruptIn, speed)?;

        // Data class interface; alternate 0 idles the data path
        for (alt, neps) in [(0, 0), (1, 2)] {
            w.write(&[
                SIZEOF_INTERFACE as u8,
                descriptor_type::INTERFACE,
                info.ifnobase.wrapping_add(1),
                alt,
                neps,
                USB_CLASS_CDC_DATA,
                CDC_SUBCLASS_ECM,
                CDC_PROTO_NONE,
                0,
            ])?;
        }
        self.write_endpoint(w, EndpointRole::BulkIn, speed)?;
        self.write_endpoint(w, EndpointRole::BulkOut, speed)?;

        Ok(w.len)
    }

    /// Returns `true` if `speed` selects the SuperSpeed endpoint layout
    fn superspeed_layout(&self, speed: Speed) -> bool {
        self.config.max_speed >= Speed::Super
            && (speed.is_super() || speed == Speed::Unknown)
    }

    /// One endpoint descriptor, followed by its companion at SuperSpeed
    pub fn endpoint(&self, role: EndpointRole, speed: Speed, out: Option<&mut [u8]>) -> Result<usize> {
        let mut w = Writer::new(out);
        self.write_endpoint(&mut w, role, speed)?;
        Ok(w.len)
    }

    fn write_endpoint(&self, w: &mut Writer<'_>, role: EndpointRole, speed: Speed) -> Result<()> {
        let ep = role.config(self.config);
        let superspeed = self.superspeed_layout(speed);
        let max_packet = if superspeed {
            ep.ss_size
        } else if speed == Speed::High && self.config.max_speed >= Speed::High {
            ep.hs_size
        } else {
            ep.fs_size
        };
        let interval = match role {
            EndpointRole::InterruptIn => INTERRUPT_INTERVAL,
            EndpointRole::BulkIn | EndpointRole::BulkOut => 0,
        };

        w.write(&[
            SIZEOF_ENDPOINT as u8,
            descriptor_type::ENDPOINT,
            role.address(self.info),
            transfer_type(role.kind()),
            lsb(max_packet),
            msb(max_packet),
            interval,
        ])?;

        if superspeed {
            w.write(&companion(role, ep))?;
        }
        Ok(())
    }

    /// A string descriptor
    ///
    /// Index 0 is the language table. In composite mode, only the MAC
    /// address string is available.
    pub fn string(&self, index: u8, out: Option<&mut [u8]>) -> Result<usize> {
        let config = self.config;
        let string = match (index, config.mode) {
            (0, Mode::Standalone) => {
                let mut w = Writer::new(out);
                w.write(&[
                    4,
                    descriptor_type::STRING,
                    lsb(LANGUAGE_EN_US),
                    msb(LANGUAGE_EN_US),
                ])?;
                return Ok(w.len);
            }
            (MANUFACTURER_STR, Mode::Standalone) => config.manufacturer,
            (PRODUCT_STR, Mode::Standalone) => config.product,
            (SERIAL_STR, Mode::Standalone) => config.serial,
            (CONFIG_STR, Mode::Standalone) => config.configuration,
            (MAC_STR, _) => config.host_mac,
            _ => {
                warn!("Unknown string descriptor index: {}", index);
                return Err(Error::InvalidArgument);
            }
        };

        // Only 7-bit ASCII survives this conversion to UTF-16LE
        let chars = string.len().min(MAX_STR_LEN / 2);
        let len = 2 + chars * 2;
        let mut w = Writer::new(out);
        w.write(&[len as u8, descriptor_type::STRING])?;
        w.write_with(chars * 2, |dst| {
            for (pair, &byte) in dst.chunks_exact_mut(2).zip(string.as_bytes()) {
                pair.copy_from_slice(&u16::from(byte).to_le_bytes());
            }
        })?;
        debug_assert!(w.is_sizing() || w.len == len);
        Ok(w.len)
    }
}

/// SuperSpeed endpoint companion, with burst and streams clamped
fn companion(role: EndpointRole, ep: &EndpointConfig) -> [u8; SIZEOF_COMPANION] {
    let (max_burst, attr, bytes_per_interval) = match role {
        EndpointRole::InterruptIn => {
            let max_burst = ep.max_burst.min(SS_INT_MAX_BURST - 1);
            let bytes = (u16::from(max_burst) + 1) * ep.ss_size;
            (max_burst, 0, bytes)
        }
        EndpointRole::BulkIn | EndpointRole::BulkOut => (
            ep.max_burst.min(SS_BULK_MAX_BURST - 1),
            ep.max_streams.min(SS_BULK_MAX_STREAMS),
            0,
        ),
    };
    [
        SIZEOF_COMPANION as u8,
        extra_type::ENDPOINT_COMPANION,
        max_burst,
        attr,
        lsb(bytes_per_interval),
        msb(bytes_per_interval),
    ]
}

/// What a composite device needs to know about this function up front
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositeDescription {
    /// Size of the function's configuration descriptors, at the largest layout
    pub config_desc_size: usize,
    pub num_configs: u8,
    pub config_id: u8,
    pub num_interfaces: u8,
    pub num_strings: u8,
    pub num_endpoints: u8,
}

/// Describe the function for a composite device
///
/// Works without a driver instance; the interface and string bases don't
/// change any sizes.
pub fn composite_description(config: &Config) -> Result<CompositeDescription> {
    let info = DeviceInfo::new();
    let config_desc_size = Descriptors::new(config, &info).configuration(
        Speed::Unknown,
        descriptor_type::CONFIGURATION,
        None,
    )?;
    Ok(CompositeDescription {
        config_desc_size,
        num_configs: NUM_CONFIGS,
        config_id: CONFIG_ID,
        num_interfaces: NUM_INTERFACES,
        num_strings: NUM_STRINGS + 1,
        num_endpoints: NUM_ENDPOINTS,
    })
}
