//! Driver configuration
//!
//! Everything here is fixed before the driver is constructed. Use
//! [`Config::new()`] for the defaults, and the `with_*` methods to
//! adjust them in a `const` context:
//!
//! ```
//! use usbd_cdc_ecm::{Config, Speed};
//!
//! const CONFIG: Config = Config::new()
//!     .with_ids(0x1209, 0x0001)
//!     .with_max_speed(Speed::High)
//!     .with_mac_address([0x02, 0x00, 0x00, 0x44, 0x55, 0x66]);
//! # assert_eq!(CONFIG.vendor_id, 0x1209);
//! ```

use crate::{descriptor::NUM_STRINGS, usbdev::Speed};

/// Packet sizes and SuperSpeed burst parameters for one endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Max packet size at full speed
    pub fs_size: u16,
    /// Max packet size at high speed
    pub hs_size: u16,
    /// Max packet size at SuperSpeed
    pub ss_size: u16,
    /// Requested `bMaxBurst`; clamped when the companion is built
    pub max_burst: u8,
    /// Requested max streams (bulk only); clamped when the companion is built
    pub max_streams: u8,
}

impl EndpointConfig {
    pub const fn new(fs_size: u16, hs_size: u16, ss_size: u16) -> Self {
        EndpointConfig {
            fs_size,
            hs_size,
            ss_size,
            max_burst: 0,
            max_streams: 0,
        }
    }

    pub const fn with_burst(mut self, max_burst: u8, max_streams: u8) -> Self {
        self.max_burst = max_burst;
        self.max_streams = max_streams;
        self
    }
}

/// Standalone device, or one function of a composite device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// The driver owns the whole device, and serves the device descriptor,
    /// the configuration header, and all strings.
    Standalone,
    /// The driver is one function of a composite device. The composite
    /// layer serves the device descriptor and the configuration header;
    /// this driver only serves its interfaces and its MAC string.
    Composite {
        /// Precede the interfaces with an interface association descriptor
        iad: bool,
    },
}

/// Driver configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub vendor_id: u16,
    pub product_id: u16,
    /// `bcdDevice`
    pub device_version: u16,
    pub manufacturer: &'static str,
    pub product: &'static str,
    pub serial: &'static str,
    /// Configuration name, served as the configuration string
    pub configuration: &'static str,
    /// The host-side MAC address, as 12 hex digits
    ///
    /// Served as the `iMACAddress` string of the Ethernet functional
    /// descriptor.
    pub host_mac: &'static str,
    /// The device-side MAC address, given to the network stack
    pub mac_address: [u8; 6],
    pub ep0_max_packet: u8,
    /// Max bus power, in mA
    pub max_power_ma: u16,
    pub self_powered: bool,
    pub remote_wakeup: bool,
    /// Fastest speed that the device supports
    ///
    /// Other-speed configurations are only served at `High` and above, and
    /// SuperSpeed packet sizes only at `Super` and above.
    pub max_speed: Speed,
    pub interrupt_in: EndpointConfig,
    pub bulk_in: EndpointConfig,
    pub bulk_out: EndpointConfig,
    pub mode: Mode,
    /// Delay between disabling the endpoints and freeing them on unbind
    pub settle_ms: u32,
}

impl Config {
    pub const fn new() -> Self {
        Config {
            vendor_id: 0x0525,
            product_id: 0xa4a2,
            device_version: 0x0100,
            manufacturer: "usbd-cdc-ecm",
            product: "CDC/ECM Ethernet",
            serial: "0",
            configuration: "Default",
            host_mac: "020000112233",
            mac_address: [0x00, 0xe0, 0xde, 0xad, 0xbe, 0xef],
            ep0_max_packet: 64,
            max_power_ma: 100,
            self_powered: false,
            remote_wakeup: false,
            max_speed: Speed::Full,
            interrupt_in: EndpointConfig::new(16, 16, 16),
            bulk_in: EndpointConfig::new(64, 512, 1024),
            bulk_out: EndpointConfig::new(64, 512, 1024),
            mode: Mode::Standalone,
            settle_ms: 50,
        }
    }

    pub const fn with_ids(mut self, vendor_id: u16, product_id: u16) -> Self {
        self.vendor_id = vendor_id;
        self.product_id = product_id;
        self
    }

    pub const fn with_strings(
        mut self,
        manufacturer: &'static str,
        product: &'static str,
        serial: &'static str,
    ) -> Self {
        self.manufacturer = manufacturer;
        self.product = product;
        self.serial = serial;
        self
    }

    pub const fn with_mac_address(mut self, mac_address: [u8; 6]) -> Self {
        self.mac_address = mac_address;
        self
    }

    pub const fn with_host_mac(mut self, host_mac: &'static str) -> Self {
        self.host_mac = host_mac;
        self
    }

    pub const fn with_max_speed(mut self, max_speed: Speed) -> Self {
        self.max_speed = max_speed;
        self
    }

    pub const fn with_power(mut self, max_power_ma: u16, self_powered: bool) -> Self {
        self.max_power_ma = max_power_ma;
        self.self_powered = self_powered;
        self
    }

    pub const fn with_remote_wakeup(mut self, remote_wakeup: bool) -> Self {
        self.remote_wakeup = remote_wakeup;
        self
    }

    pub const fn with_endpoints(
        mut self,
        interrupt_in: EndpointConfig,
        bulk_in: EndpointConfig,
        bulk_out: EndpointConfig,
    ) -> Self {
        self.interrupt_in = interrupt_in;
        self.bulk_in = bulk_in;
        self.bulk_out = bulk_out;
        self
    }

    pub const fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub const fn with_settle_ms(mut self, settle_ms: u32) -> Self {
        self.settle_ms = settle_ms;
        self
    }

    pub(crate) const fn is_composite(&self) -> bool {
        matches!(self.mode, Mode::Composite { .. })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// Interface, string, and endpoint numbers assigned to the driver
///
/// A standalone device uses the defaults. A composite device assigns
/// bases so that functions don't overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Number of the communications interface; the data interface follows
    pub ifnobase: u8,
    /// Offset added to every string index this driver reports
    pub strbase: u8,
    /// Endpoint numbers, indexed by [`EndpointRole`](crate::EndpointRole)
    pub epno: [u8; 3],
}

impl DeviceInfo {
    pub const fn new() -> Self {
        DeviceInfo {
            ifnobase: 0,
            strbase: 0,
            epno: [1, 2, 3],
        }
    }

    /// Returns `true` if every interface, string, and endpoint number fits
    pub const fn is_valid(&self) -> bool {
        let [a, b, c] = self.epno;
        self.ifnobase < u8::MAX
            && self.strbase <= u8::MAX - NUM_STRINGS
            && is_endpoint_number(a)
            && is_endpoint_number(b)
            && is_endpoint_number(c)
    }
}

const fn is_endpoint_number(epno: u8) -> bool {
    matches!(epno, 1..=15)
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self::new()
    }
}
