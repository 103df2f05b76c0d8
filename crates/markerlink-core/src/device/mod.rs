//! Marker devices
//!
//! Every supported device type exposes the same small capability set through
//! [`MarkerDevice`]: identify itself, write a marker byte, close. The concrete
//! variant is picked from the [`DeviceType`] tag and the address by
//! [`open_device`].

mod fake;
mod registry;

pub use fake::FakeDevice;
pub use registry::{DeviceRegistry, RegistryGuard};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::protocol::{Connection, LinkOpener, ProtocolError, Reply, FAKE_ADDRESS};

/// Reply key holding the firmware version
pub const VERSION_KEY: &str = "Version";
/// Reply key holding the serial number
pub const SERIAL_NO_KEY: &str = "Serialno";
/// Reply key holding the device name
pub const DEVICE_KEY: &str = "Device";

/// Version string reported by fake devices
pub const FAKE_VERSION: &str = "0000000";
/// Serial number reported by fake devices
pub const FAKE_SERIAL_NO: &str = "0000000";

/// Requested device type is not one we can drive
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unsupported device type '{0}', only UsbParMar and EVA are supported")]
pub struct UnsupportedDevice(pub String);

/// Supported marker device types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    /// The UsbParMar USB-to-parallel marker gadget
    UsbParMar,
    /// The EVA biosignal amplifier marker input
    #[serde(rename = "EVA")]
    Eva,
}

impl DeviceType {
    /// All supported types
    pub const ALL: [DeviceType; 2] = [DeviceType::UsbParMar, DeviceType::Eva];

    /// Canonical name
    pub fn name(&self) -> &'static str {
        match self {
            DeviceType::UsbParMar => "UsbParMar",
            DeviceType::Eva => "EVA",
        }
    }

    /// Hardware-id pattern that candidate ports must match during discovery
    pub fn hardware_id_pattern(&self) -> &'static str {
        match self {
            // Both devices are built around Arduino boards
            DeviceType::UsbParMar | DeviceType::Eva => "^USB VID:PID=2341:.*$",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DeviceType {
    type Err = UnsupportedDevice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "usbparmar" | "usbparmarker" => Ok(DeviceType::UsbParMar),
            "eva" => Ok(DeviceType::Eva),
            _ => Err(UnsupportedDevice(s.to_string())),
        }
    }
}

/// Hardware and software sub-versions parsed from a `HW<x>:SW<y>` string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareVersion {
    /// Hardware revision, the part after `HW`
    pub hardware: String,
    /// Firmware revision, the part after `SW`
    pub software: String,
}

impl FirmwareVersion {
    /// Parse `HW1:SW1.2`; returns `None` for anything else
    pub fn parse(version: &str) -> Option<Self> {
        let (hw, sw) = version.trim().split_once(':')?;
        let hardware = hw.trim().strip_prefix("HW")?;
        let software = sw.trim().strip_prefix("SW")?;
        if hardware.is_empty() || software.is_empty() {
            return None;
        }
        Some(Self {
            hardware: hardware.to_string(),
            software: software.to_string(),
        })
    }
}

/// Identity reported by a device at connection time
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceProperties {
    /// Raw `Version` field
    pub firmware_version: String,
    /// `Serialno` field
    pub serial_number: String,
    /// `Device` field, or the type name when absent
    pub device_name: String,
}

impl DeviceProperties {
    /// Build properties from an identification reply.
    ///
    /// The serial number is mandatory; a missing version or name is tolerated
    /// and replaced by an empty string or the type name respectively.
    pub fn from_reply(reply: &Reply, device_type: DeviceType) -> Result<Self, ProtocolError> {
        if reply.is_empty() {
            return Err(ProtocolError::NoResponse);
        }
        let serial_number = reply
            .field(SERIAL_NO_KEY)
            .ok_or_else(|| ProtocolError::NoSerialNo(reply.to_string()))?;

        Ok(Self {
            firmware_version: reply.field(VERSION_KEY).unwrap_or_default(),
            serial_number,
            device_name: reply
                .field(DEVICE_KEY)
                .unwrap_or_else(|| device_type.name().to_string()),
        })
    }

    /// Canned identity of a fake device
    pub fn fake(device_type: DeviceType) -> Self {
        Self {
            firmware_version: FAKE_VERSION.to_string(),
            serial_number: FAKE_SERIAL_NO.to_string(),
            device_name: format!("FAKE {}", device_type.name()),
        }
    }

    /// Parsed hardware/software versions, if the version follows `HW<x>:SW<y>`
    pub fn firmware(&self) -> Option<FirmwareVersion> {
        FirmwareVersion::parse(&self.firmware_version)
    }
}

/// Capabilities shared by every marker device variant
pub trait MarkerDevice: Send {
    /// Type tag this device was opened as
    fn device_type(&self) -> DeviceType;

    /// Address the device was opened at
    fn address(&self) -> &str;

    /// Identity fetched when the device was opened
    fn properties(&self) -> &DeviceProperties;

    /// Put `value` on the device's marker lines
    fn write_value(&mut self, value: u8) -> Result<(), ProtocolError>;

    /// Release the device. Closing twice is an error.
    fn close(&mut self) -> Result<(), ProtocolError>;

    /// Whether this device bypasses hardware
    fn is_fake(&self) -> bool {
        self.address() == FAKE_ADDRESS
    }
}

impl MarkerDevice for Connection {
    fn device_type(&self) -> DeviceType {
        Connection::device_type(self)
    }

    fn address(&self) -> &str {
        Connection::address(self)
    }

    fn properties(&self) -> &DeviceProperties {
        Connection::properties(self)
    }

    fn write_value(&mut self, value: u8) -> Result<(), ProtocolError> {
        Connection::write_value(self, value)
    }

    fn close(&mut self) -> Result<(), ProtocolError> {
        Connection::close(self)
    }
}

/// Open the device variant for `address`: the fake address yields a
/// [`FakeDevice`], anything else a serial [`Connection`].
pub fn open_device(
    device_type: DeviceType,
    address: &str,
    opener: Arc<dyn LinkOpener>,
) -> Result<Box<dyn MarkerDevice>, ProtocolError> {
    if address == FAKE_ADDRESS {
        return Ok(Box::new(FakeDevice::new(device_type)));
    }
    let connection = Connection::open(address, device_type, opener)?;
    Ok(Box::new(connection))
}
