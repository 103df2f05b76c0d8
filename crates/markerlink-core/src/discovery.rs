//! Device Discovery
//!
//! Scans the serial ports for a marker device of a given type, optionally
//! pinned to a serial number or port, and resolves exactly one match.
//!
//! Ports are first filtered on their name, description and hardware id. Every
//! remaining candidate is then opened and identified; its reported serial
//! number decides whether it matches. Candidates are probed in enumeration
//! order and a second matching device is an error.

use regex::{Regex, RegexBuilder};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::device::{DeviceProperties, DeviceType, UnsupportedDevice};
use crate::protocol::{
    list_ports, Connection, LinkOpener, PortInfo, SystemLinkOpener, FAKE_ADDRESS,
};

/// Pattern that matches anything
pub const MATCH_ANY: &str = "^.*$";

/// Which port filter failed to match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    /// Port name
    Port,
    /// Port description
    Description,
    /// Port hardware id
    HardwareId,
    /// Every filter matched some port, but never all on the same port
    Combined,
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FilterKind::Port => "port",
            FilterKind::Description => "description",
            FilterKind::HardwareId => "hardware id",
            FilterKind::Combined => "combined port/description/hardware id",
        };
        f.write_str(s)
    }
}

/// Errors that can occur while resolving a device
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error(transparent)]
    /// Requested device type is not supported
    UnsupportedDevice(#[from] UnsupportedDevice),

    #[error("Invalid discovery filter: {0}")]
    /// A filter did not compile
    InvalidFilter(#[from] regex::Error),

    #[error("No serial port matched the {0} filter")]
    /// No port passed the port filters
    NoComMatch(FilterKind),

    #[error("No {device_type} device matched serial number filter '{pattern}'")]
    /// Devices answered, but none with the requested serial number
    NoSerialMatch {
        /// Requested device type
        device_type: DeviceType,
        /// Serial number pattern that nothing matched
        pattern: String,
    },

    #[error("Multiple matching devices found at '{first}' and '{second}'")]
    /// More than one device matched
    MultipleConnections {
        /// Port of the first match
        first: String,
        /// Port of the second match
        second: String,
    },

    #[error("No suitable {device_type} device could be connected: {last_error}")]
    /// No candidate port could be opened and identified
    NoConnection {
        /// Requested device type
        device_type: DeviceType,
        /// Error from the last port tried
        last_error: String,
    },
}

/// Compiled discovery filters
#[derive(Debug, Clone)]
pub struct ComFilters {
    /// Port name filter
    pub port: Regex,
    /// Port description filter
    pub description: Regex,
    /// Hardware id filter
    pub hardware_id: Regex,
    /// Filter on the serial number the device reports
    pub serial_no: Regex,
}

impl ComFilters {
    /// Compile filters from raw patterns. The hardware id is matched
    /// case-insensitively since OSes disagree on hex digit case.
    pub fn new(
        port: &str,
        description: &str,
        hardware_id: &str,
        serial_no: &str,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            port: Regex::new(port)?,
            description: Regex::new(description)?,
            hardware_id: RegexBuilder::new(hardware_id)
                .case_insensitive(true)
                .build()?,
            serial_no: Regex::new(serial_no)?,
        })
    }

    /// Filters for a query: exact matches where the query pins a value,
    /// anything otherwise, and the device type's hardware id pattern.
    pub fn for_query(query: &DeviceQuery) -> Result<Self, regex::Error> {
        let port = query
            .port()
            .map(exact_pattern)
            .unwrap_or_else(|| MATCH_ANY.to_string());
        let serial_no = query
            .serial_no()
            .map(exact_pattern)
            .unwrap_or_else(|| MATCH_ANY.to_string());
        Self::new(
            &port,
            MATCH_ANY,
            query.device_type().hardware_id_pattern(),
            &serial_no,
        )
    }

    /// Evaluate the three port filters independently: (port, description, hardware id)
    pub fn check_port(&self, port: &PortInfo) -> (bool, bool, bool) {
        (
            self.port.is_match(&port.name),
            self.description.is_match(&port.description),
            self.hardware_id.is_match(&port.hardware_id),
        )
    }
}

fn exact_pattern(value: &str) -> String {
    format!("^{}$", regex::escape(value))
}

/// What to look for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceQuery {
    device_type: DeviceType,
    serial_no: Option<String>,
    port: Option<String>,
    fallback_to_fake: bool,
}

impl DeviceQuery {
    /// Query for any device of the named type
    pub fn new(device_type: &str) -> Result<Self, DiscoveryError> {
        Ok(Self::for_type(device_type.parse()?))
    }

    /// Query for any device of `device_type`
    pub fn for_type(device_type: DeviceType) -> Self {
        Self {
            device_type,
            serial_no: None,
            port: None,
            fallback_to_fake: false,
        }
    }

    /// Only accept the device with this serial number; empty means any
    pub fn with_serial_no(mut self, serial_no: impl Into<String>) -> Self {
        self.serial_no = Some(serial_no.into()).filter(|s| !s.is_empty());
        self
    }

    /// Only look at this port; empty means any
    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into()).filter(|s| !s.is_empty());
        self
    }

    /// Skip the scan and resolve to the fake device
    pub fn with_fallback_to_fake(mut self, fallback: bool) -> Self {
        self.fallback_to_fake = fallback;
        self
    }

    /// Requested device type
    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    /// Pinned serial number, if any
    pub fn serial_no(&self) -> Option<&str> {
        self.serial_no.as_deref()
    }

    /// Pinned port, if any
    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    /// Whether the scan is skipped in favour of the fake device
    pub fn is_fallback_to_fake(&self) -> bool {
        self.fallback_to_fake
    }
}

/// A resolved device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMatch {
    /// Type the device was probed as
    pub device_type: DeviceType,
    /// Port the device was found at, or the fake address
    pub port: String,
    /// Identity reported during the probe
    pub properties: DeviceProperties,
}

impl DeviceMatch {
    fn fake(device_type: DeviceType) -> Self {
        Self {
            device_type,
            port: FAKE_ADDRESS.to_string(),
            properties: DeviceProperties::fake(device_type),
        }
    }

    /// Whether this is the fake device
    pub fn is_fake(&self) -> bool {
        self.port == FAKE_ADDRESS
    }
}

/// Source of the port list
pub trait PortScanner: Send + Sync {
    /// Ports currently present, in probing order
    fn ports(&self) -> Vec<PortInfo>;
}

/// Lists the ports present on this machine
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPortScanner;

impl PortScanner for SystemPortScanner {
    fn ports(&self) -> Vec<PortInfo> {
        list_ports()
    }
}

/// Device resolver
#[derive(Clone)]
pub struct Discovery {
    scanner: Arc<dyn PortScanner>,
    opener: Arc<dyn LinkOpener>,
}

impl Default for Discovery {
    fn default() -> Self {
        Self::new(Arc::new(SystemPortScanner), Arc::new(SystemLinkOpener))
    }
}

impl Discovery {
    /// Resolver over `scanner`, probing through `opener`
    pub fn new(scanner: Arc<dyn PortScanner>, opener: Arc<dyn LinkOpener>) -> Self {
        Self { scanner, opener }
    }

    /// Link opener used to probe candidates
    pub fn opener(&self) -> Arc<dyn LinkOpener> {
        self.opener.clone()
    }

    /// Resolve exactly one device matching `query`
    pub fn find_device(&self, query: &DeviceQuery) -> Result<DeviceMatch, DiscoveryError> {
        let device_type = query.device_type();
        let filters = ComFilters::for_query(query)?;

        if query.is_fallback_to_fake() {
            tracing::info!("find_device: using fake {}", device_type);
            return Ok(DeviceMatch::fake(device_type));
        }

        let ports = self.scanner.ports();
        let mut port_hit = false;
        let mut desc_hit = false;
        let mut hwid_hit = false;
        let mut candidates = Vec::new();

        for port in ports {
            let (port_ok, desc_ok, hwid_ok) = filters.check_port(&port);
            port_hit |= port_ok;
            desc_hit |= desc_ok;
            hwid_hit |= hwid_ok;
            if port_ok && desc_ok && hwid_ok {
                candidates.push(port);
            }
        }

        if candidates.is_empty() {
            let kind = if !port_hit {
                FilterKind::Port
            } else if !desc_hit {
                FilterKind::Description
            } else if !hwid_hit {
                FilterKind::HardwareId
            } else {
                FilterKind::Combined
            };
            return Err(DiscoveryError::NoComMatch(kind));
        }

        tracing::debug!(
            "find_device: {} candidate port(s) for {}",
            candidates.len(),
            device_type
        );

        let mut resolved: Option<DeviceMatch> = None;
        let mut connected = false;
        let mut last_error: Option<String> = None;

        for port in candidates {
            let mut conn = match Connection::open(&port.name, device_type, self.opener.clone()) {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!("find_device: could not connect to '{}': {}", port.name, e);
                    last_error = Some(format!("'{}': {}", port.name, e));
                    continue;
                }
            };
            connected = true;

            let properties = conn.properties().clone();
            if let Err(e) = conn.close() {
                tracing::debug!("find_device: closing probe of '{}' failed: {}", port.name, e);
            }

            if !filters.serial_no.is_match(&properties.serial_number) {
                tracing::debug!(
                    "find_device: '{}' has serial number {}, skipping",
                    port.name,
                    properties.serial_number
                );
                continue;
            }

            if let Some(first) = &resolved {
                return Err(DiscoveryError::MultipleConnections {
                    first: first.port.clone(),
                    second: port.name,
                });
            }

            resolved = Some(DeviceMatch {
                device_type,
                port: port.name,
                properties,
            });
        }

        match resolved {
            Some(found) => {
                tracing::info!(
                    "find_device: {} {} found at {}",
                    device_type,
                    found.properties.serial_number,
                    found.port
                );
                Ok(found)
            }
            None if !connected => Err(DiscoveryError::NoConnection {
                device_type,
                last_error: last_error.unwrap_or_default(),
            }),
            None => Err(DiscoveryError::NoSerialMatch {
                device_type,
                pattern: filters.serial_no.as_str().to_string(),
            }),
        }
    }
}

/// Resolve a device on this machine's serial ports.
///
/// `serial_no` and `port` pin the search to an exact value when given.
pub fn find_device(
    device_type: &str,
    serial_no: Option<&str>,
    port: Option<&str>,
    fallback_to_fake: bool,
) -> Result<DeviceMatch, DiscoveryError> {
    let mut query = DeviceQuery::new(device_type)?.with_fallback_to_fake(fallback_to_fake);
    if let Some(sn) = serial_no {
        query = query.with_serial_no(sn);
    }
    if let Some(p) = port {
        query = query.with_port(p);
    }
    Discovery::default().find_device(&query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filters() {
        let query = DeviceQuery::for_type(DeviceType::UsbParMar);
        let filters = ComFilters::for_query(&query).unwrap();

        let arduino = PortInfo::usb("COM3", 0x2341, 0x8036, None, Some("X".into()));
        assert_eq!(filters.check_port(&arduino), (true, true, true));

        let other = PortInfo::usb("COM4", 0x1a86, 0x7523, None, None);
        assert_eq!(filters.check_port(&other), (true, true, false));

        assert!(filters.serial_no.is_match("anything"));
    }

    #[test]
    fn test_exact_filters_are_escaped() {
        let query = DeviceQuery::for_type(DeviceType::Eva)
            .with_port("/dev/tty.usbmodem(1)")
            .with_serial_no("S0.1");
        let filters = ComFilters::for_query(&query).unwrap();

        assert!(filters.port.is_match("/dev/tty.usbmodem(1)"));
        assert!(!filters.port.is_match("/dev/tty.usbmodem(1)x"));
        assert!(filters.serial_no.is_match("S0.1"));
        assert!(!filters.serial_no.is_match("S0x1"));
    }

    #[test]
    fn test_empty_values_mean_any() {
        let query = DeviceQuery::for_type(DeviceType::UsbParMar)
            .with_serial_no("")
            .with_port("");
        assert_eq!(query.serial_no(), None);
        assert_eq!(query.port(), None);
    }

    #[test]
    fn test_hardware_id_case_insensitive() {
        let filters = ComFilters::for_query(&DeviceQuery::for_type(DeviceType::UsbParMar)).unwrap();
        let mut port = PortInfo::bare("/dev/ttyACM0");
        port.hardware_id = "usb vid:pid=2341:8036".to_string();
        assert!(filters.check_port(&port).2);
    }

    #[test]
    fn test_unsupported_device() {
        let err = DeviceQuery::new("NONEXISTANT").unwrap_err();
        assert!(matches!(err, DiscoveryError::UnsupportedDevice(_)));
    }
}
