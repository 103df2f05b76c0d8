//! Serial port handling
//!
//! Provides low-level serial port access for marker devices.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::time::Duration;

use super::{ProtocolError, DEFAULT_TIMEOUT_MS};

/// Placeholder used for descriptor fields the OS does not report
const NOT_AVAILABLE: &str = "n/a";

/// One row of a hardware scan: an available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyACM0" or "COM3")
    pub name: String,

    /// Human readable description (USB product string when known)
    pub description: String,

    /// Hardware id in the form `USB VID:PID=2341:8036 SER=...`
    pub hardware_id: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Manufacturer name (if available)
    pub manufacturer: Option<String>,

    /// USB serial number (if available)
    pub serial_number: Option<String>,
}

impl PortInfo {
    /// Descriptor for a port the OS reports without any USB metadata
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: NOT_AVAILABLE.to_string(),
            hardware_id: NOT_AVAILABLE.to_string(),
            vid: None,
            pid: None,
            manufacturer: None,
            serial_number: None,
        }
    }

    /// Descriptor for a USB port
    pub fn usb(
        name: impl Into<String>,
        vid: u16,
        pid: u16,
        product: Option<String>,
        serial_number: Option<String>,
    ) -> Self {
        let mut hardware_id = format!("USB VID:PID={:04X}:{:04X}", vid, pid);
        if let Some(sn) = &serial_number {
            hardware_id.push_str(" SER=");
            hardware_id.push_str(sn);
        }

        Self {
            name: name.into(),
            description: product.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            hardware_id,
            vid: Some(vid),
            pid: Some(pid),
            manufacturer: None,
            serial_number,
        }
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb_info) => {
                let mut port = PortInfo::usb(
                    info.port_name,
                    usb_info.vid,
                    usb_info.pid,
                    usb_info.product,
                    usb_info.serial_number,
                );
                port.manufacturer = usb_info.manufacturer;
                port
            }
            SerialPortType::PciPort => {
                let mut port = PortInfo::bare(info.port_name);
                port.hardware_id = "PCI".to_string();
                port
            }
            _ => PortInfo::bare(info.port_name),
        }
    }
}

/// Helper used to sort port names so that:
///  - ttyACM* ports come first (sorted numerically by suffix)
///  - then ttyUSB* ports (sorted numerically)
///  - then COM ports (sorted numerically)
///  - then other ports (sorted by name)
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    if let Some(rest) = basename.strip_prefix("ttyACM") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (0, num, basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("ttyUSB") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (1, num, basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("COM") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (2, num, basename.to_string());
    }
    (3, 0, basename.to_string())
}

/// List all available serial ports, with /dev fallbacks and deterministic ordering
pub fn list_ports() -> Vec<PortInfo> {
    let mut map: HashMap<String, PortInfo> = HashMap::new();
    match serialport::available_ports() {
        Ok(ports) => {
            for info in ports {
                let p = PortInfo::from(info);
                map.entry(p.name.clone()).or_insert(p);
            }
        }
        Err(e) => tracing::warn!("serial port enumeration failed: {}", e),
    }

    // Linux-only: Add /dev/ttyACM* and /dev/ttyUSB* entries if present but not found by API
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                if fname.starts_with("ttyACM") || fname.starts_with("ttyUSB") {
                    let full = format!("/dev/{}", fname);
                    map.entry(full.clone())
                        .or_insert_with(|| PortInfo::bare(full));
                }
            }
        }
    }

    let mut v: Vec<PortInfo> = map.into_values().collect();
    v.sort_by_key(|p| port_sort_key(&p.name));
    tracing::debug!("list_ports: found {} ports", v.len());
    v
}

/// Open a serial port at the given baud rate with the default read timeout
pub fn open_port(name: &str, baud_rate: u32) -> Result<Box<dyn SerialPort>, ProtocolError> {
    serialport::new(name, baud_rate)
        .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
        .open()
        .map_err(|e| ProtocolError::NoSerialDeviceMade {
            port: name.to_string(),
            reason: e.to_string(),
        })
}

/// Configure a serial port for marker communication
pub fn configure_port(port: &mut dyn SerialPort) -> Result<(), ProtocolError> {
    // Standard 8N1 configuration
    port.set_data_bits(serialport::DataBits::Eight)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    port.set_parity(serialport::Parity::None)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    port.set_stop_bits(serialport::StopBits::One)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    port.set_flow_control(serialport::FlowControl::None)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))?;
    Ok(())
}

/// Clear the serial port buffers
pub fn clear_buffers(port: &mut dyn SerialPort) -> Result<(), ProtocolError> {
    port.clear(serialport::ClearBuffer::All)
        .map_err(|e| ProtocolError::SerialError(e.to_string()))
}
