//! Fake device
//!
//! Stands in for real hardware at the fake address. Writes are kept in memory
//! so that callers can see what would have reached the device.

use super::{DeviceProperties, DeviceType, MarkerDevice};
use crate::protocol::{ProtocolError, FAKE_ADDRESS};

/// Loopback device that accepts every marker
#[derive(Debug, Clone)]
pub struct FakeDevice {
    device_type: DeviceType,
    properties: DeviceProperties,
    written: Vec<u8>,
    closed: bool,
}

impl FakeDevice {
    /// Fake device of `device_type` with the canned identity
    pub fn new(device_type: DeviceType) -> Self {
        Self {
            device_type,
            properties: DeviceProperties::fake(device_type),
            written: Vec::new(),
            closed: false,
        }
    }

    /// Bytes written so far, oldest first
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl MarkerDevice for FakeDevice {
    fn device_type(&self) -> DeviceType {
        self.device_type
    }

    fn address(&self) -> &str {
        FAKE_ADDRESS
    }

    fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    fn write_value(&mut self, value: u8) -> Result<(), ProtocolError> {
        if self.closed {
            return Err(ProtocolError::SerialDeviceClosed);
        }
        self.written.push(value);
        Ok(())
    }

    fn close(&mut self) -> Result<(), ProtocolError> {
        if self.closed {
            return Err(ProtocolError::SerialDeviceClosed);
        }
        self.closed = true;
        Ok(())
    }
}
