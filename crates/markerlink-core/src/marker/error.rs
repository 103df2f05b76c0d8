//! Marker errors

use thiserror::Error;

use crate::device::{DeviceType, UnsupportedDevice};
use crate::discovery::DiscoveryError;
use crate::protocol::ProtocolError;

/// Errors raised by the marker manager
#[derive(Error, Debug)]
pub enum MarkerError {
    #[error(transparent)]
    /// Requested device type is not supported
    UnsupportedDevice(#[from] UnsupportedDevice),

    #[error("Device address should be a non-empty string")]
    /// No address given
    DeviceAddressEmpty,

    #[error("A {device_type} device at '{address}' is already in use")]
    /// Another manager already drives this device
    DuplicateDevice {
        /// Device type
        device_type: DeviceType,
        /// Device address
        address: String,
    },

    #[error("Device error: {0}")]
    /// The device could not be opened or closed
    Device(#[from] ProtocolError),

    #[error("Discovery failed: {0}")]
    /// No device could be resolved
    Discovery(#[from] DiscoveryError),

    #[error("Marker value should be a whole number, got {0}")]
    /// Marker value has a fractional part
    ValueWholeNumber(f64),

    #[error("Marker value {0} out of range (0 - 255)")]
    /// Marker value outside 0-255
    ValueOutOfRange(i64),

    #[error("Marker value {0} sent twice in a row")]
    /// Same non-zero marker sent twice in a row
    MarkerSentTwice(u8),

    #[error(
        "Marker {value} sent {elapsed_us} us after the previous marker (threshold {threshold_ms} ms)"
    )]
    /// Marker sent too soon after the previous one
    ConcurrentMarkerThreshold {
        /// Marker value
        value: u8,
        /// Time since the previous marker
        elapsed_us: i64,
        /// Configured threshold
        threshold_ms: u64,
    },

    #[error("Failed to write marker {value} to the device: {source}")]
    /// The device rejected the write
    DeviceWriteFailed {
        /// Marker value
        value: u8,
        /// Driver error
        #[source]
        source: ProtocolError,
    },

    #[error("Bits should be a string of exactly 8 characters, got {0} characters")]
    /// Bit string is not 8 characters long
    BitTypeLength(usize),

    #[error("Bits should only contain '0' and '1', got '{0}'")]
    /// Bit string contains something other than 0 and 1
    BitElements(String),

    #[error("Bit index should be a whole number from 0 to 7, got {0}")]
    /// Bit index outside 0-7
    BitTypeRange(String),

    #[error("Bit state should be 'on' or 'off', got '{0}'")]
    /// Bit state is neither on nor off
    BitState(String),

    #[error("Could not export marker table: {0}")]
    /// The marker table could not be written
    Export(#[source] std::io::Error),
}

impl MarkerError {
    /// Stable identifier of the error kind
    pub fn id(&self) -> &'static str {
        match self {
            MarkerError::UnsupportedDevice(_) => "UnsupportedDevice",
            MarkerError::DeviceAddressEmpty => "DeviceAddressEmpty",
            MarkerError::DuplicateDevice { .. } => "DuplicateDevice",
            MarkerError::Device(_) => "Device",
            MarkerError::Discovery(_) => "Discovery",
            MarkerError::ValueWholeNumber(_) => "ValueWholeNumber",
            MarkerError::ValueOutOfRange(_) => "ValueOutOfRange",
            MarkerError::MarkerSentTwice(_) => "MarkerSentTwice",
            MarkerError::ConcurrentMarkerThreshold { .. } => "ConcurrentMarkerThreshold",
            MarkerError::DeviceWriteFailed { .. } => "DeviceWriteFailed",
            MarkerError::BitTypeLength(_) => "BitTypeLength",
            MarkerError::BitElements(_) => "BitElements",
            MarkerError::BitTypeRange(_) => "BitTypeRange",
            MarkerError::BitState(_) => "BitState",
            MarkerError::Export(_) => "Export",
        }
    }

    /// Advisory errors are only fatal in strict mode
    pub fn is_advisory(&self) -> bool {
        matches!(
            self,
            MarkerError::MarkerSentTwice(_)
                | MarkerError::ConcurrentMarkerThreshold { .. }
                | MarkerError::DeviceWriteFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_ids() {
        assert_eq!(MarkerError::ValueOutOfRange(256).id(), "ValueOutOfRange");
        assert_eq!(MarkerError::MarkerSentTwice(3).id(), "MarkerSentTwice");
        assert_eq!(MarkerError::BitState("x".into()).id(), "BitState");
    }

    #[test]
    fn test_advisory_classification() {
        assert!(MarkerError::MarkerSentTwice(1).is_advisory());
        assert!(MarkerError::ConcurrentMarkerThreshold {
            value: 1,
            elapsed_us: 5,
            threshold_ms: 10
        }
        .is_advisory());
        assert!(MarkerError::DeviceWriteFailed {
            value: 1,
            source: ProtocolError::SerialDeviceClosed
        }
        .is_advisory());
        assert!(!MarkerError::ValueOutOfRange(-1).is_advisory());
        assert!(!MarkerError::ValueWholeNumber(0.5).is_advisory());
        assert!(!MarkerError::BitElements("2".into()).is_advisory());
    }

    #[test]
    fn test_error_display() {
        let err = MarkerError::ValueOutOfRange(300);
        assert_eq!(err.to_string(), "Marker value 300 out of range (0 - 255)");
    }
}
