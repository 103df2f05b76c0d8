//! Protocol errors

use thiserror::Error;

/// Errors that can occur while talking to a marker device
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Could not open serial device '{port}': {reason}")]
    /// The port could not be opened
    NoSerialDeviceMade {
        /// Port that failed
        port: String,
        /// Reason given by the OS
        reason: String,
    },

    #[error("Serial device is not in command mode")]
    /// A command was sent outside command mode
    BaudrateNotCommandmode,

    #[error("Serial device is not in data mode")]
    /// A marker was written outside data mode
    BaudrateNotDatamode,

    #[error("Serial device is closed")]
    /// The link is closed
    SerialDeviceClosed,

    #[error("Command should be a non-empty ASCII string, got {0:?}")]
    /// The command is empty or not ASCII
    CommandType(String),

    #[error("Serial device did not respond")]
    /// The device sent an empty reply
    NoResponse,

    #[error("Serial number missing from device reply: {0}")]
    /// The identification reply lacks a serial number
    NoSerialNo(String),

    #[error("Invalid response from device")]
    /// The reply is not valid UTF-8
    InvalidResponse,

    #[error("Serial port error: {0}")]
    /// The serial port rejected a setting
    SerialError(String),

    #[error("I/O error: {0}")]
    /// Read or write failure on the link
    IoError(#[from] std::io::Error),
}
