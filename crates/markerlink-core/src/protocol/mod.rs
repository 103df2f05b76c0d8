//! Serial Protocol Communication
//!
//! Implements the UsbParMar command/data protocol.
//!
//! The device speaks two dialects on the same port: a slow "command" mode used
//! for identification and a fast "data" mode where every byte written is a
//! marker value.

pub mod commands;
mod connection;
mod error;
pub mod serial;
pub mod stream;

pub use commands::{Command, Reply};
pub use connection::{Connection, LinkMode};
pub use error::ProtocolError;
pub use serial::{clear_buffers, configure_port, list_ports, open_port, PortInfo};
pub use stream::{LinkOpener, SerialChannel, SerialLink, SystemLinkOpener};

/// Baud rate used while the device is in command mode
pub const COMMAND_BAUD_RATE: u32 = 4800;

/// Baud rate used while the device is streaming marker bytes
pub const DATA_BAUD_RATE: u32 = 115200;

/// Read timeout for the link in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Delay after reopening the port or sending a command, giving the device
/// time to reconfigure before the next operation
pub const SETTLE_DELAY_MS: u64 = 100;

/// Address that bypasses hardware and yields a fake device
pub const FAKE_ADDRESS: &str = "FAKE";

/// Longest identification line accepted from the device
pub const MAX_REPLY_SIZE: usize = 1024;
