//! Connection management
//!
//! Handles the connection lifecycle of a serial marker device: the identification
//! handshake in command mode and byte streaming in data mode.

use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;

use super::{
    Command, LinkOpener, ProtocolError, Reply, SerialLink, COMMAND_BAUD_RATE, DATA_BAUD_RATE,
    MAX_REPLY_SIZE,
};
use crate::device::{DeviceProperties, DeviceType};

/// Which dialect the link is currently speaking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkMode {
    /// No link open
    Closed,
    /// Low speed, command/response exchanges
    Command,
    /// High speed, one byte per marker
    Data,
    /// Open at a baud rate that is neither of the above
    Unknown,
}

impl LinkMode {
    fn from_baud_rate(baud_rate: u32) -> Self {
        match baud_rate {
            COMMAND_BAUD_RATE => LinkMode::Command,
            DATA_BAUD_RATE => LinkMode::Data,
            _ => LinkMode::Unknown,
        }
    }
}

/// Serial connection to one marker device
pub struct Connection {
    /// Port name the device lives at
    address: String,
    /// Type the device was opened as
    device_type: DeviceType,
    /// Used to (re)open the link on every mode switch
    opener: Arc<dyn LinkOpener>,
    /// Open link, if any
    link: Option<Box<dyn SerialLink>>,
    /// Identity fetched during the handshake
    properties: DeviceProperties,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.address)
            .field("device_type", &self.device_type)
            .field("mode", &self.mode())
            .field("properties", &self.properties)
            .finish()
    }
}

impl Connection {
    /// Open the device at `address`.
    ///
    /// Identifies the device in command mode, then leaves the link open in data
    /// mode ready for markers. On failure the link is closed before returning.
    pub fn open(
        address: &str,
        device_type: DeviceType,
        opener: Arc<dyn LinkOpener>,
    ) -> Result<Self, ProtocolError> {
        let mut conn = Self {
            address: address.to_string(),
            device_type,
            opener,
            link: None,
            properties: DeviceProperties::default(),
        };

        match conn.handshake() {
            Ok(properties) => {
                tracing::info!(
                    "connected to {} '{}' (serial {}, version {}) at {}",
                    device_type,
                    properties.device_name,
                    properties.serial_number,
                    properties.firmware_version,
                    conn.address
                );
                conn.properties = properties;
                Ok(conn)
            }
            Err(e) => {
                tracing::debug!("open {}: handshake failed ({})", conn.address, e);
                conn.release_link();
                Err(e)
            }
        }
    }

    fn handshake(&mut self) -> Result<DeviceProperties, ProtocolError> {
        self.enter_command_mode()?;
        let properties = self.get_info()?;
        self.release_link();
        self.enter_data_mode()?;
        Ok(properties)
    }

    /// Port name of the device
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Type the device was opened as
    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    /// Identity reported by the device
    pub fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    /// Current link mode
    pub fn mode(&self) -> LinkMode {
        self.link
            .as_ref()
            .map(|link| LinkMode::from_baud_rate(link.baud_rate()))
            .unwrap_or(LinkMode::Closed)
    }

    /// Whether a link is open
    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    fn settle(&self) {
        let delay = self.opener.settle_delay();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }

    fn release_link(&mut self) {
        if self.link.take().is_some() {
            self.settle();
        }
    }

    fn reopen(&mut self, baud_rate: u32) -> Result<(), ProtocolError> {
        self.release_link();
        tracing::debug!("reopen {} at {} baud", self.address, baud_rate);
        let link = self.opener.open(&self.address, baud_rate)?;
        self.link = Some(link);
        self.settle();
        Ok(())
    }

    /// Reopen the link at command speed
    pub fn enter_command_mode(&mut self) -> Result<(), ProtocolError> {
        self.reopen(COMMAND_BAUD_RATE)
    }

    /// Reopen the link at data speed
    pub fn enter_data_mode(&mut self) -> Result<(), ProtocolError> {
        self.reopen(DATA_BAUD_RATE)
    }

    /// Send a command and read the one-line reply
    pub fn send_command(&mut self, cmd: &str) -> Result<Reply, ProtocolError> {
        let settle_delay = self.opener.settle_delay();
        let link = self
            .link
            .as_mut()
            .ok_or(ProtocolError::SerialDeviceClosed)?;
        if link.baud_rate() != COMMAND_BAUD_RATE {
            return Err(ProtocolError::BaudrateNotCommandmode);
        }
        if cmd.is_empty() || !cmd.is_ascii() {
            return Err(ProtocolError::CommandType(cmd.to_string()));
        }

        link.clear_input_buffer()?;
        link.write_all(cmd.as_bytes())?;
        link.flush()?;
        tracing::debug!("send_command: sent {:?}", cmd);

        if !settle_delay.is_zero() {
            std::thread::sleep(settle_delay);
        }

        let line = read_line(link.as_mut())?;
        let text = String::from_utf8(line).map_err(|_| ProtocolError::InvalidResponse)?;
        tracing::debug!("send_command: received {:?}", text);

        Ok(Reply::parse(&text))
    }

    /// Query the device identity
    pub fn get_info(&mut self) -> Result<DeviceProperties, ProtocolError> {
        let reply = self.send_command(Command::Version.as_str())?;
        DeviceProperties::from_reply(&reply, self.device_type)
    }

    /// Liveness check, answered with the device name
    pub fn ping(&mut self) -> Result<Reply, ProtocolError> {
        self.send_command(Command::Ping.as_str())
    }

    /// Write one marker byte; nothing is read back
    pub fn write_value(&mut self, value: u8) -> Result<(), ProtocolError> {
        let link = self
            .link
            .as_mut()
            .ok_or(ProtocolError::SerialDeviceClosed)?;
        if link.baud_rate() != DATA_BAUD_RATE {
            return Err(ProtocolError::BaudrateNotDatamode);
        }
        link.write_all(&[value])?;
        link.flush()?;
        Ok(())
    }

    /// Close the link. Calling this on a closed connection is an error.
    pub fn close(&mut self) -> Result<(), ProtocolError> {
        if self.link.take().is_none() {
            return Err(ProtocolError::SerialDeviceClosed);
        }
        tracing::info!("closed {}", self.address);
        Ok(())
    }
}

/// Read up to and including `\n`. A read timeout ends the line early; the
/// bytes seen so far are returned, which may be none at all.
fn read_line(link: &mut dyn SerialLink) -> Result<Vec<u8>, ProtocolError> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];

    while line.len() < MAX_REPLY_SIZE {
        match link.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => {
                line.push(byte[0]);
                if byte[0] == b'\n' {
                    break;
                }
            }
            Err(ref e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                break
            }
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(ProtocolError::IoError(e)),
        }
    }

    Ok(line)
}
