//! Link abstraction
//!
//! The driver talks to a [`SerialLink`] rather than a concrete serial port so
//! that the protocol can run against scripted links in tests.

use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::Duration;

use super::serial::{clear_buffers, configure_port, open_port};
use super::{ProtocolError, SETTLE_DELAY_MS};

/// An open byte link to a marker device
pub trait SerialLink: Read + Write + Send {
    /// Baud rate the link was opened with
    fn baud_rate(&self) -> u32;

    /// Discard any bytes waiting in the input buffer
    fn clear_input_buffer(&mut self) -> io::Result<()>;
}

/// Opens links by address; the driver reopens through this on every mode switch
pub trait LinkOpener: Send + Sync {
    /// Open `address` at `baud_rate` with 8N1 framing
    fn open(&self, address: &str, baud_rate: u32) -> Result<Box<dyn SerialLink>, ProtocolError>;

    /// Time the device needs after a reopen or a command before it is ready
    fn settle_delay(&self) -> Duration {
        Duration::from_millis(SETTLE_DELAY_MS)
    }
}

/// Serial port wrapper implementing SerialLink
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
    baud_rate: u32,
}

impl SerialChannel {
    /// Wrap a port opened at `baud_rate`
    pub fn new(port: Box<dyn SerialPort>, baud_rate: u32) -> Self {
        Self { port, baud_rate }
    }
}

impl Read for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl SerialLink for SerialChannel {
    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

/// Opens real serial ports through the `serialport` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLinkOpener;

impl LinkOpener for SystemLinkOpener {
    fn open(&self, address: &str, baud_rate: u32) -> Result<Box<dyn SerialLink>, ProtocolError> {
        let mut port = open_port(address, baud_rate)?;
        configure_port(port.as_mut())?;
        clear_buffers(port.as_mut())?;
        Ok(Box::new(SerialChannel::new(port, baud_rate)))
    }
}
