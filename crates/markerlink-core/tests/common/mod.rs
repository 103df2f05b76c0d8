//! Scripted serial bus shared by the integration tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io::{self, ErrorKind, Read, Write};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use markerlink_core::discovery::PortScanner;
use markerlink_core::marker::TimeFn;
use markerlink_core::protocol::{
    LinkOpener, PortInfo, ProtocolError, SerialLink, COMMAND_BAUD_RATE, DATA_BAUD_RATE,
};

/// Identification reply of a healthy UsbParMar
pub fn ident(serial_no: &str) -> String {
    format!(
        "{{\"Version\":\"HW1:SW1.2\",\"Serialno\":\"{}\",\"Device\":\"UsbParMar\"}}\r\n",
        serial_no
    )
}

/// Hardware descriptor of an Arduino based marker device
pub fn arduino_port(name: &str) -> PortInfo {
    PortInfo::usb(name, 0x2341, 0x8036, Some("UsbParMar".into()), None)
}

#[derive(Debug, Default, Clone)]
pub struct SimDevice {
    /// Line sent back for every command; `None` refuses to open
    pub reply: Option<String>,
    /// Marker bytes received in data mode
    pub received: Vec<u8>,
    /// Commands received in command mode
    pub commands: Vec<String>,
    /// Fail every data mode write
    pub fail_writes: bool,
    /// Number of times the port was opened
    pub opens: usize,
}

#[derive(Default)]
struct BusState {
    ports: Vec<PortInfo>,
    devices: HashMap<String, SimDevice>,
}

/// A fake serial bus: a port list plus simulated devices behind some ports
#[derive(Clone, Default)]
pub struct MockBus {
    state: Arc<Mutex<BusState>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a port with a device that answers `reply`
    pub fn with_device(self, port: PortInfo, reply: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.devices.insert(
                port.name.clone(),
                SimDevice {
                    reply: Some(reply.to_string()),
                    ..Default::default()
                },
            );
            state.ports.push(port);
        }
        self
    }

    /// Add a port that cannot be opened
    pub fn with_dead_port(self, port: PortInfo) -> Self {
        self.state.lock().unwrap().ports.push(port);
        self
    }

    pub fn device(&self, name: &str) -> SimDevice {
        self.state.lock().unwrap().devices[name].clone()
    }

    pub fn set_fail_writes(&self, name: &str, fail: bool) {
        if let Some(device) = self.state.lock().unwrap().devices.get_mut(name) {
            device.fail_writes = fail;
        }
    }

    pub fn scanner(&self) -> Arc<dyn PortScanner> {
        Arc::new(self.clone())
    }

    pub fn opener(&self) -> Arc<dyn LinkOpener> {
        Arc::new(self.clone())
    }
}

impl PortScanner for MockBus {
    fn ports(&self) -> Vec<PortInfo> {
        self.state.lock().unwrap().ports.clone()
    }
}

impl LinkOpener for MockBus {
    fn open(&self, address: &str, baud_rate: u32) -> Result<Box<dyn SerialLink>, ProtocolError> {
        let mut state = self.state.lock().unwrap();
        match state.devices.get_mut(address) {
            Some(device) if device.reply.is_some() => {
                device.opens += 1;
                Ok(Box::new(MockLink {
                    bus: self.clone(),
                    address: address.to_string(),
                    baud_rate,
                    pending: VecDeque::new(),
                }))
            }
            _ => Err(ProtocolError::NoSerialDeviceMade {
                port: address.to_string(),
                reason: "no such device".to_string(),
            }),
        }
    }

    fn settle_delay(&self) -> Duration {
        Duration::ZERO
    }
}

struct MockLink {
    bus: MockBus,
    address: String,
    baud_rate: u32,
    pending: VecDeque<u8>,
}

impl Read for MockLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.pending.pop_front() {
            Some(b) => {
                buf[0] = b;
                Ok(1)
            }
            None => Err(io::Error::new(ErrorKind::TimedOut, "timeout")),
        }
    }
}

impl Write for MockLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.bus.state.lock().unwrap();
        let device = state
            .devices
            .get_mut(&self.address)
            .ok_or_else(|| io::Error::new(ErrorKind::NotConnected, "unplugged"))?;

        match self.baud_rate {
            COMMAND_BAUD_RATE => {
                device.commands.push(String::from_utf8_lossy(buf).into_owned());
                self.pending = device.reply.clone().unwrap_or_default().into_bytes().into();
            }
            DATA_BAUD_RATE => {
                if device.fail_writes {
                    return Err(io::Error::new(ErrorKind::BrokenPipe, "write failed"));
                }
                device.received.extend_from_slice(buf);
            }
            _ => {}
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SerialLink for MockLink {
    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.pending.clear();
        Ok(())
    }
}

/// Clock that only moves when told to
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start_us: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start_us)),
        }
    }

    pub fn advance_ms(&self, ms: i64) {
        self.now.fetch_add(ms * 1000, Ordering::SeqCst);
    }

    pub fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }

    pub fn time_fn(&self) -> TimeFn {
        let now = self.now.clone();
        Arc::new(move || now.load(Ordering::SeqCst))
    }
}
