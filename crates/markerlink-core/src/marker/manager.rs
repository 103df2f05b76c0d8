//! Marker manager
//!
//! The single gate through which marker values reach a device. Every value is
//! validated, written and logged under one lock; rejected and flagged values
//! go to a separate error log.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::bits::{self, BitState};
use super::export;
use super::{
    system_clock, ErrorRecord, MarkerConfig, MarkerError, MarkerEvent, MarkerInput, MarkerTable,
    TimeFn,
};
use crate::device::{
    open_device, DeviceProperties, DeviceRegistry, DeviceType, FakeDevice, MarkerDevice,
    RegistryGuard,
};
use crate::discovery::{DeviceQuery, Discovery};
use crate::protocol::{LinkOpener, SystemLinkOpener, FAKE_ADDRESS};

/// Default marker pulse length in milliseconds
pub const DEFAULT_PULSE_MS: u64 = 100;

struct DispatchState {
    device: Box<dyn MarkerDevice>,
    config: MarkerConfig,
    current_value: u8,
    events: Vec<MarkerEvent>,
    errors: Vec<ErrorRecord>,
}

/// Sends markers to one device and keeps the marker log
pub struct MarkerManager {
    device_type: DeviceType,
    address: String,
    properties: DeviceProperties,
    is_fake: bool,
    clock: TimeFn,
    start_time_us: i64,
    state: Mutex<DispatchState>,
    _registration: RegistryGuard,
}

impl std::fmt::Debug for MarkerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkerManager")
            .field("device_type", &self.device_type)
            .field("address", &self.address)
            .field("properties", &self.properties)
            .field("is_fake", &self.is_fake)
            .finish()
    }
}

/// Builder for [`MarkerManager`] with injectable link, registry and clock
pub struct MarkerManagerBuilder {
    device_type: String,
    address: String,
    config: MarkerConfig,
    opener: Arc<dyn LinkOpener>,
    registry: DeviceRegistry,
    clock: TimeFn,
}

impl MarkerManagerBuilder {
    /// Manager configuration
    pub fn config(mut self, config: MarkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Link opener used to reach the device
    pub fn opener(mut self, opener: Arc<dyn LinkOpener>) -> Self {
        self.opener = opener;
        self
    }

    /// Registry the device is claimed in, the global one by default
    pub fn registry(mut self, registry: DeviceRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Microsecond clock used for timestamps
    pub fn clock(mut self, clock: TimeFn) -> Self {
        self.clock = clock;
        self
    }

    /// Open the device and reset it to 0
    pub fn build(self) -> Result<MarkerManager, MarkerError> {
        let device_type: DeviceType = self.device_type.parse()?;
        let address = self.address.trim();
        if address.is_empty() {
            return Err(MarkerError::DeviceAddressEmpty);
        }

        let guard = claim(&self.registry, device_type, address)?;

        let (device, guard): (Box<dyn MarkerDevice>, RegistryGuard) =
            match open_device(device_type, address, self.opener.clone()) {
                Ok(device) => (device, guard),
                Err(e) if self.config.fallback_to_fake => {
                    tracing::warn!(
                        "could not open {} at '{}' ({}), falling back to a fake device",
                        device_type,
                        address,
                        e
                    );
                    drop(guard);
                    let fake_guard = claim(&self.registry, device_type, FAKE_ADDRESS)?;
                    (Box::new(FakeDevice::new(device_type)), fake_guard)
                }
                Err(e) => return Err(e.into()),
            };

        MarkerManager::assemble(device, guard, self.config, self.clock)
    }
}

fn claim(
    registry: &DeviceRegistry,
    device_type: DeviceType,
    address: &str,
) -> Result<RegistryGuard, MarkerError> {
    registry
        .register(device_type, address)
        .ok_or_else(|| MarkerError::DuplicateDevice {
            device_type,
            address: address.to_string(),
        })
}

fn validate(input: MarkerInput) -> Result<u8, MarkerError> {
    let whole = match input {
        MarkerInput::Integer(v) => v,
        MarkerInput::Float(f) => input.whole().ok_or(MarkerError::ValueWholeNumber(f))?,
    };
    u8::try_from(whole).map_err(|_| MarkerError::ValueOutOfRange(whole))
}

/// Threshold in microseconds, clamped to the clock's range
fn threshold_us(threshold_ms: u64) -> i64 {
    i64::try_from(threshold_ms.saturating_mul(1000)).unwrap_or(i64::MAX)
}

impl MarkerManager {
    /// Open `device_type` at `address` on this machine's serial ports.
    ///
    /// `address` may be the fake address to run without hardware.
    pub fn new(device_type: &str, address: &str, config: MarkerConfig) -> Result<Self, MarkerError> {
        Self::builder(device_type, address).config(config).build()
    }

    /// Builder with the system opener, global registry and system clock
    pub fn builder(device_type: impl Into<String>, address: impl Into<String>) -> MarkerManagerBuilder {
        MarkerManagerBuilder {
            device_type: device_type.into(),
            address: address.into(),
            config: MarkerConfig::default(),
            opener: Arc::new(SystemLinkOpener),
            registry: DeviceRegistry::global().clone(),
            clock: system_clock(),
        }
    }

    /// Resolve a device with `discovery`, then open it through the same link opener
    pub fn find(
        discovery: &Discovery,
        query: &DeviceQuery,
        config: MarkerConfig,
    ) -> Result<Self, MarkerError> {
        let found = discovery.find_device(query)?;
        Self::builder(found.device_type.name(), found.port)
            .opener(discovery.opener())
            .config(config)
            .build()
    }

    /// Wrap an already opened device
    pub fn from_device(
        device: Box<dyn MarkerDevice>,
        registry: &DeviceRegistry,
        config: MarkerConfig,
        clock: TimeFn,
    ) -> Result<Self, MarkerError> {
        let guard = claim(registry, device.device_type(), device.address())?;
        Self::assemble(device, guard, config, clock)
    }

    fn assemble(
        mut device: Box<dyn MarkerDevice>,
        registration: RegistryGuard,
        config: MarkerConfig,
        clock: TimeFn,
    ) -> Result<Self, MarkerError> {
        // The interval table assumes no marker is active at start
        device.write_value(0)?;

        let start_time_us = clock();
        tracing::info!(
            "marker manager ready: {} '{}' at {}",
            device.device_type(),
            device.properties().device_name,
            device.address()
        );

        Ok(Self {
            device_type: device.device_type(),
            address: device.address().to_string(),
            properties: device.properties().clone(),
            is_fake: device.is_fake(),
            clock,
            start_time_us,
            state: Mutex::new(DispatchState {
                device,
                config,
                current_value: 0,
                events: Vec::new(),
                errors: Vec::new(),
            }),
            _registration: registration,
        })
    }

    fn lock(&self) -> MutexGuard<'_, DispatchState> {
        // Logs are append-only, a panic mid-dispatch leaves them consistent
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> i64 {
        (self.clock)()
    }

    fn record(&self, state: &mut DispatchState, error: &MarkerError) {
        state.errors.push(ErrorRecord {
            message: error.to_string(),
            timestamp_us: self.now(),
        });
    }

    /// Record a fatal error and hand it back for returning
    fn reject(&self, state: &mut DispatchState, error: MarkerError) -> MarkerError {
        tracing::debug!("rejected: {}", error);
        self.record(state, &error);
        error
    }

    /// Record an advisory error; it only aborts the call in strict mode
    fn flag(&self, state: &mut DispatchState, error: MarkerError) -> Result<(), MarkerError> {
        self.record(state, &error);
        if state.config.crash_on_marker_errors {
            return Err(error);
        }
        tracing::warn!("{}", error);
        Ok(())
    }

    fn dispatch(&self, state: &mut DispatchState, input: MarkerInput) -> Result<(), MarkerError> {
        let value = validate(input).map_err(|e| self.reject(state, e))?;

        if let Some(last) = state.events.last().copied() {
            if value != 0 && value == last.value {
                self.flag(state, MarkerError::MarkerSentTwice(value))?;
            }

            let threshold_ms = state.config.concurrent_marker_threshold_ms;
            let elapsed_us = self.now().saturating_sub(last.timestamp_us);
            if elapsed_us < threshold_us(threshold_ms) {
                self.flag(
                    state,
                    MarkerError::ConcurrentMarkerThreshold {
                        value,
                        elapsed_us,
                        threshold_ms,
                    },
                )?;
            }
        }

        if let Err(source) = state.device.write_value(value) {
            self.flag(state, MarkerError::DeviceWriteFailed { value, source })?;
        }

        let timestamp_us = self.now();
        state.current_value = value;
        state.events.push(MarkerEvent {
            value,
            timestamp_us,
        });
        tracing::debug!("marker {} at {} us", value, timestamp_us);
        Ok(())
    }

    /// Set the device to `value` (0-255); 0 ends the current marker
    pub fn set_value(&self, value: impl Into<MarkerInput>) -> Result<(), MarkerError> {
        let mut state = self.lock();
        self.dispatch(&mut state, value.into())
    }

    /// Send `value`, hold it for `duration_ms`, then reset to 0.
    ///
    /// Blocks the calling thread for the whole pulse.
    pub fn send_marker_pulse(
        &self,
        value: impl Into<MarkerInput>,
        duration_ms: u64,
    ) -> Result<(), MarkerError> {
        self.set_value(value)?;
        std::thread::sleep(Duration::from_millis(duration_ms));
        self.set_value(0)
    }

    /// [`send_marker_pulse`](Self::send_marker_pulse) with the default length
    pub fn send_default_marker_pulse(&self, value: impl Into<MarkerInput>) -> Result<(), MarkerError> {
        self.send_marker_pulse(value, DEFAULT_PULSE_MS)
    }

    /// Set all eight marker lines from a bit string such as `"00000001"`
    pub fn set_bits(&self, bits: &str) -> Result<(), MarkerError> {
        let mut state = self.lock();
        let value = bits::parse_bits(bits).map_err(|e| self.reject(&mut state, e))?;
        self.dispatch(&mut state, value.into())
    }

    /// Switch one marker line, leaving the others as they are.
    ///
    /// `state` is `"on"` or `"off"`; bit 0 is the least significant.
    pub fn set_bit(&self, index: impl Into<MarkerInput>, state: &str) -> Result<(), MarkerError> {
        let mut guard = self.lock();
        let index = bits::bit_index(index.into()).map_err(|e| self.reject(&mut guard, e))?;
        let bit_state: BitState = state.parse().map_err(|e| self.reject(&mut guard, e))?;
        let value = bits::with_bit(guard.current_value, index, bit_state);
        self.dispatch(&mut guard, value.into())
    }

    /// Value currently on the device
    pub fn current_value(&self) -> u8 {
        self.lock().current_value
    }

    /// Current value as a bit string
    pub fn current_bits(&self) -> String {
        bits::format_bits(self.current_value())
    }

    /// Snapshot of the accepted markers
    pub fn events(&self) -> Vec<MarkerEvent> {
        self.lock().events.clone()
    }

    /// Snapshot of the error log
    pub fn errors(&self) -> Vec<ErrorRecord> {
        self.lock().errors.clone()
    }

    /// Current configuration
    pub fn config(&self) -> MarkerConfig {
        self.lock().config.clone()
    }

    /// Raise advisory errors instead of only logging them
    pub fn set_strict(&self, strict: bool) {
        self.lock().config.crash_on_marker_errors = strict;
    }

    /// Minimum spacing between markers before they are flagged
    pub fn set_concurrent_marker_threshold_ms(&self, threshold_ms: u64) {
        self.lock().config.concurrent_marker_threshold_ms = threshold_ms;
    }

    /// Type of the driven device
    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    /// Address of the driven device
    pub fn device_address(&self) -> &str {
        &self.address
    }

    /// Identity reported when the device was opened
    pub fn device_properties(&self) -> &DeviceProperties {
        &self.properties
    }

    /// Whether markers only go to the fake device
    pub fn is_fake(&self) -> bool {
        self.is_fake
    }

    /// Clock reading taken when the manager was created
    pub fn start_time_us(&self) -> i64 {
        self.start_time_us
    }

    /// Intervals and summary derived from the marker log
    pub fn marker_table(&self) -> MarkerTable {
        MarkerTable::from_events(&self.lock().events)
    }

    /// Write the marker table with its header block
    pub fn write_marker_table<W: std::io::Write>(
        &self,
        writer: &mut W,
        format: export::TableFormat,
    ) -> Result<(), MarkerError> {
        export::write_marker_table(
            writer,
            format,
            &self.properties,
            &self.marker_table(),
            chrono::Local::now(),
        )
        .map_err(MarkerError::Export)
    }

    /// Save the marker table to a file; see [`export::save_marker_table`]
    pub fn save_marker_table<P: AsRef<Path>>(&self, path: P) -> Result<(), MarkerError> {
        export::save_marker_table(path, &self.properties, &self.marker_table())
            .map_err(MarkerError::Export)
    }

    /// Close the device and release its registration
    pub fn close(self) -> Result<(), MarkerError> {
        let mut state = self.lock();
        state.device.close()?;
        tracing::info!("marker manager for {} at {} closed", self.device_type, self.address);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn manual_clock() -> (Arc<AtomicI64>, TimeFn) {
        let now = Arc::new(AtomicI64::new(0));
        let handle = now.clone();
        let clock: TimeFn = Arc::new(move || handle.load(Ordering::SeqCst));
        (now, clock)
    }

    fn fake_manager(config: MarkerConfig) -> (Arc<AtomicI64>, MarkerManager) {
        let (now, clock) = manual_clock();
        let manager = MarkerManager::builder("UsbParMar", FAKE_ADDRESS)
            .config(config)
            .registry(DeviceRegistry::new())
            .clock(clock)
            .build()
            .unwrap();
        (now, manager)
    }

    #[test]
    fn test_validate() {
        assert_eq!(validate(MarkerInput::from(255)).unwrap(), 255);
        assert_eq!(validate(MarkerInput::from(12.0)).unwrap(), 12);
        assert!(matches!(
            validate(MarkerInput::from(256)),
            Err(MarkerError::ValueOutOfRange(256))
        ));
        assert!(matches!(
            validate(MarkerInput::from(-1)),
            Err(MarkerError::ValueOutOfRange(-1))
        ));
        assert!(matches!(
            validate(MarkerInput::from(66.6)),
            Err(MarkerError::ValueWholeNumber(_))
        ));
        assert!(matches!(
            validate(MarkerInput::from(300.0)),
            Err(MarkerError::ValueOutOfRange(300))
        ));
    }

    #[test]
    fn test_threshold_us_saturates() {
        assert_eq!(threshold_us(0), 0);
        assert_eq!(threshold_us(10), 10_000);
        assert_eq!(threshold_us(10_000_000_000_000_000), i64::MAX);
        assert_eq!(threshold_us(u64::MAX), i64::MAX);
    }

    #[test]
    fn test_starts_at_zero() {
        let (_now, manager) = fake_manager(MarkerConfig::default());
        assert_eq!(manager.current_value(), 0);
        assert!(manager.events().is_empty());
        assert!(manager.is_fake());
        assert_eq!(manager.device_properties().device_name, "FAKE UsbParMar");
    }

    #[test]
    fn test_set_bit_uses_current_value() {
        let (now, manager) = fake_manager(MarkerConfig::default());
        manager.set_bits("00000101").unwrap();
        now.store(20_000, Ordering::SeqCst);
        manager.set_bit(1, "on").unwrap();
        assert_eq!(manager.current_value(), 7);
        assert_eq!(manager.current_bits(), "00000111");
        now.store(40_000, Ordering::SeqCst);
        manager.set_bit(0, "OFF").unwrap();
        assert_eq!(manager.current_value(), 6);
    }

    #[test]
    fn test_bit_errors_are_logged() {
        let (_now, manager) = fake_manager(MarkerConfig::default());
        assert_eq!(manager.set_bits("0101").unwrap_err().id(), "BitTypeLength");
        assert_eq!(manager.set_bit(9, "on").unwrap_err().id(), "BitTypeRange");
        assert_eq!(manager.set_bit(2, "maybe").unwrap_err().id(), "BitState");
        assert_eq!(manager.errors().len(), 3);
        assert!(manager.events().is_empty());
    }

    #[test]
    fn test_runtime_config_changes() {
        let (now, manager) = fake_manager(MarkerConfig::default());
        manager.set_concurrent_marker_threshold_ms(50);
        manager.set_strict(true);
        manager.set_value(1).unwrap();
        now.store(20_000, Ordering::SeqCst);
        assert_eq!(
            manager.set_value(2).unwrap_err().id(),
            "ConcurrentMarkerThreshold"
        );
        assert_eq!(manager.config().concurrent_marker_threshold_ms, 50);
    }
}
