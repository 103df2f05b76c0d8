//! Device discovery against a scripted serial bus

mod common;

use common::{arduino_port, ident, MockBus};
use markerlink_core::device::DeviceType;
use markerlink_core::discovery::{DeviceQuery, Discovery, DiscoveryError, FilterKind};
use markerlink_core::protocol::{PortInfo, FAKE_ADDRESS};
use pretty_assertions::assert_eq;

fn discovery(bus: &MockBus) -> Discovery {
    Discovery::new(bus.scanner(), bus.opener())
}

fn usbparmar() -> DeviceQuery {
    DeviceQuery::new("UsbParMar").unwrap()
}

#[test]
fn test_single_device_found() {
    let bus = MockBus::new().with_device(arduino_port("/dev/ttyACM0"), &ident("S01234"));

    let found = discovery(&bus).find_device(&usbparmar()).unwrap();
    assert_eq!(found.port, "/dev/ttyACM0");
    assert_eq!(found.device_type, DeviceType::UsbParMar);
    assert_eq!(found.properties.serial_number, "S01234");
    assert!(!found.is_fake());

    // Probed once in command mode, then released
    let device = bus.device("/dev/ttyACM0");
    assert_eq!(device.commands, vec!["V".to_string()]);
    assert!(device.received.is_empty());
}

#[test]
fn test_fallback_to_fake_skips_scan() {
    // Even a bus with a real device is never touched
    let bus = MockBus::new().with_device(arduino_port("COM3"), &ident("S01234"));
    let query = usbparmar().with_fallback_to_fake(true);

    let found = discovery(&bus).find_device(&query).unwrap();
    assert!(found.is_fake());
    assert_eq!(found.port, FAKE_ADDRESS);
    assert_eq!(found.properties.device_name, "FAKE UsbParMar");
    assert_eq!(bus.device("COM3").opens, 0);
}

#[test]
fn test_serial_number_selects_device() {
    let bus = MockBus::new()
        .with_device(arduino_port("COM3"), &ident("S00001"))
        .with_device(arduino_port("COM4"), &ident("S00002"));

    let found = discovery(&bus)
        .find_device(&usbparmar().with_serial_no("S00002"))
        .unwrap();
    assert_eq!(found.port, "COM4");
}

#[test]
fn test_multiple_matches_rejected() {
    let bus = MockBus::new()
        .with_device(arduino_port("COM3"), &ident("S00001"))
        .with_device(arduino_port("COM4"), &ident("S00002"));

    let err = discovery(&bus).find_device(&usbparmar()).unwrap_err();
    match err {
        DiscoveryError::MultipleConnections { first, second } => {
            assert_eq!(first, "COM3");
            assert_eq!(second, "COM4");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_no_port_match() {
    let bus = MockBus::new().with_device(arduino_port("COM3"), &ident("S01234"));
    let err = discovery(&bus)
        .find_device(&usbparmar().with_port("COM9"))
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::NoComMatch(FilterKind::Port)));

    let empty = MockBus::new();
    let err = discovery(&empty).find_device(&usbparmar()).unwrap_err();
    assert!(matches!(err, DiscoveryError::NoComMatch(FilterKind::Port)));
}

#[test]
fn test_no_hardware_id_match() {
    let bus = MockBus::new().with_dead_port(PortInfo::usb("COM5", 0x1a86, 0x7523, None, None));
    let err = discovery(&bus).find_device(&usbparmar()).unwrap_err();
    assert!(matches!(err, DiscoveryError::NoComMatch(FilterKind::HardwareId)));
}

#[test]
fn test_no_combined_match() {
    // The pinned port exists but is not an Arduino, the Arduino is elsewhere
    let bus = MockBus::new()
        .with_dead_port(PortInfo::bare("COM1"))
        .with_device(arduino_port("COM3"), &ident("S01234"));
    let err = discovery(&bus)
        .find_device(&usbparmar().with_port("COM1"))
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::NoComMatch(FilterKind::Combined)));
}

#[test]
fn test_no_serial_match() {
    let bus = MockBus::new().with_device(arduino_port("COM3"), &ident("S01234"));

    // Serial numbers match exactly, never as a prefix
    let err = discovery(&bus)
        .find_device(&usbparmar().with_serial_no("S0123"))
        .unwrap_err();
    assert!(matches!(
        err,
        DiscoveryError::NoSerialMatch {
            device_type: DeviceType::UsbParMar,
            ..
        }
    ));
}

#[test]
fn test_no_connection() {
    let bus = MockBus::new().with_dead_port(arduino_port("COM3"));
    let err = discovery(&bus)
        .find_device(&usbparmar().with_serial_no("S01234"))
        .unwrap_err();
    match err {
        DiscoveryError::NoConnection { last_error, .. } => assert!(last_error.contains("COM3")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_unreachable_candidates_skipped() {
    let bus = MockBus::new()
        .with_dead_port(arduino_port("/dev/ttyACM0"))
        .with_device(arduino_port("/dev/ttyACM1"), &ident("S01234"));

    let found = discovery(&bus).find_device(&usbparmar()).unwrap();
    assert_eq!(found.port, "/dev/ttyACM1");
}

#[test]
fn test_silent_device_is_not_a_connection() {
    let bus = MockBus::new().with_device(arduino_port("COM3"), "");
    let err = discovery(&bus).find_device(&usbparmar()).unwrap_err();
    assert!(matches!(err, DiscoveryError::NoConnection { .. }));
}
