//! Send a short marker sequence to a device and print the marker table.
//!
//! Usage: fake_markers [DEVICE_TYPE] [ADDRESS] [OUTPUT]
//!
//! Defaults to a fake UsbParMar so it runs without hardware. Set `RUST_LOG`
//! to `debug` to see every marker.

use std::env;
use std::time::Duration;

use anyhow::Context;
use markerlink_core::marker::export::TableFormat;
use markerlink_core::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args: Vec<String> = env::args().collect();
    let device_type = args.get(1).map(String::as_str).unwrap_or("UsbParMar");
    let address = args.get(2).map(String::as_str).unwrap_or(FAKE_ADDRESS);

    let config = MarkerConfig {
        fallback_to_fake: true,
        ..MarkerConfig::default()
    };
    let manager = MarkerManager::new(device_type, address, config)
        .with_context(|| format!("opening {} at {}", device_type, address))?;

    println!(
        "Device: {} (serial {}, firmware {})",
        manager.device_properties().device_name,
        manager.device_properties().serial_number,
        manager.device_properties().firmware_version
    );

    for value in [100u8, 222, 100] {
        manager.send_marker_pulse(value, 50)?;
        std::thread::sleep(Duration::from_millis(50));
    }
    manager.set_bits("00000011")?;
    std::thread::sleep(Duration::from_millis(20));
    manager.set_bit(0, "off")?;

    // Rejected, shows up in the error log
    if let Err(e) = manager.set_value(256) {
        println!("Rejected: {}", e);
    }

    let mut out = std::io::stdout();
    manager.write_marker_table(&mut out, TableFormat::Tsv)?;

    if let Some(path) = args.get(3) {
        manager.save_marker_table(path)?;
        println!("Saved to {}", path);
    }

    println!("{} marker(s), {} error(s)", manager.events().len(), manager.errors().len());
    manager.close()?;
    Ok(())
}
