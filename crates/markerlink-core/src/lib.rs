//! # MarkerLink Core Library
//!
//! Event markers for UsbParMar and EVA marker devices.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Serial protocol communication with marker devices
//! - Device discovery by type, serial number and port
//! - Validated, timestamped marker dispatch with a marker and error log
//! - Marker interval reconstruction and export
//!
//! ## Supported Devices
//!
//! - UsbParMar
//! - EVA
//!
//! ## Example
//!
//! ```rust,no_run
//! use markerlink_core::prelude::*;
//!
//! # fn main() -> Result<(), MarkerError> {
//! let query = DeviceQuery::new("UsbParMar")?.with_serial_no("S01234");
//! let manager = MarkerManager::find(&Discovery::default(), &query, MarkerConfig::default())?;
//!
//! manager.send_default_marker_pulse(100)?;
//! manager.set_value(7)?;
//! manager.set_value(0)?;
//!
//! manager.save_marker_table("markers.tsv")?;
//! manager.close()?;
//! # Ok(())
//! # }
//! ```

pub mod device;
pub mod discovery;
pub mod marker;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::device::{DeviceProperties, DeviceRegistry, DeviceType, MarkerDevice};
    pub use crate::discovery::{find_device, DeviceMatch, DeviceQuery, Discovery, DiscoveryError};
    pub use crate::marker::{
        MarkerConfig, MarkerError, MarkerEvent, MarkerInterval, MarkerManager, MarkerSummary,
        MarkerTable, TimeBound,
    };
    pub use crate::protocol::{Connection, ProtocolError, FAKE_ADDRESS};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
