//! Marker Dispatch
//!
//! Validates, timestamps and logs every marker sent to a device, and derives
//! marker intervals from that log.

pub mod bits;
mod clock;
mod config;
mod error;
pub mod export;
mod manager;
pub mod table;

pub use bits::BitState;
pub use clock::{system_clock, TimeFn};
pub use config::{ConfigError, MarkerConfig, DEFAULT_CONCURRENT_MARKER_THRESHOLD_MS};
pub use error::MarkerError;
pub use manager::{MarkerManager, MarkerManagerBuilder};
pub use table::{MarkerInterval, MarkerSummary, MarkerTable, TimeBound};

use serde::{Deserialize, Serialize};
use std::fmt;

/// One accepted marker value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerEvent {
    /// Value put on the device
    pub value: u8,
    /// Clock reading in microseconds
    pub timestamp_us: i64,
}

impl MarkerEvent {
    /// Event for `value` at `timestamp_us`
    pub fn new(value: u8, timestamp_us: i64) -> Self {
        Self {
            value,
            timestamp_us,
        }
    }
}

/// One rejected or flagged operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Error message
    pub message: String,
    /// Clock reading in microseconds
    pub timestamp_us: i64,
}

/// A requested marker value before validation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarkerInput {
    /// Integer request
    Integer(i64),
    /// Floating point request; only whole numbers are valid
    Float(f64),
}

impl MarkerInput {
    /// The value as an integer, if it is a whole number
    pub fn whole(self) -> Option<i64> {
        match self {
            MarkerInput::Integer(v) => Some(v),
            MarkerInput::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(f as i64),
            MarkerInput::Float(_) => None,
        }
    }
}

impl fmt::Display for MarkerInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerInput::Integer(v) => write!(f, "{}", v),
            MarkerInput::Float(v) => write!(f, "{}", v),
        }
    }
}

macro_rules! impl_from_integer {
    ($($t:ty),*) => {
        $(impl From<$t> for MarkerInput {
            fn from(v: $t) -> Self {
                MarkerInput::Integer(v as i64)
            }
        })*
    };
}

impl_from_integer!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for MarkerInput {
    fn from(v: u64) -> Self {
        MarkerInput::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<usize> for MarkerInput {
    fn from(v: usize) -> Self {
        MarkerInput::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f32> for MarkerInput {
    fn from(v: f32) -> Self {
        MarkerInput::Float(v as f64)
    }
}

impl From<f64> for MarkerInput {
    fn from(v: f64) -> Self {
        MarkerInput::Float(v)
    }
}
