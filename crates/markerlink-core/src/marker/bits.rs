//! Bit-level marker helpers
//!
//! Bit strings are written most significant bit first, so `"00000001"` is 1.
//! Bit indices count from the least significant bit.

use std::str::FromStr;

use super::{MarkerError, MarkerInput};

/// Number of marker lines
pub const BIT_COUNT: usize = 8;

/// Requested state of a single marker line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitState {
    /// Line high
    On,
    /// Line low
    Off,
}

impl FromStr for BitState {
    type Err = MarkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" => Ok(BitState::On),
            "off" => Ok(BitState::Off),
            _ => Err(MarkerError::BitState(s.to_string())),
        }
    }
}

impl From<bool> for BitState {
    fn from(on: bool) -> Self {
        if on {
            BitState::On
        } else {
            BitState::Off
        }
    }
}

/// Parse an 8 character bit string into a value
pub fn parse_bits(bits: &str) -> Result<u8, MarkerError> {
    let len = bits.chars().count();
    if len != BIT_COUNT {
        return Err(MarkerError::BitTypeLength(len));
    }
    if bits.chars().any(|c| c != '0' && c != '1') {
        return Err(MarkerError::BitElements(bits.to_string()));
    }
    // Only ASCII digits remain, so radix parsing cannot fail
    u8::from_str_radix(bits, 2).map_err(|_| MarkerError::BitElements(bits.to_string()))
}

/// Render a value as an 8 character bit string
pub fn format_bits(value: u8) -> String {
    format!("{:08b}", value)
}

/// Validate a bit index
pub fn bit_index(index: MarkerInput) -> Result<u8, MarkerError> {
    index
        .whole()
        .filter(|i| (0..BIT_COUNT as i64).contains(i))
        .map(|i| i as u8)
        .ok_or_else(|| MarkerError::BitTypeRange(index.to_string()))
}

/// `value` with one bit switched
pub fn with_bit(value: u8, index: u8, state: BitState) -> u8 {
    let mask = 1u8 << index;
    match state {
        BitState::On => value | mask,
        BitState::Off => value & !mask,
    }
}
