//! Marker interval reconstruction
//!
//! Turns the raw log of marker values into intervals: a marker starts when the
//! device value becomes non-zero and ends when it returns to zero or changes to
//! another marker.

use serde::{Serialize, Serializer};
use std::fmt;

use super::MarkerEvent;

/// End of an interval; markers still on at reconstruction time have no end yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBound {
    /// Microsecond timestamp or span
    Finite(i64),
    /// Still open
    Infinite,
}

impl TimeBound {
    /// Whether the bound is open
    pub fn is_infinite(&self) -> bool {
        matches!(self, TimeBound::Infinite)
    }

    /// The finite value, if any
    pub fn finite(&self) -> Option<i64> {
        match self {
            TimeBound::Finite(v) => Some(*v),
            TimeBound::Infinite => None,
        }
    }

    /// As a float, infinite bounds becoming `f64::INFINITY`
    pub fn as_f64(&self) -> f64 {
        match self {
            TimeBound::Finite(v) => *v as f64,
            TimeBound::Infinite => f64::INFINITY,
        }
    }
}

impl fmt::Display for TimeBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeBound::Finite(v) => write!(f, "{}", v),
            TimeBound::Infinite => f.write_str("inf"),
        }
    }
}

impl Serialize for TimeBound {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TimeBound::Finite(v) => serializer.serialize_i64(*v),
            TimeBound::Infinite => serializer.serialize_str("inf"),
        }
    }
}

/// One marker from onset to offset
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkerInterval {
    /// Marker value
    pub value: u8,
    /// Onset
    pub start_us: i64,
    /// Offset
    pub end_us: TimeBound,
    /// Offset minus onset
    pub duration_us: TimeBound,
    /// 1-based count of intervals with this value so far
    pub occurrence: u32,
}

/// How often a value was sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkerSummary {
    /// Marker value
    pub value: u8,
    /// Number of intervals with this value
    pub total_occurrences: u32,
}

/// Intervals in chronological order, plus per-value totals in order of first appearance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MarkerTable {
    /// Intervals by onset
    pub intervals: Vec<MarkerInterval>,
    /// Totals per value
    pub summary: Vec<MarkerSummary>,
}

impl MarkerTable {
    /// Same as [`reconstruct`]
    pub fn from_events(events: &[MarkerEvent]) -> Self {
        reconstruct(events)
    }

    /// Whether no marker was ever on
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Total occurrences of `value`, zero if it was never sent
    pub fn occurrences(&self, value: u8) -> u32 {
        self.summary
            .iter()
            .find(|s| s.value == value)
            .map(|s| s.total_occurrences)
            .unwrap_or(0)
    }
}

/// Reconstruct marker intervals from a chronological event log
pub fn reconstruct(events: &[MarkerEvent]) -> MarkerTable {
    let mut table = MarkerTable::default();
    let mut open: Option<(u8, i64)> = None;
    let mut last: Option<u8> = None;

    for event in events {
        if last == Some(event.value) {
            continue;
        }
        if let Some((value, start_us)) = open.take() {
            table.close(value, start_us, TimeBound::Finite(event.timestamp_us));
        }
        if event.value != 0 {
            open = Some((event.value, event.timestamp_us));
        }
        last = Some(event.value);
    }

    if let Some((value, start_us)) = open {
        table.close(value, start_us, TimeBound::Infinite);
    }

    table
}

impl MarkerTable {
    fn close(&mut self, value: u8, start_us: i64, end_us: TimeBound) {
        let occurrence = match self.summary.iter_mut().find(|s| s.value == value) {
            Some(entry) => {
                entry.total_occurrences += 1;
                entry.total_occurrences
            }
            None => {
                self.summary.push(MarkerSummary {
                    value,
                    total_occurrences: 1,
                });
                1
            }
        };

        let duration_us = match end_us {
            TimeBound::Finite(end) => TimeBound::Finite(end - start_us),
            TimeBound::Infinite => TimeBound::Infinite,
        };

        self.intervals.push(MarkerInterval {
            value,
            start_us,
            end_us,
            duration_us,
            occurrence,
        });
    }
}
