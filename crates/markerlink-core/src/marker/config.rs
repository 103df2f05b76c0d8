//! Marker manager configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default minimum spacing between markers in milliseconds
pub const DEFAULT_CONCURRENT_MARKER_THRESHOLD_MS: u64 = 10;

/// Errors loading a configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    /// File could not be read
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    /// File is not valid configuration JSON
    Json(#[from] serde_json::Error),
}

/// Behaviour of a marker manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    /// Raise advisory marker errors (double markers, markers sent too close
    /// together, failed writes) instead of only logging them
    pub crash_on_marker_errors: bool,

    /// Markers closer together than this are flagged
    pub concurrent_marker_threshold_ms: u64,

    /// Use a fake device when the real one cannot be opened
    pub fallback_to_fake: bool,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            crash_on_marker_errors: false,
            concurrent_marker_threshold_ms: DEFAULT_CONCURRENT_MARKER_THRESHOLD_MS,
            fallback_to_fake: false,
        }
    }
}

impl MarkerConfig {
    /// Default configuration with advisory errors raised
    pub fn strict() -> Self {
        Self {
            crash_on_marker_errors: true,
            ..Self::default()
        }
    }

    /// Parse a JSON configuration; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }
}
