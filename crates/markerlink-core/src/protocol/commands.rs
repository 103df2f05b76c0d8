//! Protocol commands
//!
//! Defines the command-mode commands understood by the UsbParMar firmware and
//! the shape of the replies it sends back.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Command-mode commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Identify the device ('V' command); replies with a JSON object
    Version,

    /// Liveness check ('P' command); replies with the device name
    Ping,
}

impl Command {
    /// Get the single-character command byte
    pub fn byte(&self) -> u8 {
        match self {
            Command::Version => b'V',
            Command::Ping => b'P',
        }
    }

    /// Get the command as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Version => "V",
            Command::Ping => "P",
        }
    }
}

/// A decoded reply line
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// The line parsed as a JSON object
    Structured(Map<String, Value>),
    /// Anything else, verbatim (line terminator removed)
    Text(String),
}

impl Reply {
    /// Decode a reply line. JSON objects become [`Reply::Structured`];
    /// everything else, including JSON scalars and arrays, stays text.
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        match serde_json::from_str::<Value>(trimmed.trim()) {
            Ok(Value::Object(map)) => Reply::Structured(map),
            _ => Reply::Text(trimmed.to_string()),
        }
    }

    /// Whether the device sent nothing useful
    pub fn is_empty(&self) -> bool {
        match self {
            Reply::Structured(_) => false,
            Reply::Text(text) => text.trim().is_empty(),
        }
    }

    /// Look up a field of a structured reply as text
    pub fn field(&self, key: &str) -> Option<String> {
        match self {
            Reply::Structured(map) => map.get(key).map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
            Reply::Text(_) => None,
        }
    }
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reply::Structured(map) => write!(f, "{}", Value::Object(map.clone())),
            Reply::Text(text) => write!(f, "{}", text),
        }
    }
}
