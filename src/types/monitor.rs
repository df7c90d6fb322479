//! Aggregated Flipper monitor readings.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Raw responses behind a [`MonitorInfo`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonitorRaw {
    /// Output of `info device`.
    pub info: String,
    /// Output of `uptime`.
    pub uptime: String,
    /// Output of `free`.
    pub memory: String,
}

/// Device info, uptime and memory gathered in one pass.
///
/// Each field is filled independently; `error` holds the first failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorInfo {
    /// Whether the device was connected when the pass started.
    pub connected: bool,
    /// Bound serial port.
    pub port: Option<String>,
    /// Non-empty, trimmed lines of `info device`.
    pub info: Vec<String>,
    /// Trimmed `uptime` output.
    pub uptime: String,
    /// Trimmed `free` output.
    pub memory: String,
    /// When the pass finished.
    pub last_updated: DateTime<Utc>,
    /// Untrimmed responses.
    pub raw: MonitorRaw,
    /// First error encountered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MonitorInfo {
    /// Result for a device that is not connected.
    #[must_use]
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            port: None,
            info: Vec::new(),
            uptime: String::new(),
            memory: String::new(),
            last_updated: Utc::now(),
            raw: MonitorRaw::default(),
            error: Some("Not connected".to_string()),
        }
    }
}
