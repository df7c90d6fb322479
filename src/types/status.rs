//! Status reports for dashboards.

use serde::Serialize;

use crate::types::SerialPortDescriptor;

/// Snapshot of both devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceStatus {
    /// Serial ports found on the host.
    pub devices: Vec<SerialPortDescriptor>,
    /// Port the Flipper is bound to.
    #[serde(rename = "flipper_connected_port")]
    pub serial_port: Option<String>,
    /// Whether a Pineapple token is available.
    #[serde(rename = "pineapple_authenticated")]
    pub network_authenticated: bool,
}

/// Reachability of the network device's current base URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkDiagnostics {
    /// Base URL after discovery.
    #[serde(rename = "pineapple_url")]
    pub url: String,
    /// Live probe result.
    pub reachable: bool,
}
