//! Device sessions.
//!
//! - [`serial`] - Flipper Zero over a serial port
//! - [`network`] - WiFi Pineapple over HTTP
//! - [`reconnect`] - one-at-a-time background reconnects

pub mod network;
pub mod reconnect;
pub mod serial;

pub use network::{Discovery, DiscoveryOutcome, NetworkDeviceSession};
pub use reconnect::ReconnectSlot;
pub use serial::SerialDeviceSession;
