//! # devlink
//!
//! Connection management for a Flipper Zero on a serial port and a WiFi
//! Pineapple on the local network.
//!
//! The library keeps both devices reachable for a web dashboard or any
//! other caller: it finds the serial port the Flipper sits on, works out
//! which address the Pineapple currently answers at, authenticates against
//! its API and reconnects in the background when either device drops.
//!
//! ## Features
//!
//! - Async/await based API using Tokio
//! - Serial port fallback across every enumerated port
//! - Pineapple discovery from the host's private interface addresses
//! - Per-caller and shared API tokens
//! - Background reconciliation loop with one-at-a-time reconnects
//!
//! ## Quick Start
//!
//! ```no_run
//! use devlink::{CallerContext, ConnectionSupervisor, Settings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), devlink::Error> {
//!     let supervisor = ConnectionSupervisor::from_settings(Settings::load()?)?;
//!     supervisor.start_reconciler();
//!
//!     let output = supervisor.send_command("info device").await?;
//!     println!("{output}");
//!
//!     let status = supervisor.network_status(&CallerContext::background()).await;
//!     println!("{}", status.to_json());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`state`] - Shared connection state behind one lock
//! - [`session`] - Serial and network device sessions
//! - [`supervisor`] - Lazy connects, token resolution and the reconciliation loop
//! - [`transport`] - Serial, HTTP and host interface seams
//! - [`commands`] - Flipper CLI commands and storage fallbacks
//! - [`types`] - Data structures returned to callers
//! - [`config`] - Settings loaded from file and environment

pub mod commands;
pub mod config;
pub mod error;
pub mod session;
pub mod state;
pub mod supervisor;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use config::{AutoConnectConfig, NetworkConfig, SerialConfig, Settings};
pub use error::{Device, Error, HttpError, Result};
pub use session::{
    Discovery, DiscoveryOutcome, NetworkDeviceSession, ReconnectSlot, SerialDeviceSession,
};
pub use state::{AuthToken, ConnectionState, NetworkEndpoint, StateStore, TokenScope};
pub use supervisor::{ConnectionSupervisor, ReconcileReport, ReconcilerHandle};
pub use transport::serial::list_ports;
pub use types::{
    ApiError, ApiErrorKind, ApiResult, CallerContext, DeviceStatus, MonitorInfo, MonitorRaw,
    NetworkDiagnostics, SerialPortDescriptor,
};
