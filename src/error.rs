//! Error types for the devlink library.

use std::fmt;

use thiserror::Error;

/// The main error type for devlink operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Serial port error.
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    /// Unexpected response from a device.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// No session is established with the device.
    #[error("not connected")]
    NotConnected,

    /// The device could not be connected before running an operation.
    #[error("{device} not connected")]
    Unavailable { device: Device },

    /// No token could be obtained from the network device.
    #[error("authentication failed after {attempts} login attempts")]
    Authentication { attempts: u8 },

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// A configuration value is malformed.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Returns true for serial or HTTP I/O failures.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Serial(_) | Self::Io(_) | Self::Http(_))
    }

    /// HTTP status a request-style caller should answer with.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Unavailable { .. } => 503,
            Self::Authentication { .. } => 401,
            _ => 500,
        }
    }
}

/// HTTP transport failures, classified the way callers need to report them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HttpError {
    /// The host could not be reached.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The request exceeded its timeout.
    #[error("request timed out")]
    Timeout,

    /// Any other request failure.
    #[error("request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for HttpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}

/// The two managed devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    /// Flipper Zero over serial.
    Flipper,
    /// WiFi Pineapple over HTTP.
    Pineapple,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flipper => f.write_str("Flipper Zero"),
            Self::Pineapple => f.write_str("WiFi Pineapple"),
        }
    }
}

/// Result type alias for devlink operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let unavailable = Error::Unavailable {
            device: Device::Flipper,
        };
        assert_eq!(unavailable.status_code(), 503);
        assert_eq!(unavailable.to_string(), "Flipper Zero not connected");
        assert_eq!(Error::Authentication { attempts: 2 }.status_code(), 401);
        assert_eq!(Error::NotConnected.status_code(), 500);
    }

    #[test]
    fn test_transport_classification() {
        assert!(Error::Http(HttpError::Timeout).is_transport());
        assert!(Error::Io(std::io::Error::other("gone")).is_transport());
        assert!(!Error::NotConnected.is_transport());
    }
}
