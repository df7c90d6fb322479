//! Configuration for the device sessions and the reconciliation loop.
//!
//! Settings are layered with the `config` crate: an optional `devlink` file
//! (TOML, YAML, JSON, ...) in the working directory, then environment
//! variables prefixed with `DEVLINK`, using `__` between sections, e.g.
//! `DEVLINK__SERIAL__PORT=/dev/ttyACM1` or `DEVLINK__NETWORK__PASSWORD=...`.
//! Every field has a default, so an empty environment yields a usable
//! configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;

/// Default baud rate for the Flipper Zero CLI.
pub const DEFAULT_BAUD_RATE: u32 = 230_400;

/// Default base URL of the WiFi Pineapple.
pub const DEFAULT_PINEAPPLE_URL: &str = "http://172.16.42.1:1471";

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Top-level settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    /// Serial device settings.
    #[serde(default)]
    pub serial: SerialConfig,
    /// Network device settings.
    #[serde(default)]
    pub network: NetworkConfig,
    /// Background reconciliation settings.
    #[serde(default)]
    pub auto_connect: AutoConnectConfig,
}

impl Settings {
    /// Loads settings from the optional `devlink` file and the environment.
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("devlink").required(false))
            .add_source(
                config::Environment::with_prefix("DEVLINK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

/// Configuration for the serial session.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port tried first (e.g., "/dev/ttyACM0" or "COM3").
    pub port: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Open/read timeout in milliseconds.
    pub timeout_ms: u64,
    /// Delay after a port opens before it is adopted, in milliseconds.
    pub open_settle_ms: u64,
    /// Delay between writing a command and reading its response, in milliseconds.
    pub command_settle_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        let port = if cfg!(windows) { "COM3" } else { "/dev/ttyACM0" };
        Self {
            port: port.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: 2_000,
            open_settle_ms: 100,
            command_settle_ms: 600,
        }
    }
}

impl SerialConfig {
    /// Creates a configuration preferring the given port.
    #[must_use]
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    /// Sets the baud rate.
    #[must_use]
    pub const fn baud_rate(mut self, rate: u32) -> Self {
        self.baud_rate = rate;
        self
    }

    /// Sets the open/read timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = millis(timeout);
        self
    }

    /// Sets the command settle delay.
    #[must_use]
    pub fn command_settle(mut self, delay: Duration) -> Self {
        self.command_settle_ms = millis(delay);
        self
    }

    /// Open/read timeout.
    #[must_use]
    pub const fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay after opening a port.
    #[must_use]
    pub const fn open_settle(&self) -> Duration {
        Duration::from_millis(self.open_settle_ms)
    }

    /// Delay between write and read of a command.
    #[must_use]
    pub const fn command_settle_duration(&self) -> Duration {
        Duration::from_millis(self.command_settle_ms)
    }
}

/// Configuration for the network session.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Base URL tried first.
    pub url: String,
    /// Login user name.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Path probed for reachability.
    pub status_path: String,
    /// Path credentials are posted to.
    pub login_path: String,
    /// Private range host interfaces are matched against, in CIDR form.
    pub private_range: String,
    /// API port of the device.
    pub device_port: u16,
    /// Candidates always probed last during discovery.
    pub fallback_urls: Vec<String>,
    /// How long a probe result stays fresh, in seconds.
    pub freshness_secs: u64,
    /// Probe timeout in milliseconds.
    pub probe_timeout_ms: u64,
    /// Login timeout in milliseconds.
    pub login_timeout_ms: u64,
    /// API call timeout in milliseconds.
    pub api_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_PINEAPPLE_URL.to_string(),
            username: "root".to_string(),
            password: String::new(),
            status_path: "/api/status".to_string(),
            login_path: "/api/login".to_string(),
            private_range: "172.16.0.0/16".to_string(),
            device_port: 1471,
            fallback_urls: vec![
                "http://172.16.42.1:1471".to_string(),
                "http://172.16.42.1".to_string(),
            ],
            freshness_secs: 30,
            probe_timeout_ms: 3_000,
            login_timeout_ms: 8_000,
            api_timeout_ms: 10_000,
        }
    }
}

impl NetworkConfig {
    /// Creates a configuration starting from the given base URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Sets the login credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Sets the fallback candidates.
    #[must_use]
    pub fn fallback_urls(mut self, urls: Vec<String>) -> Self {
        self.fallback_urls = urls;
        self
    }

    /// Freshness window of a probe result.
    #[must_use]
    pub const fn freshness(&self) -> Duration {
        Duration::from_secs(self.freshness_secs)
    }

    /// Probe timeout.
    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Login timeout.
    #[must_use]
    pub const fn login_timeout(&self) -> Duration {
        Duration::from_millis(self.login_timeout_ms)
    }

    /// API call timeout.
    #[must_use]
    pub const fn api_timeout(&self) -> Duration {
        Duration::from_millis(self.api_timeout_ms)
    }
}

/// Configuration for the background reconciliation loop.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AutoConnectConfig {
    /// Reconnect the serial device when it is disconnected.
    pub serial: bool,
    /// Refresh discovery and authentication for the network device.
    pub network: bool,
    /// Seconds between iterations.
    pub interval_secs: u64,
}

impl Default for AutoConnectConfig {
    fn default() -> Self {
        Self {
            serial: true,
            network: true,
            interval_secs: 10,
        }
    }
}

impl AutoConnectConfig {
    /// Interval between iterations.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Returns true if any device is reconciled.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.serial || self.network
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.serial.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(settings.serial.command_settle_duration(), Duration::from_millis(600));
        assert_eq!(settings.network.url, DEFAULT_PINEAPPLE_URL);
        assert_eq!(settings.network.freshness(), Duration::from_secs(30));
        assert_eq!(settings.network.fallback_urls.len(), 2);
        assert_eq!(settings.auto_connect.interval(), Duration::from_secs(10));
        assert!(settings.auto_connect.enabled());
    }

    #[test]
    fn test_builders() {
        let serial = SerialConfig::new("/dev/ttyACM1")
            .baud_rate(115_200)
            .timeout(Duration::from_secs(1))
            .command_settle(Duration::from_millis(250));
        assert_eq!(serial.port, "/dev/ttyACM1");
        assert_eq!(serial.baud_rate, 115_200);
        assert_eq!(serial.timeout_duration(), Duration::from_secs(1));
        assert_eq!(serial.command_settle_duration(), Duration::from_millis(250));

        let network = NetworkConfig::new("http://172.16.7.1").credentials("admin", "hunter2");
        assert_eq!(network.url, "http://172.16.7.1");
        assert_eq!(network.username, "admin");
        assert_eq!(network.password, "hunter2");
    }

    #[test]
    fn test_partial_file_overrides() {
        let source = r#"
            [serial]
            port = "COM6"

            [network]
            password = "secret"
            freshness_secs = 5

            [auto_connect]
            serial = false
        "#;
        let settings: Settings = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize())
            .unwrap();

        assert_eq!(settings.serial.port, "COM6");
        assert_eq!(settings.serial.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(settings.network.password, "secret");
        assert_eq!(settings.network.freshness(), Duration::from_secs(5));
        assert_eq!(settings.network.login_path, "/api/login");
        assert!(!settings.auto_connect.serial);
        assert!(settings.auto_connect.network);
    }
}
