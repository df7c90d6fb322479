//! Flipper Zero session over a serial port.

use std::sync::{Arc, Weak};

use tokio::sync::Mutex;

use crate::commands::{self, COMMAND_SENT, StorageOp};
use crate::config::SerialConfig;
use crate::error::{Error, Result};
use crate::session::reconnect::ReconnectSlot;
use crate::state::{ConnectionState, StateStore};
use crate::transport::{PortProvider, SerialLink};
use crate::types::{MonitorInfo, MonitorRaw, SerialPortDescriptor};

/// Owns the single serial connection to the Flipper.
///
/// The open handle lives behind its own lock, held for the whole
/// write/settle/read exchange so concurrent commands never interleave.
/// Connection status is mirrored into the shared [`StateStore`].
pub struct SerialDeviceSession {
    config: SerialConfig,
    state: Arc<StateStore>,
    ports: Arc<dyn PortProvider>,
    link: Mutex<Option<Box<dyn SerialLink>>>,
    reconnect: ReconnectSlot,
    this: Weak<Self>,
}

impl SerialDeviceSession {
    /// Creates a disconnected session.
    #[must_use]
    pub fn new(
        config: SerialConfig,
        state: Arc<StateStore>,
        ports: Arc<dyn PortProvider>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            config,
            state,
            ports,
            link: Mutex::new(None),
            reconnect: ReconnectSlot::new(),
            this: this.clone(),
        })
    }

    /// Returns the session configuration.
    #[must_use]
    pub const fn config(&self) -> &SerialConfig {
        &self.config
    }

    /// Returns true if a port is open.
    pub async fn is_connected(&self) -> bool {
        self.state.serial_connected().await
    }

    /// Returns the bound port.
    pub async fn port(&self) -> Option<String> {
        self.state.serial().await.port
    }

    /// Lists the serial ports on the host.
    pub async fn list_ports(&self) -> Result<Vec<SerialPortDescriptor>> {
        let ports = Arc::clone(&self.ports);
        tokio::task::spawn_blocking(move || ports.available_ports())
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?
    }

    async fn open(&self, port: &str) -> Result<Box<dyn SerialLink>> {
        let ports = Arc::clone(&self.ports);
        let port = port.to_string();
        let baud_rate = self.config.baud_rate;
        let timeout = self.config.timeout_duration();
        tokio::task::spawn_blocking(move || ports.open(&port, baud_rate, timeout))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?
    }

    /// Candidate ports: the preferred one, then every enumerated port.
    async fn candidates(&self, preferred: Option<&str>) -> Vec<String> {
        let mut candidates: Vec<String> = Vec::new();
        let preferred = preferred.unwrap_or(&self.config.port);
        if !preferred.is_empty() {
            candidates.push(preferred.to_string());
        }

        match self.list_ports().await {
            Ok(ports) => {
                for port in ports {
                    tracing::debug!(
                        "found serial port: {} (vid={:?} pid={:?} desc={:?})",
                        port.name,
                        port.vendor_id,
                        port.product_id,
                        port.description
                    );
                    if !port.name.is_empty() && !candidates.contains(&port.name) {
                        candidates.push(port.name);
                    }
                }
            }
            Err(e) => tracing::debug!("could not enumerate serial ports: {}", e),
        }

        candidates
    }

    /// Opens the first candidate port that accepts the connection.
    ///
    /// Any open handle is closed first. Returns false, leaving the session
    /// disconnected, if no candidate opens.
    pub async fn connect(&self, preferred: Option<&str>) -> bool {
        let mut link = self.link.lock().await;
        self.connect_locked(&mut link, preferred).await
    }

    /// Connects unless a handle is already open.
    ///
    /// Callers that race here share one connection attempt: the first one
    /// opens the port, the others find it open once they get the lock.
    pub async fn ensure_connected(&self) -> bool {
        let mut link = self.link.lock().await;
        if link.is_some() && self.state.serial_connected().await {
            return true;
        }
        self.connect_locked(&mut link, None).await
    }

    async fn connect_locked(
        &self,
        link: &mut Option<Box<dyn SerialLink>>,
        preferred: Option<&str>,
    ) -> bool {
        if link.take().is_some() {
            tracing::debug!("closing previous serial handle");
        }
        self.state.set_serial_disconnected().await;

        for candidate in self.candidates(preferred).await {
            tracing::info!("trying Flipper on port {}", candidate);
            match self.open(&candidate).await {
                Ok(opened) => {
                    tokio::time::sleep(self.config.open_settle()).await;
                    *link = Some(opened);
                    self.state.set_serial_connected(candidate.as_str()).await;
                    tracing::info!("Flipper Zero connected on {}", candidate);
                    return true;
                }
                Err(e) => tracing::debug!("failed to open {}: {}", candidate, e),
            }
        }

        tracing::warn!("no serial port accepted the connection");
        false
    }

    /// Closes the connection.
    pub async fn disconnect(&self) {
        let mut link = self.link.lock().await;
        if link.take().is_some() {
            tracing::info!("disconnecting from serial port");
        }
        self.state.set_serial_disconnected().await;
    }

    /// Schedules a background reconnect unless one is already running.
    ///
    /// Returns true if a reconnect task was spawned.
    pub fn schedule_reconnect(&self) -> bool {
        let Some(session) = self.this.upgrade() else {
            return false;
        };
        let spawned = self.reconnect.spawn(async move {
            if session.connect(None).await {
                tracing::info!("Flipper reconnected");
            } else {
                tracing::warn!("Flipper reconnect failed");
            }
        });
        if spawned {
            tracing::debug!("scheduled Flipper reconnect");
        }
        spawned
    }

    /// Returns true while a reconnect task is running.
    #[must_use]
    pub fn reconnect_in_flight(&self) -> bool {
        self.reconnect.in_flight()
    }

    /// Sends a command and returns whatever the device printed.
    ///
    /// Output is read once the settle delay has passed, decoded lossily and
    /// trimmed; silence is reported as `"Command sent."`. A transport
    /// failure schedules a background reconnect before being returned.
    pub async fn send_command(&self, command: &str) -> Result<String> {
        if !self.is_connected().await {
            return Err(Error::NotConnected);
        }

        let result = {
            let mut guard = self.link.lock().await;
            let link = guard.as_mut().ok_or(Error::NotConnected)?;
            self.exchange(&mut **link, command).await
        };

        if let Err(e) = &result {
            tracing::error!("Flipper command {:?} failed: {}", command, e);
            if e.is_transport() {
                self.schedule_reconnect();
            }
        }
        result
    }

    async fn exchange(&self, link: &mut dyn SerialLink, command: &str) -> Result<String> {
        link.clear_input()?;
        let line = format!("{command}\r\n");
        link.write_all(line.as_bytes()).await?;
        tokio::time::sleep(self.config.command_settle_duration()).await;

        let bytes = link.read_available().await?;
        let response = String::from_utf8_lossy(&bytes).trim().to_string();
        if response.is_empty() {
            Ok(COMMAND_SENT.to_string())
        } else {
            Ok(response)
        }
    }

    /// Reads device info, uptime and free memory.
    ///
    /// Every field is attempted even if an earlier one fails; the first
    /// error is reported in [`MonitorInfo::error`].
    pub async fn get_monitor_info(&self) -> MonitorInfo {
        let serial = self.state.serial().await;
        if serial.state != ConnectionState::Connected {
            return MonitorInfo::disconnected();
        }

        let mut first_error: Option<String> = None;
        let mut read = |result: Result<String>, field: &str| match result {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("failed to get {}: {}", field, e);
                first_error.get_or_insert_with(|| e.to_string());
                String::new()
            }
        };

        let info = read(self.send_command(commands::INFO_DEVICE).await, "device info");
        let uptime = read(self.send_command(commands::UPTIME).await, "uptime");
        let memory = read(self.send_command(commands::FREE).await, "memory");

        MonitorInfo {
            connected: true,
            port: serial.port,
            info: commands::split_lines(&info),
            uptime: uptime.trim().to_string(),
            memory: memory.trim().to_string(),
            last_updated: chrono::Utc::now(),
            raw: MonitorRaw {
                info,
                uptime,
                memory,
            },
            error: first_error,
        }
    }

    /// Runs the candidates of `op` in order, returning the first usable body.
    async fn try_storage(&self, op: StorageOp, path: &str) -> Option<String> {
        if !self.is_connected().await {
            return None;
        }

        for command in op.candidates(path) {
            match self.send_command(&command).await {
                Ok(response) => match op.settle(&command, &response) {
                    Some(body) => return Some(body),
                    None => tracing::debug!("{:?} not usable, trying next syntax", command),
                },
                Err(e) => tracing::debug!("{:?} failed: {}", command, e),
            }
        }
        None
    }

    /// Lists a storage directory; empty if no syntax worked.
    pub async fn list_files(&self, path: &str) -> Vec<String> {
        self.try_storage(StorageOp::List, path)
            .await
            .map(|response| commands::split_lines(&response))
            .unwrap_or_default()
    }

    /// Reads a file; empty if no syntax worked.
    pub async fn read_file(&self, path: &str) -> String {
        self.try_storage(StorageOp::Read, path)
            .await
            .unwrap_or_default()
    }

    /// Deletes a file; false if no syntax worked.
    pub async fn delete_file(&self, path: &str) -> bool {
        self.try_storage(StorageOp::Delete, path).await.is_some()
    }
}
