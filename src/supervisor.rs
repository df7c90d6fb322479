//! Connection supervision for both devices.
//!
//! [`ConnectionSupervisor`] is what request handlers talk to. It connects the
//! serial device on demand, resolves which token a network call uses and
//! runs the background reconciliation loop that keeps both devices
//! connected.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use futures::FutureExt;
use reqwest::Method;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::{AutoConnectConfig, Settings};
use crate::error::{Device, Error, Result};
use crate::session::network::{
    LOGS_ENDPOINT, NOTIFICATIONS_ENDPOINT, SETTINGS_ENDPOINT, STATUS_ENDPOINT,
};
use crate::session::{NetworkDeviceSession, SerialDeviceSession};
use crate::state::{AuthToken, StateStore, TokenScope};
use crate::transport::{
    HttpBackend, InterfaceSource, NativePorts, PortProvider, ReqwestBackend, SystemInterfaces,
};
use crate::types::{
    ApiErrorKind, ApiResult, CallerContext, DeviceStatus, MonitorInfo, NetworkDiagnostics,
};

/// Shortest pause after a panicking reconciliation pass.
const MIN_PANIC_BACKOFF: Duration = Duration::from_secs(1);

/// Device state after one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Whether the serial device is connected.
    pub serial_connected: bool,
    /// Whether a global network token is held.
    pub network_authenticated: bool,
}

/// Handle to the running reconciliation loop.
#[derive(Debug)]
pub struct ReconcilerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReconcilerHandle {
    /// Asks the loop to exit after its current pass.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    /// Returns true once the loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Coordinates the serial and network sessions.
pub struct ConnectionSupervisor {
    state: Arc<StateStore>,
    serial: Arc<SerialDeviceSession>,
    network: Arc<NetworkDeviceSession>,
    auto: AutoConnectConfig,
    // `None` once started means both devices have auto-connect disabled.
    reconciler: OnceLock<Option<ReconcilerHandle>>,
    this: Weak<Self>,
}

impl ConnectionSupervisor {
    /// Creates a supervisor on the host's serial ports, HTTP stack and interfaces.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the settings
    /// are malformed.
    pub fn from_settings(settings: Settings) -> Result<Arc<Self>> {
        let state = Arc::new(StateStore::new(settings.network.url.as_str()));
        Self::with_transports(
            settings,
            state,
            Arc::new(NativePorts),
            Arc::new(ReqwestBackend::new()?),
            Arc::new(SystemInterfaces::default()),
        )
    }

    /// Creates a supervisor over the given state and transports.
    ///
    /// # Errors
    ///
    /// Returns an error if the network settings are malformed.
    pub fn with_transports(
        settings: Settings,
        state: Arc<StateStore>,
        ports: Arc<dyn PortProvider>,
        http: Arc<dyn HttpBackend>,
        interfaces: Arc<dyn InterfaceSource>,
    ) -> Result<Arc<Self>> {
        let serial = SerialDeviceSession::new(settings.serial, Arc::clone(&state), ports);
        let network =
            NetworkDeviceSession::new(settings.network, Arc::clone(&state), http, interfaces)?;

        Ok(Arc::new_cyclic(|this| Self {
            state,
            serial,
            network,
            auto: settings.auto_connect,
            reconciler: OnceLock::new(),
            this: this.clone(),
        }))
    }

    /// Shared state.
    #[must_use]
    pub const fn state(&self) -> &Arc<StateStore> {
        &self.state
    }

    /// Serial session.
    #[must_use]
    pub const fn serial(&self) -> &Arc<SerialDeviceSession> {
        &self.serial
    }

    /// Network session.
    #[must_use]
    pub const fn network(&self) -> &Arc<NetworkDeviceSession> {
        &self.network
    }

    // ==================== Serial ====================

    /// Runs `op` against a connected serial session.
    ///
    /// A disconnected session is connected first; if that fails the
    /// operation is not invoked and [`Error::Unavailable`] is returned. A
    /// failing operation is not retried, but a background reconnect is
    /// scheduled before its error is returned.
    pub async fn with_serial<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce(Arc<SerialDeviceSession>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.serial.ensure_connected().await {
            return Err(Error::Unavailable {
                device: Device::Flipper,
            });
        }

        let result = op(Arc::clone(&self.serial)).await;
        if result.is_err() {
            self.serial.schedule_reconnect();
        }
        result
    }

    /// Connects the serial device, optionally on a specific port.
    pub async fn connect_serial(&self, port: Option<&str>) -> bool {
        self.serial.connect(port).await
    }

    /// Disconnects the serial device.
    pub async fn disconnect_serial(&self) {
        self.serial.disconnect().await;
    }

    /// Sends a CLI command to the serial device.
    pub async fn send_command(&self, command: &str) -> Result<String> {
        self.with_serial(|serial| async move { serial.send_command(command).await })
            .await
    }

    /// Reads device info, uptime and free memory.
    pub async fn monitor_info(&self) -> Result<MonitorInfo> {
        self.with_serial(|serial| async move { Ok(serial.get_monitor_info().await) })
            .await
    }

    /// Lists a storage directory.
    pub async fn list_files(&self, path: &str) -> Result<Vec<String>> {
        self.with_serial(|serial| async move { Ok(serial.list_files(path).await) })
            .await
    }

    /// Reads a file.
    pub async fn read_file(&self, path: &str) -> Result<String> {
        self.with_serial(|serial| async move { Ok(serial.read_file(path).await) })
            .await
    }

    /// Deletes a file.
    pub async fn delete_file(&self, path: &str) -> Result<bool> {
        self.with_serial(|serial| async move { Ok(serial.delete_file(path).await) })
            .await
    }

    // ==================== Network ====================

    /// Picks the token for a network call.
    ///
    /// The caller's own token wins, then the global token. Without either
    /// the supervisor authenticates and stores the result globally only.
    pub async fn resolve_token(&self, caller: &CallerContext) -> Result<AuthToken> {
        if let Some(token) = caller.token() {
            return Ok(AuthToken::new(token, TokenScope::Session));
        }
        self.network.global_token().await
    }

    /// Calls the network device API on behalf of `caller`.
    pub async fn network_call(
        &self,
        caller: &CallerContext,
        endpoint: &str,
        method: Method,
        body: Option<Value>,
    ) -> ApiResult {
        match self.resolve_token(caller).await {
            Ok(token) => {
                self.network
                    .call_with_token(&token, endpoint, method, body)
                    .await
            }
            Err(e) => {
                tracing::warn!("no Pineapple token: {}", e);
                ApiResult::error(
                    ApiErrorKind::Authentication,
                    "Pineapple authentication failed",
                )
            }
        }
    }

    /// Device status.
    pub async fn network_status(&self, caller: &CallerContext) -> ApiResult {
        self.network_call(caller, STATUS_ENDPOINT, Method::GET, None)
            .await
    }

    /// PineAP log.
    pub async fn network_logs(&self, caller: &CallerContext) -> ApiResult {
        self.network_call(caller, LOGS_ENDPOINT, Method::GET, None)
            .await
    }

    /// Pending notifications.
    pub async fn network_notifications(&self, caller: &CallerContext) -> ApiResult {
        self.network_call(caller, NOTIFICATIONS_ENDPOINT, Method::GET, None)
            .await
    }

    /// Replaces PineAP settings.
    pub async fn update_network_settings(&self, caller: &CallerContext, settings: Value) -> ApiResult {
        self.network_call(caller, SETTINGS_ENDPOINT, Method::PUT, Some(settings))
            .await
    }

    // ==================== Reports ====================

    /// Snapshot of both devices.
    pub async fn device_status(&self, caller: &CallerContext) -> DeviceStatus {
        let devices = self.serial.list_ports().await.unwrap_or_else(|e| {
            tracing::debug!("could not enumerate serial ports: {}", e);
            Vec::new()
        });
        DeviceStatus {
            devices,
            serial_port: self.serial.port().await,
            network_authenticated: self.resolve_token(caller).await.is_ok(),
        }
    }

    /// Current base URL after discovery, with a live probe.
    pub async fn network_diagnostics(&self) -> NetworkDiagnostics {
        let url = self.network.discover_base_url(false).await;
        let reachable = self.network.probe(&url).await;
        NetworkDiagnostics { url, reachable }
    }

    // ==================== Reconciliation ====================

    /// Runs one reconciliation pass.
    ///
    /// Failures are logged and reflected in the report, never returned.
    pub async fn reconcile_once(&self) -> ReconcileReport {
        if self.auto.serial && !self.serial.is_connected().await {
            tracing::debug!("auto-connect: attempting Flipper connection");
            self.serial.connect(None).await;
        }

        if self.auto.network {
            self.network.discover(false).await;
            if let Err(e) = self.network.global_token().await {
                tracing::debug!("auto-connect: Pineapple not authenticated: {}", e);
            }
        }

        ReconcileReport {
            serial_connected: self.serial.is_connected().await,
            network_authenticated: self.network.is_authenticated().await,
        }
    }

    /// Starts the reconciliation loop.
    ///
    /// Only the first call on a supervisor does anything; it returns true.
    /// With auto-connect disabled for both devices the start is recorded
    /// but no task is spawned.
    pub fn start_reconciler(&self) -> bool {
        let mut started = false;
        self.reconciler.get_or_init(|| {
            started = true;
            if !self.auto.enabled() {
                tracing::info!("auto-connect disabled, reconciliation loop not started");
                return None;
            }
            let (stop, stopped) = watch::channel(false);
            let task = tokio::spawn(Self::reconcile_loop(
                self.this.clone(),
                self.auto.interval(),
                stopped,
            ));
            Some(ReconcilerHandle { stop, task })
        });
        started
    }

    /// Returns the running loop's handle, if one was spawned.
    #[must_use]
    pub fn reconciler(&self) -> Option<&ReconcilerHandle> {
        self.reconciler.get().and_then(Option::as_ref)
    }

    async fn reconcile_loop(
        supervisor: Weak<Self>,
        interval: Duration,
        mut stopped: watch::Receiver<bool>,
    ) {
        tracing::info!("reconciliation loop started (interval={:?})", interval);
        loop {
            let Some(this) = supervisor.upgrade() else {
                break;
            };
            let pause = match AssertUnwindSafe(this.reconcile_once()).catch_unwind().await {
                Ok(report) => {
                    tracing::trace!("reconciliation pass: {:?}", report);
                    interval
                }
                Err(_) => {
                    tracing::error!("reconciliation pass panicked");
                    interval.max(MIN_PANIC_BACKOFF)
                }
            };
            drop(this);

            tokio::select! {
                () = tokio::time::sleep(pause) => {}
                changed = stopped.changed() => {
                    if changed.is_err() || *stopped.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("reconciliation loop stopped");
    }
}
