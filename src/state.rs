//! Shared connection state.
//!
//! [`StateStore`] is the single coordination domain for everything the
//! sessions, the supervisor and the reconciliation loop share: serial
//! connection status, the cached network endpoint and the global token.
//! Critical sections are short and never span device I/O.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Serial connection status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No port is open.
    #[default]
    Disconnected,
    /// A port is open and adopted.
    Connected,
}

/// Serial status as recorded in the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerialState {
    /// Connection status.
    pub state: ConnectionState,
    /// Port the open handle is bound to.
    pub port: Option<String>,
}

/// Cached base URL of the network device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkEndpoint {
    /// Base URL, without trailing path.
    pub url: String,
    /// Outcome of the last discovery pass, `None` before the first one.
    pub reachable: Option<bool>,
    /// When the last discovery pass finished probing.
    pub last_probed_at: Option<Instant>,
}

impl NetworkEndpoint {
    /// Creates an endpoint that has never been probed.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reachable: None,
            last_probed_at: None,
        }
    }

    /// Returns true if the last probe happened less than `window` before `now`.
    #[must_use]
    pub fn is_fresh(&self, now: Instant, window: Duration) -> bool {
        self.last_probed_at
            .is_some_and(|at| now.saturating_duration_since(at) < window)
    }
}

/// Where a token lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenScope {
    /// Belongs to one caller's logical session.
    Session,
    /// Shared by the background loop and all callers.
    Global,
}

/// Bearer credential for the network device API.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken {
    value: String,
    scope: TokenScope,
}

impl AuthToken {
    /// Creates a token.
    #[must_use]
    pub fn new(value: impl Into<String>, scope: TokenScope) -> Self {
        Self {
            value: value.into(),
            scope,
        }
    }

    /// Raw credential.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Token scope.
    #[must_use]
    pub const fn scope(&self) -> TokenScope {
        self.scope
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthToken")
            .field("value", &"<redacted>")
            .field("scope", &self.scope)
            .finish()
    }
}

#[derive(Debug)]
struct Inner {
    serial: SerialState,
    endpoint: NetworkEndpoint,
    global_token: Option<String>,
}

/// Shared mutable state behind one lock.
#[derive(Debug)]
pub struct StateStore {
    inner: Mutex<Inner>,
}

impl StateStore {
    /// Creates a store with the given initial base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                serial: SerialState::default(),
                endpoint: NetworkEndpoint::new(base_url),
                global_token: None,
            }),
        }
    }

    // ==================== Serial ====================

    /// Returns the serial status.
    pub async fn serial(&self) -> SerialState {
        self.inner.lock().await.serial.clone()
    }

    /// Returns true if the serial device is connected.
    pub async fn serial_connected(&self) -> bool {
        self.inner.lock().await.serial.state == ConnectionState::Connected
    }

    /// Records an adopted serial port.
    pub async fn set_serial_connected(&self, port: impl Into<String>) {
        let mut inner = self.inner.lock().await;
        inner.serial = SerialState {
            state: ConnectionState::Connected,
            port: Some(port.into()),
        };
    }

    /// Records that no serial port is open.
    pub async fn set_serial_disconnected(&self) {
        self.inner.lock().await.serial = SerialState::default();
    }

    // ==================== Network ====================

    /// Returns the cached endpoint.
    pub async fn endpoint(&self) -> NetworkEndpoint {
        self.inner.lock().await.endpoint.clone()
    }

    /// Returns the cached base URL.
    pub async fn base_url(&self) -> String {
        self.inner.lock().await.endpoint.url.clone()
    }

    /// Records a successful probe of `url` and makes it the cached URL.
    pub async fn adopt_url(&self, url: impl Into<String>, at: Instant) {
        let mut inner = self.inner.lock().await;
        inner.endpoint = NetworkEndpoint {
            url: url.into(),
            reachable: Some(true),
            last_probed_at: Some(at),
        };
    }

    /// Records a discovery pass that found nothing; the cached URL is kept.
    ///
    /// Ignored if another pass replaced `url` in the meantime.
    pub async fn mark_unreachable(&self, url: &str, at: Instant) {
        let mut inner = self.inner.lock().await;
        if inner.endpoint.url != url {
            return;
        }
        inner.endpoint.reachable = Some(false);
        inner.endpoint.last_probed_at = Some(at);
    }

    /// Returns the global token, if any.
    pub async fn global_token(&self) -> Option<AuthToken> {
        self.inner
            .lock()
            .await
            .global_token
            .as_ref()
            .map(|value| AuthToken::new(value.clone(), TokenScope::Global))
    }

    /// Stores the global token.
    pub async fn set_global_token(&self, value: impl Into<String>) {
        self.inner.lock().await.global_token = Some(value.into());
    }

    /// Discards the global token if it still equals `value`.
    ///
    /// Returns true if the token was discarded.
    pub async fn discard_global_token(&self, value: &str) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.global_token.as_deref() == Some(value) {
            inner.global_token = None;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_endpoint_freshness() {
        let store = StateStore::new("http://172.16.42.1:1471");
        let start = Instant::now();
        assert!(!store.endpoint().await.is_fresh(start, Duration::from_secs(30)));

        store.adopt_url("http://172.16.42.1", start).await;
        let endpoint = store.endpoint().await;
        assert_eq!(endpoint.url, "http://172.16.42.1");
        assert_eq!(endpoint.reachable, Some(true));
        assert!(endpoint.is_fresh(start + Duration::from_secs(29), Duration::from_secs(30)));
        assert!(!endpoint.is_fresh(start + Duration::from_secs(30), Duration::from_secs(30)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_unreachable_keeps_url() {
        let store = StateStore::new("http://172.16.42.1:1471");
        store
            .mark_unreachable("http://172.16.42.1:1471", Instant::now())
            .await;
        let endpoint = store.endpoint().await;
        assert_eq!(endpoint.url, "http://172.16.42.1:1471");
        assert_eq!(endpoint.reachable, Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_unreachable_ignores_replaced_url() {
        let store = StateStore::new("http://172.16.42.1:1471");
        store.adopt_url("http://172.16.7.1", Instant::now()).await;
        store
            .mark_unreachable("http://172.16.42.1:1471", Instant::now())
            .await;
        assert_eq!(store.endpoint().await.reachable, Some(true));
    }

    #[tokio::test]
    async fn test_serial_state() {
        let store = StateStore::new("http://172.16.42.1");
        assert!(!store.serial_connected().await);

        store.set_serial_connected("COM6").await;
        assert!(store.serial_connected().await);
        assert_eq!(store.serial().await.port.as_deref(), Some("COM6"));

        store.set_serial_disconnected().await;
        assert_eq!(store.serial().await, SerialState::default());
    }

    #[tokio::test]
    async fn test_discard_only_matching_token() {
        let store = StateStore::new("http://172.16.42.1");
        store.set_global_token("abc").await;

        assert!(!store.discard_global_token("stale").await);
        assert_eq!(
            store.global_token().await.map(|t| t.value().to_string()),
            Some("abc".to_string())
        );

        assert!(store.discard_global_token("abc").await);
        assert!(store.global_token().await.is_none());
    }

    #[test]
    fn test_token_debug_redacts_value() {
        let token = AuthToken::new("s3cr3t", TokenScope::Session);
        assert!(!format!("{token:?}").contains("s3cr3t"));
    }
}
