//! WiFi Pineapple session over HTTP.
//!
//! The Pineapple's address depends on how it is attached (USB/RNDIS
//! subnet, Ethernet, default `172.16.42.1`), so the session keeps a cached
//! base URL, re-validates it at most once per freshness window and falls
//! back to guessing candidates from the host's own private addresses.

use std::net::Ipv4Addr;
use std::sync::{Arc, Weak};

use ipnetwork::Ipv4Network;
use reqwest::Method;
use serde_json::{Value, json};
use tokio::time::Instant;

use crate::config::NetworkConfig;
use crate::error::{Error, HttpError, Result};
use crate::session::reconnect::ReconnectSlot;
use crate::state::{AuthToken, StateStore, TokenScope};
use crate::transport::{HttpBackend, HttpRequest, InterfaceSource};
use crate::types::{ApiErrorKind, ApiResult};

/// Login attempts made by [`NetworkDeviceSession::authenticate`].
pub const LOGIN_ATTEMPTS: u8 = 2;

/// Status endpoint.
pub const STATUS_ENDPOINT: &str = "/api/status";

/// PineAP log endpoint.
pub const LOGS_ENDPOINT: &str = "/api/pineap/log";

/// Notifications endpoint.
pub const NOTIFICATIONS_ENDPOINT: &str = "/api/notifications";

/// PineAP settings endpoint.
pub const SETTINGS_ENDPOINT: &str = "/api/pineap/settings";

/// How a discovery pass settled on its URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    /// The cached URL was still fresh; nothing was probed.
    Cached,
    /// The cached URL answered its probe.
    Confirmed,
    /// A different candidate answered and replaced the cached URL.
    Adopted,
    /// Nothing answered; the previous URL was kept.
    Exhausted,
}

/// Result of a discovery pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    /// Base URL in effect after the pass.
    pub url: String,
    /// How the pass ended.
    pub outcome: DiscoveryOutcome,
}

/// Builds the ordered discovery candidates.
///
/// Each host address inside `range` suggests the device at host octet 1 of
/// the same `/24`, with the API port first and the bare address second.
/// `fallbacks` always come last.
#[must_use]
pub fn candidate_urls(
    addrs: &[Ipv4Addr],
    range: Ipv4Network,
    port: u16,
    fallbacks: &[String],
) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();
    for addr in addrs.iter().filter(|addr| range.contains(**addr)) {
        let [a, b, c, _] = addr.octets();
        let base = format!("http://{a}.{b}.{c}.1");
        for url in [format!("{base}:{port}"), base] {
            if !fallbacks.contains(&url) && !candidates.contains(&url) {
                candidates.push(url);
            }
        }
    }
    for url in fallbacks {
        if !candidates.contains(url) {
            candidates.push(url.clone());
        }
    }
    candidates
}

/// Owns the HTTP session with the Pineapple.
///
/// Network calls never run under the [`StateStore`] lock; only the state
/// transitions around them do.
pub struct NetworkDeviceSession {
    config: NetworkConfig,
    private_range: Ipv4Network,
    state: Arc<StateStore>,
    http: Arc<dyn HttpBackend>,
    interfaces: Arc<dyn InterfaceSource>,
    reconnect: ReconnectSlot,
    this: Weak<Self>,
}

impl NetworkDeviceSession {
    /// Creates a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured private range is not an IPv4 CIDR.
    pub fn new(
        config: NetworkConfig,
        state: Arc<StateStore>,
        http: Arc<dyn HttpBackend>,
        interfaces: Arc<dyn InterfaceSource>,
    ) -> Result<Arc<Self>> {
        let private_range: Ipv4Network =
            config
                .private_range
                .parse()
                .map_err(|e| Error::InvalidConfig {
                    reason: format!("private range {:?}: {e}", config.private_range),
                })?;

        Ok(Arc::new_cyclic(|this| Self {
            config,
            private_range,
            state,
            http,
            interfaces,
            reconnect: ReconnectSlot::new(),
            this: this.clone(),
        }))
    }

    /// Returns the session configuration.
    #[must_use]
    pub const fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Returns the cached base URL without probing.
    pub async fn base_url(&self) -> String {
        self.state.base_url().await
    }

    /// Returns true if a global token is held.
    pub async fn is_authenticated(&self) -> bool {
        self.state.global_token().await.is_some()
    }

    // ==================== Discovery ====================

    /// Checks whether the API answers at `url`.
    ///
    /// 200, 401 and 403 all mean the device is alive.
    pub async fn probe(&self, url: &str) -> bool {
        let status_path = self.config.status_path.as_str();
        let status_url = if url.ends_with(status_path) {
            url.to_string()
        } else {
            format!("{}{status_path}", url.trim_end_matches('/'))
        };

        match self
            .http
            .execute(HttpRequest::get(status_url, self.config.probe_timeout()))
            .await
        {
            Ok(reply) => {
                tracing::trace!("probe {} -> {}", url, reply.status);
                matches!(reply.status, 200 | 401 | 403)
            }
            Err(e) => {
                tracing::trace!("probe {} failed: {}", url, e);
                false
            }
        }
    }

    /// Ordered discovery candidates for the current host addresses.
    pub async fn candidates(&self) -> Vec<String> {
        let addrs = self.interfaces.ipv4_addresses().await;
        candidate_urls(
            &addrs,
            self.private_range,
            self.config.device_port,
            &self.config.fallback_urls,
        )
    }

    /// Runs a discovery pass and reports how it ended.
    pub async fn discover(&self, force: bool) -> Discovery {
        let now = Instant::now();
        let endpoint = self.state.endpoint().await;

        if !force && endpoint.is_fresh(now, self.config.freshness()) {
            return Discovery {
                url: endpoint.url,
                outcome: DiscoveryOutcome::Cached,
            };
        }

        if self.probe(&endpoint.url).await {
            self.state.adopt_url(endpoint.url.as_str(), now).await;
            return Discovery {
                url: endpoint.url,
                outcome: DiscoveryOutcome::Confirmed,
            };
        }

        for candidate in self.candidates().await {
            if candidate == endpoint.url {
                continue;
            }
            if self.probe(&candidate).await {
                tracing::info!("discovered Pineapple at {}", candidate);
                self.state.adopt_url(candidate.as_str(), now).await;
                return Discovery {
                    url: candidate,
                    outcome: DiscoveryOutcome::Adopted,
                };
            }
        }

        self.state.mark_unreachable(&endpoint.url, now).await;
        tracing::warn!("no Pineapple candidate reachable, keeping {}", endpoint.url);
        Discovery {
            url: self.state.base_url().await,
            outcome: DiscoveryOutcome::Exhausted,
        }
    }

    /// Returns a base URL, re-validating it if the cached probe is stale.
    ///
    /// Discovery exhaustion is not an error: the previous URL is returned.
    pub async fn discover_base_url(&self, force: bool) -> String {
        self.discover(force).await.url
    }

    // ==================== Authentication ====================

    async fn login(&self) -> Result<String> {
        let url = format!("{}{}", self.state.base_url().await, self.config.login_path);
        let request = HttpRequest::new(Method::POST, url, self.config.login_timeout()).json(json!({
            "username": self.config.username,
            "password": self.config.password,
        }));

        let reply = self.http.execute(request).await?;
        if reply.status != 200 {
            return Err(Error::Protocol {
                message: format!("login returned HTTP {}", reply.status),
            });
        }

        let data: Value = serde_json::from_str(&reply.body).map_err(|e| Error::Protocol {
            message: format!("login returned non-JSON response: {e}"),
        })?;
        data.get("token")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::Protocol {
                message: "login response has no token".into(),
            })
    }

    /// Logs in and stores the token in the global slot.
    ///
    /// A failed login is retried once after a forced rediscovery.
    pub async fn authenticate(&self) -> Result<AuthToken> {
        self.discover(false).await;

        for attempt in 1..=LOGIN_ATTEMPTS {
            if attempt > 1 {
                self.discover(true).await;
            }
            match self.login().await {
                Ok(token) => {
                    self.state.set_global_token(token.as_str()).await;
                    tracing::info!("Pineapple authenticated (attempt {})", attempt);
                    return Ok(AuthToken::new(token, TokenScope::Global));
                }
                Err(e) => tracing::warn!("Pineapple login attempt {} failed: {}", attempt, e),
            }
        }

        tracing::error!("Pineapple authentication failed");
        Err(Error::Authentication {
            attempts: LOGIN_ATTEMPTS,
        })
    }

    /// Returns the global token, authenticating if there is none.
    pub async fn global_token(&self) -> Result<AuthToken> {
        match self.state.global_token().await {
            Some(token) => Ok(token),
            None => self.authenticate().await,
        }
    }

    // ==================== API ====================

    /// Calls the API with the global token.
    pub async fn api_call(&self, endpoint: &str, method: Method, body: Option<Value>) -> ApiResult {
        match self.global_token().await {
            Ok(token) => self.call_with_token(&token, endpoint, method, body).await,
            Err(_) => ApiResult::error(
                ApiErrorKind::Authentication,
                "Pineapple authentication failed",
            ),
        }
    }

    /// Calls the API with an already resolved token.
    ///
    /// A 401/403 answer discards the token if it is the global one.
    pub async fn call_with_token(
        &self,
        token: &AuthToken,
        endpoint: &str,
        method: Method,
        body: Option<Value>,
    ) -> ApiResult {
        let url = format!("{}{endpoint}", self.state.base_url().await);
        let mut request =
            HttpRequest::new(method, url, self.config.api_timeout()).bearer(token.value());
        if let Some(body) = body {
            request = request.json(body);
        }

        match self.http.execute(request).await {
            Ok(reply) if reply.status == 200 => ApiResult::from_body(&reply.body),
            Ok(reply) => {
                if matches!(reply.status, 401 | 403)
                    && token.scope() == TokenScope::Global
                    && self.state.discard_global_token(token.value()).await
                {
                    tracing::info!("Pineapple rejected the global token, discarded it");
                }
                ApiResult::error(ApiErrorKind::Status(reply.status), reply.body)
            }
            Err(HttpError::Timeout) => {
                self.schedule_reconnect();
                ApiResult::error(ApiErrorKind::Timeout, "Pineapple request timed out")
            }
            Err(HttpError::Connect(e)) => {
                tracing::debug!("Pineapple unreachable: {}", e);
                self.schedule_reconnect();
                ApiResult::error(ApiErrorKind::Connection, "Cannot reach WiFi Pineapple")
            }
            Err(HttpError::Request(e)) => ApiResult::error(ApiErrorKind::Transport, e),
        }
    }

    /// Schedules a background rediscovery and login unless one is running.
    ///
    /// Returns true if a reconnect task was spawned.
    pub fn schedule_reconnect(&self) -> bool {
        let Some(session) = self.this.upgrade() else {
            return false;
        };
        self.reconnect.spawn(async move {
            session.discover(true).await;
            if let Err(e) = session.authenticate().await {
                tracing::warn!("Pineapple reconnect failed: {}", e);
            }
        })
    }

    /// Returns true while a reconnect task is running.
    #[must_use]
    pub fn reconnect_in_flight(&self) -> bool {
        self.reconnect.in_flight()
    }

    /// Device status.
    pub async fn status(&self) -> ApiResult {
        self.api_call(STATUS_ENDPOINT, Method::GET, None).await
    }

    /// PineAP log.
    pub async fn logs(&self) -> ApiResult {
        self.api_call(LOGS_ENDPOINT, Method::GET, None).await
    }

    /// Pending notifications.
    pub async fn notifications(&self) -> ApiResult {
        self.api_call(NOTIFICATIONS_ENDPOINT, Method::GET, None).await
    }

    /// Replaces PineAP settings.
    pub async fn update_settings(&self, settings: Value) -> ApiResult {
        self.api_call(SETTINGS_ENDPOINT, Method::PUT, Some(settings))
            .await
    }
}
