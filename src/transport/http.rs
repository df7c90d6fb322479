//! HTTP transport over `reqwest`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::Method;
use serde_json::Value;

use crate::error::{HttpError, Result};

/// A request to the network device.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// Bearer token for the `Authorization` header.
    pub bearer: Option<String>,
    /// JSON body.
    pub body: Option<Value>,
    /// Total request timeout.
    pub timeout: Duration,
}

impl HttpRequest {
    /// Creates a request without body or credentials.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method,
            url: url.into(),
            bearer: None,
            body: None,
            timeout,
        }
    }

    /// Creates a GET request.
    #[must_use]
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self::new(Method::GET, url, timeout)
    }

    /// Sets the bearer token.
    #[must_use]
    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    /// Sets the JSON body.
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Status and body of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    /// HTTP status code.
    pub status: u16,
    /// Body text.
    pub body: String,
}

/// Executes HTTP requests.
pub trait HttpBackend: Send + Sync {
    /// Sends `request` and returns the reply, whatever its status.
    fn execute(
        &self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<HttpReply, HttpError>> + Send + '_>>;
}

/// [`HttpBackend`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestBackend {
    client: reqwest::Client,
}

impl ReqwestBackend {
    /// Creates a backend with a default client.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .build()
            .map_err(HttpError::from)?;
        Ok(Self { client })
    }

    /// Creates a backend around an existing client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl ReqwestBackend {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpReply, HttpError> {
        tracing::trace!("{} {}", request.method, request.url);

        let mut builder = self
            .client
            .request(request.method, &request.url)
            .timeout(request.timeout);
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpReply { status, body })
    }
}

impl HttpBackend for ReqwestBackend {
    fn execute(
        &self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<HttpReply, HttpError>> + Send + '_>> {
        Box::pin(self.send(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = HttpRequest::new(Method::PUT, "http://172.16.42.1/api/x", Duration::from_secs(1))
            .bearer("tok")
            .json(serde_json::json!({ "enabled": true }));
        assert_eq!(request.method, Method::PUT);
        assert_eq!(request.bearer.as_deref(), Some("tok"));
        assert!(request.body.is_some());
    }

    #[tokio::test]
    async fn test_connection_refused_is_classified() {
        // Nothing listens on port 9 of the loopback interface.
        let backend = ReqwestBackend::new().unwrap();
        let result = backend
            .execute(HttpRequest::get("http://127.0.0.1:9/api/status", Duration::from_secs(2)))
            .await;
        assert!(matches!(result, Err(HttpError::Connect(_) | HttpError::Timeout)));
    }
}
