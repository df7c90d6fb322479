//! Results of network device API calls.

use serde_json::{Value, json};

/// Why an API call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// No token could be obtained.
    Authentication,
    /// The device answered with a non-200 status.
    Status(u16),
    /// The device could not be reached.
    Connection,
    /// The request timed out.
    Timeout,
    /// Any other transport failure.
    Transport,
}

/// A failed API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// Failure class.
    pub kind: ApiErrorKind,
    /// Human-readable detail (response body for status errors).
    pub detail: String,
}

/// Outcome of every network device API operation.
///
/// API calls never fail past this type: every transport, status or
/// authentication problem is folded into [`ApiResult::Error`].
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResult {
    /// HTTP 200 with its decoded payload.
    Success(Value),
    /// Anything else.
    Error(ApiError),
}

impl ApiResult {
    /// Creates an error result.
    #[must_use]
    pub fn error(kind: ApiErrorKind, detail: impl Into<String>) -> Self {
        Self::Error(ApiError {
            kind,
            detail: detail.into(),
        })
    }

    /// Decodes a 200 response body, wrapping non-JSON text as `{"result": text}`.
    #[must_use]
    pub fn from_body(body: &str) -> Self {
        match serde_json::from_str(body) {
            Ok(value) => Self::Success(value),
            Err(_) => Self::Success(json!({ "result": body })),
        }
    }

    /// Returns true on success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns the payload on success.
    #[must_use]
    pub const fn payload(&self) -> Option<&Value> {
        match self {
            Self::Success(value) => Some(value),
            Self::Error(_) => None,
        }
    }

    /// Returns the error kind on failure.
    #[must_use]
    pub const fn error_kind(&self) -> Option<ApiErrorKind> {
        match self {
            Self::Success(_) => None,
            Self::Error(err) => Some(err.kind),
        }
    }

    /// Renders the JSON shape served to web clients: the payload itself, or
    /// `{"error": "<message>"}`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Success(value) => value.clone(),
            Self::Error(err) => {
                let message = match err.kind {
                    ApiErrorKind::Status(code) => format!("{code}: {}", err.detail),
                    _ => err.detail.clone(),
                };
                json!({ "error": message })
            }
        }
    }
}

/// Per-caller context for network device calls.
///
/// A request handler fills `token` from its user's session; background
/// callers use [`CallerContext::background`].
#[derive(Debug, Clone, Default)]
pub struct CallerContext {
    token: Option<String>,
}

impl CallerContext {
    /// Context with no session token.
    #[must_use]
    pub const fn background() -> Self {
        Self { token: None }
    }

    /// Context carrying a session-scoped token.
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// Session-scoped token, if any.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_body_json() {
        let result = ApiResult::from_body(r#"{"ok":true}"#);
        assert_eq!(result.payload(), Some(&json!({ "ok": true })));
    }

    #[test]
    fn test_from_body_wraps_text() {
        let result = ApiResult::from_body("pong");
        assert_eq!(result.payload(), Some(&json!({ "result": "pong" })));
    }

    #[test]
    fn test_to_json_status_error() {
        let result = ApiResult::error(ApiErrorKind::Status(500), "boom");
        assert_eq!(result.to_json(), json!({ "error": "500: boom" }));
        assert_eq!(result.error_kind(), Some(ApiErrorKind::Status(500)));
        assert!(!result.is_success());
    }
}
