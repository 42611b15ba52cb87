//! Error types for the geocoding client.
//!
//! # Design
//! One enum, one level of discrimination. Each HTTP status the API documents
//! gets its own variant carrying the server's `ErrorDetails`; everything else
//! non-2xx lands in `Api`. Local failures (`Configuration`, `Validation`) are
//! raised before any request leaves the process.

use std::fmt;
use std::time::Duration;

/// Structured error payload from the API's `{"error": {...}}` envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetails {
    pub message: String,
    /// Machine-readable code, when the server supplied one.
    pub code: Option<String>,
    pub status: u16,
}

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({code}, HTTP {})", self.message, self.status),
            None => write!(f, "{} (HTTP {})", self.message, self.status),
        }
    }
}

/// Errors returned by `Client` operations and `GeocodeApi` parse methods.
#[derive(Debug)]
pub enum ApiError {
    /// The client could not be constructed (missing key, bad base URL).
    Configuration(String),

    /// Input rejected locally; no request was sent.
    Validation(String),

    /// HTTP 400.
    InvalidRequest(ErrorDetails),

    /// HTTP 401: key missing, invalid or revoked.
    Authentication(ErrorDetails),

    /// HTTP 403: key lacks the required permission.
    Permission(ErrorDetails),

    /// HTTP 429. `retry_after` is the delay the server advised.
    RateLimited {
        details: ErrorDetails,
        retry_after: Duration,
    },

    /// The call did not complete within the configured timeout.
    Timeout(String),

    /// The server could not be reached.
    Connection(String),

    /// Any other non-2xx status.
    Api(ErrorDetails),

    /// The response body could not be deserialized into the expected type.
    Deserialization(String),

    /// The request payload could not be serialized to JSON.
    Serialization(String),
}

impl ApiError {
    /// Server-side details, for the variants that originate from a response.
    pub fn details(&self) -> Option<&ErrorDetails> {
        match self {
            ApiError::InvalidRequest(d)
            | ApiError::Authentication(d)
            | ApiError::Permission(d)
            | ApiError::Api(d) => Some(d),
            ApiError::RateLimited { details, .. } => Some(details),
            _ => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::Configuration(msg)
            | ApiError::Validation(msg)
            | ApiError::Timeout(msg)
            | ApiError::Connection(msg)
            | ApiError::Deserialization(msg)
            | ApiError::Serialization(msg) => msg,
            ApiError::InvalidRequest(d)
            | ApiError::Authentication(d)
            | ApiError::Permission(d)
            | ApiError::Api(d) => &d.message,
            ApiError::RateLimited { details, .. } => &details.message,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            ApiError::Timeout(_) => Some("timeout"),
            ApiError::Connection(_) => Some("connection_error"),
            _ => self.details().and_then(|d| d.code.as_deref()),
        }
    }

    pub fn status(&self) -> Option<u16> {
        self.details().map(|d| d.status)
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ApiError::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ApiError::RateLimited { .. })
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Configuration(msg) => write!(f, "configuration error: {msg}"),
            ApiError::Validation(msg) => write!(f, "validation failed: {msg}"),
            ApiError::InvalidRequest(d) => write!(f, "invalid request: {d}"),
            ApiError::Authentication(d) => write!(f, "authentication failed: {d}"),
            ApiError::Permission(d) => write!(f, "permission denied: {d}"),
            ApiError::RateLimited {
                details,
                retry_after,
            } => {
                write!(
                    f,
                    "rate limited: {details}; retry after {}s",
                    retry_after.as_secs()
                )
            }
            ApiError::Timeout(msg) => write!(f, "request timed out: {msg}"),
            ApiError::Connection(msg) => write!(f, "connection failed: {msg}"),
            ApiError::Api(d) => write!(f, "API error: {d}"),
            ApiError::Deserialization(msg) => write!(f, "deserialization failed: {msg}"),
            ApiError::Serialization(msg) => write!(f, "serialization failed: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

pub type Result<T> = std::result::Result<T, ApiError>;
