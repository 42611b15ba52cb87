//! Executes `HttpRequest` values against the network.
//!
//! # Design
//! `Transport` is the only place the SDK performs I/O. `UreqTransport` is the
//! default; tests and embedders can plug in their own through
//! `ClientBuilder::transport`. Non-2xx responses are data, not errors: status
//! interpretation belongs to `GeocodeApi`.

use std::fmt;
use std::io;
use std::time::Duration;

use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Large batch responses exceed ureq's default 10 MB body limit.
const MAX_BODY_BYTES: u64 = 256 * 1024 * 1024;

/// Failure to obtain any response at all.
#[derive(Debug)]
pub enum TransportError {
    /// The call exceeded its timeout or was aborted.
    Timeout(String),
    /// DNS, connect, TLS or mid-stream I/O failure.
    Connection(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Timeout(msg) => write!(f, "timed out: {msg}"),
            TransportError::Connection(msg) => write!(f, "connection failed: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Performs one HTTP round-trip.
pub trait Transport: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Blocking transport backed by a shared `ureq::Agent`.
///
/// The timeout covers one call end to end; every retry starts a fresh window.
pub struct UreqTransport {
    agent: ureq::Agent,
    timeout: Duration,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .new_agent();
        Self { agent, timeout }
    }
}

impl fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UreqTransport")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let result = match (request.method, request.body.as_deref()) {
            (HttpMethod::Get, _) => {
                let mut builder = self.agent.get(request.url.as_str());
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                builder.call()
            }
            (HttpMethod::Post, body) => {
                let mut builder = self.agent.post(request.url.as_str());
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                builder.send(body.unwrap_or_default().as_bytes())
            }
        };
        let mut response = result.map_err(|e| self.map_error(e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .body_mut()
            .with_config()
            .limit(MAX_BODY_BYTES)
            .read_to_string()
            .map_err(|e| self.map_error(e))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

impl UreqTransport {
    fn map_error(&self, err: ureq::Error) -> TransportError {
        match err {
            ureq::Error::Timeout(_) => {
                TransportError::Timeout(format!("no response within {:?}", self.timeout))
            }
            ureq::Error::Io(ref io_err)
                if io_err.kind() == io::ErrorKind::TimedOut =>
            {
                TransportError::Timeout(format!("no response within {:?}", self.timeout))
            }
            other => TransportError::Connection(other.to_string()),
        }
    }
}
