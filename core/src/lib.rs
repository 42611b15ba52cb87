//! Blocking client for the csv2geo geocoding API.
//!
//! # Overview
//! Forward, reverse and batch geocoding over HTTPS with bearer-token auth,
//! typed errors per HTTP status, automatic backoff on 429 and tracking of the
//! `X-RateLimit-*` headers.
//!
//! # Design
//! - `GeocodeApi` is stateless and I/O-free: `build_*` produces an
//!   `HttpRequest`, `parse_*` consumes an `HttpResponse`.
//! - `Transport` performs the round-trip; `UreqTransport` is the default.
//! - `Client` ties the two together and owns the retry loop and the shared
//!   `RateLimitState`.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod api;
pub mod client;
pub mod error;
pub mod http;
pub mod ratelimit;
pub mod transport;
pub mod types;

pub use api::{GeocodeApi, DEFAULT_BASE_URL, MAX_BATCH_SIZE};
pub use client::{Client, ClientBuilder, DEFAULT_TIMEOUT, MAX_RETRIES};
pub use error::{ApiError, ErrorDetails, Result};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use ratelimit::RateLimitState;
pub use transport::{Transport, TransportError, UreqTransport};
pub use types::{
    Accuracy, AddressComponents, BatchResponse, BatchSummary, GeocodeFilters, GeocodeQuery,
    GeocodeResponse, GeocodeResult, Location,
};
