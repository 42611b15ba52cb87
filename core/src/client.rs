//! Blocking geocoding client: transport, auto-retry and rate-limit tracking.
//!
//! # Design
//! `Client` wraps the stateless `GeocodeApi` with the parts that need I/O or
//! state. Every operation runs the same chain: build, send, record the
//! rate-limit headers, back off and resend on 429 (up to `MAX_RETRIES`),
//! then parse. The only shared mutable state is `RateLimitState`, overwritten
//! last-write-wins by whichever response arrives last.

use std::env;
use std::sync::{PoisonError, RwLock};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::api::{GeocodeApi, DEFAULT_BASE_URL};
use crate::error::{ApiError, Result};
use crate::http::{HttpRequest, HttpResponse};
use crate::ratelimit::{backoff_delay, RateLimitState};
use crate::transport::{Transport, TransportError, UreqTransport};
use crate::types::{
    BatchResponse, GeocodeFilters, GeocodeQuery, GeocodeResponse, GeocodeResult, Location,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Retries allowed per call after the first 429.
pub const MAX_RETRIES: u32 = 3;

pub const API_KEY_ENV: &str = "CSV2GEO_API_KEY";
pub const BASE_URL_ENV: &str = "CSV2GEO_BASE_URL";
pub const TIMEOUT_ENV: &str = "CSV2GEO_TIMEOUT_SECS";
pub const AUTO_RETRY_ENV: &str = "CSV2GEO_AUTO_RETRY";

/// Client for the csv2geo geocoding API.
///
/// ```no_run
/// use csv2geo_core::{Client, GeocodeFilters};
///
/// let client = Client::new("your_api_key")?;
/// if let Some(result) = client.geocode("1600 Pennsylvania Ave, Washington DC", &GeocodeFilters::default())? {
///     println!("{}, {}", result.lat(), result.lng());
/// }
/// # Ok::<(), csv2geo_core::ApiError>(())
/// ```
pub struct Client {
    api: GeocodeApi,
    transport: Box<dyn Transport>,
    auto_retry: bool,
    rate_limit: RwLock<RateLimitState>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("api", &self.api)
            .field("auto_retry", &self.auto_retry)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Client with default base URL, timeout and auto-retry.
    pub fn new(api_key: &str) -> Result<Self> {
        Self::builder(api_key).build()
    }

    pub fn builder(api_key: &str) -> ClientBuilder {
        ClientBuilder::new(api_key)
    }

    /// Configure from `CSV2GEO_API_KEY` and the optional `CSV2GEO_BASE_URL`,
    /// `CSV2GEO_TIMEOUT_SECS` and `CSV2GEO_AUTO_RETRY` variables.
    pub fn from_env() -> Result<Self> {
        ClientBuilder::from_env()?.build()
    }

    // -----------------------------------------------------------------------
    // Forward
    // -----------------------------------------------------------------------

    /// Best match for `address`, or `None` when the API found nothing.
    pub fn geocode(&self, address: &str, filters: &GeocodeFilters) -> Result<Option<GeocodeResult>> {
        Ok(self.geocode_full(address, filters)?.into_best())
    }

    /// Every candidate for `address`, best first.
    pub fn geocode_full(&self, address: &str, filters: &GeocodeFilters) -> Result<GeocodeResponse> {
        let request = self.api.build_geocode(address, filters);
        let query = GeocodeQuery::Address {
            address: address.to_string(),
            filters: filters.clone(),
        };
        self.execute(&request, |response| self.api.parse_response(response, query))
    }

    /// One response per address, in input order. At most 10,000 addresses.
    pub fn geocode_batch<S: AsRef<str>>(&self, addresses: &[S]) -> Result<Vec<GeocodeResponse>> {
        Ok(self.geocode_batch_full(addresses)?.results)
    }

    pub fn geocode_batch_full<S: AsRef<str>>(&self, addresses: &[S]) -> Result<BatchResponse> {
        let request = self.api.build_geocode_batch(addresses)?;
        let queries = addresses
            .iter()
            .map(|a| GeocodeQuery::Address {
                address: a.as_ref().to_string(),
                filters: GeocodeFilters::default(),
            })
            .collect();
        self.execute(&request, |response| self.api.parse_batch(response, queries))
    }

    // -----------------------------------------------------------------------
    // Reverse
    // -----------------------------------------------------------------------

    /// Best address for the coordinates, or `None` when nothing is nearby.
    pub fn reverse(&self, lat: f64, lng: f64) -> Result<Option<GeocodeResult>> {
        Ok(self.reverse_full(lat, lng)?.into_best())
    }

    pub fn reverse_full(&self, lat: f64, lng: f64) -> Result<GeocodeResponse> {
        let location = Location::new(lat, lng);
        let request = self.api.build_reverse(location)?;
        self.execute(&request, |response| {
            self.api
                .parse_response(response, GeocodeQuery::Coordinates(location))
        })
    }

    /// One response per coordinate pair, in input order. At most 10,000.
    pub fn reverse_batch(&self, coordinates: &[Location]) -> Result<Vec<GeocodeResponse>> {
        Ok(self.reverse_batch_full(coordinates)?.results)
    }

    pub fn reverse_batch_full(&self, coordinates: &[Location]) -> Result<BatchResponse> {
        let request = self.api.build_reverse_batch(coordinates)?;
        let queries = coordinates
            .iter()
            .copied()
            .map(GeocodeQuery::Coordinates)
            .collect();
        self.execute(&request, |response| self.api.parse_batch(response, queries))
    }

    // -----------------------------------------------------------------------
    // State
    // -----------------------------------------------------------------------

    /// Rate-limit headers from the most recent response of any call.
    pub fn rate_limit(&self) -> RateLimitState {
        self.rate_limit
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn auto_retry(&self) -> bool {
        self.auto_retry
    }

    pub fn base_url(&self) -> &str {
        self.api.base_url()
    }

    // -----------------------------------------------------------------------
    // Request lifecycle
    // -----------------------------------------------------------------------

    fn execute<T>(
        &self,
        request: &HttpRequest,
        parse: impl FnOnce(HttpResponse) -> Result<T>,
    ) -> Result<T> {
        let result = self.send(request).and_then(parse);
        if let Err(ref err) = result {
            debug!(
                method = request.method.as_str(),
                url = %request.url,
                error = %err,
                "geocoding request failed"
            );
        }
        result
    }

    /// Send `request`, resending after the advised delay while the server
    /// answers 429 and retries remain. The last response is returned as-is.
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut retries = 0;
        loop {
            debug!(
                method = request.method.as_str(),
                url = %request.url,
                attempt = retries + 1,
                "sending geocoding request"
            );
            let response = self.transport.execute(request).map_err(|e| match e {
                TransportError::Timeout(msg) => ApiError::Timeout(msg),
                TransportError::Connection(msg) => ApiError::Connection(msg),
            })?;
            self.record_rate_limit(&response);

            if response.status != 429 || !self.auto_retry || retries >= MAX_RETRIES {
                return Ok(response);
            }

            let delay = backoff_delay(&response);
            retries += 1;
            warn!(
                url = %request.url,
                delay_secs = delay.as_secs(),
                retry = retries,
                max_retries = MAX_RETRIES,
                "rate limited, backing off"
            );
            thread::sleep(delay);
        }
    }

    fn record_rate_limit(&self, response: &HttpResponse) {
        let state = RateLimitState::from_response(response);
        *self
            .rate_limit
            .write()
            .unwrap_or_else(PoisonError::into_inner) = state;
    }
}

/// Optional settings for `Client`.
pub struct ClientBuilder {
    api_key: String,
    base_url: String,
    timeout: Duration,
    auto_retry: bool,
    transport: Option<Box<dyn Transport>>,
}

impl ClientBuilder {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            auto_retry: true,
            transport: None,
        }
    }

    /// Builder seeded from the `CSV2GEO_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup(API_KEY_ENV)
            .ok_or_else(|| ApiError::Configuration(format!("{API_KEY_ENV} is not set")))?;
        let mut builder = Self::new(&api_key);

        if let Some(base_url) = lookup(BASE_URL_ENV) {
            builder = builder.base_url(&base_url);
        }
        if let Some(raw) = lookup(TIMEOUT_ENV) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                ApiError::Configuration(format!("{TIMEOUT_ENV} must be whole seconds, got {raw:?}"))
            })?;
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(raw) = lookup(AUTO_RETRY_ENV) {
            builder = builder.auto_retry(parse_flag(&raw).ok_or_else(|| {
                ApiError::Configuration(format!("{AUTO_RETRY_ENV} must be true or false, got {raw:?}"))
            })?);
        }
        Ok(builder)
    }

    pub fn base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    /// Per-call timeout. Ignored when a custom transport is supplied.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn auto_retry(mut self, enabled: bool) -> Self {
        self.auto_retry = enabled;
        self
    }

    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    pub fn build(self) -> Result<Client> {
        let api = GeocodeApi::new(&self.base_url, &self.api_key)?;
        if self.timeout.is_zero() {
            return Err(ApiError::Configuration("timeout must be non-zero".to_string()));
        }
        let transport = match self.transport {
            Some(transport) => transport,
            None => Box::new(UreqTransport::new(self.timeout)),
        };
        Ok(Client {
            api,
            transport,
            auto_retry: self.auto_retry,
            rate_limit: RwLock::new(RateLimitState::default()),
        })
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
