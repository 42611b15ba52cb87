//! Stateless request builder and response parser for the geocoding API.
//!
//! # Design
//! `GeocodeApi` holds only the base URL and the API key. Each operation is
//! split into a `build_*` method that produces an `HttpRequest` and a
//! `parse_*` method that consumes an `HttpResponse`. No I/O happens here:
//! `Client` drives the round-trip, retries and rate-limit bookkeeping.
//! Local validation (batch size, coordinate range) happens in `build_*`, so a
//! rejected input never reaches the transport.

use url::form_urlencoded;
use url::Url;

use crate::error::{ApiError, ErrorDetails, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::ratelimit::retry_after;
use crate::types::{
    AddressBatchBody, BatchEnvelope, BatchResponse, BatchSummary, CoordinateBatchBody,
    ErrorEnvelope, GeocodeFilters, GeocodeQuery, GeocodeResponse, Location, ResponseEnvelope,
};

pub const DEFAULT_BASE_URL: &str = "https://api.csv2geo.com/v1";

/// Largest batch the API accepts in one request.
pub const MAX_BATCH_SIZE: usize = 10_000;

const USER_AGENT: &str = concat!("csv2geo-rust/", env!("CARGO_PKG_VERSION"));

/// Request builder and response parser bound to one base URL and API key.
#[derive(Clone)]
pub struct GeocodeApi {
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for GeocodeApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeocodeApi")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl GeocodeApi {
    /// Fails with `ApiError::Configuration` on an empty key or a base URL that
    /// is not an absolute http(s) URL.
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(ApiError::Configuration("API key is required".to_string()));
        }
        let parsed = Url::parse(base_url)
            .map_err(|e| ApiError::Configuration(format!("invalid base URL {base_url:?}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ApiError::Configuration(format!(
                "base URL must use http or https, got {:?}",
                parsed.scheme()
            )));
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // -----------------------------------------------------------------------
    // Build
    // -----------------------------------------------------------------------

    pub fn build_geocode(&self, address: &str, filters: &GeocodeFilters) -> HttpRequest {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("q", address);
        if let Some(country) = filters.country.as_deref().filter(|c| !c.is_empty()) {
            query.append_pair("country", country);
        }
        self.get("/geocode", &query.finish())
    }

    pub fn build_reverse(&self, location: Location) -> Result<HttpRequest> {
        validate_location(location)?;
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("lat", &location.lat.to_string())
            .append_pair("lng", &location.lng.to_string())
            .finish();
        Ok(self.get("/reverse", &query))
    }

    pub fn build_geocode_batch<S: AsRef<str>>(&self, addresses: &[S]) -> Result<HttpRequest> {
        validate_batch_size(addresses.len(), "addresses")?;
        let addresses: Vec<&str> = addresses.iter().map(AsRef::as_ref).collect();
        let body = serde_json::to_string(&AddressBatchBody {
            addresses: &addresses,
        })
        .map_err(|e| ApiError::Serialization(e.to_string()))?;
        Ok(self.post("/geocode", body))
    }

    pub fn build_reverse_batch(&self, coordinates: &[Location]) -> Result<HttpRequest> {
        validate_batch_size(coordinates.len(), "coordinates")?;
        for location in coordinates {
            validate_location(*location)?;
        }
        let body = serde_json::to_string(&CoordinateBatchBody { coordinates })
            .map_err(|e| ApiError::Serialization(e.to_string()))?;
        Ok(self.post("/reverse", body))
    }

    // -----------------------------------------------------------------------
    // Parse
    // -----------------------------------------------------------------------

    /// Parse a single-query response. `query` is attached to the result as-is.
    pub fn parse_response(
        &self,
        response: HttpResponse,
        query: GeocodeQuery,
    ) -> Result<GeocodeResponse> {
        check_status(&response)?;
        let envelope: ResponseEnvelope = decode(&response.body)?;
        Ok(GeocodeResponse {
            query,
            results: envelope.results,
        })
    }

    /// Parse a batch response, pairing each element with its input by position.
    ///
    /// A result count that differs from the input count fails the whole batch.
    pub fn parse_batch(
        &self,
        response: HttpResponse,
        queries: Vec<GeocodeQuery>,
    ) -> Result<BatchResponse> {
        check_status(&response)?;
        let envelope: BatchEnvelope = decode(&response.body)?;
        if envelope.results.len() != queries.len() {
            return Err(ApiError::Deserialization(format!(
                "batch returned {} results for {} inputs",
                envelope.results.len(),
                queries.len()
            )));
        }

        let count = queries.len();
        let meta = envelope.meta.unwrap_or_default();
        let summary = BatchSummary {
            total: meta.total.unwrap_or(count),
            successful: meta.successful.unwrap_or(count),
            failed: meta.failed.unwrap_or(0),
        };
        let results = queries
            .into_iter()
            .zip(envelope.results)
            .map(|(query, item)| GeocodeResponse {
                query,
                results: item.results,
            })
            .collect();
        Ok(BatchResponse { results, summary })
    }

    fn get(&self, path: &str, query: &str) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url: format!("{}{path}?{query}", self.base_url),
            headers: self.common_headers(),
            body: None,
        }
    }

    fn post(&self, path: &str, body: String) -> HttpRequest {
        let mut headers = self.common_headers();
        headers.push(("content-type".to_string(), "application/json".to_string()));
        HttpRequest {
            method: HttpMethod::Post,
            url: format!("{}{path}", self.base_url),
            headers,
            body: Some(body),
        }
    }

    fn common_headers(&self) -> Vec<(String, String)> {
        vec![
            ("authorization".to_string(), format!("Bearer {}", self.api_key)),
            ("accept".to_string(), "application/json".to_string()),
            ("user-agent".to_string(), USER_AGENT.to_string()),
        ]
    }
}

fn validate_batch_size(len: usize, what: &str) -> Result<()> {
    if len > MAX_BATCH_SIZE {
        return Err(ApiError::Validation(format!(
            "maximum {MAX_BATCH_SIZE} {what} per batch request, got {len}"
        )));
    }
    Ok(())
}

fn validate_location(location: Location) -> Result<()> {
    let Location { lat, lng } = location;
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(ApiError::Validation(format!("latitude out of range: {lat}")));
    }
    if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
        return Err(ApiError::Validation(format!("longitude out of range: {lng}")));
    }
    Ok(())
}

fn decode<T: serde::de::DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| ApiError::Deserialization(e.to_string()))
}

/// Map a non-2xx status to the matching `ApiError` variant.
fn check_status(response: &HttpResponse) -> Result<()> {
    if response.is_success() {
        return Ok(());
    }
    let details = error_details(response);
    Err(match response.status {
        400 => ApiError::InvalidRequest(details),
        401 => ApiError::Authentication(details),
        403 => ApiError::Permission(details),
        429 => ApiError::RateLimited {
            details,
            retry_after: retry_after(response),
        },
        _ => ApiError::Api(details),
    })
}

/// Prefer the structured envelope, then the raw body, then the status line.
fn error_details(response: &HttpResponse) -> ErrorDetails {
    if let Ok(ErrorEnvelope { error }) = serde_json::from_str::<ErrorEnvelope>(&response.body) {
        return ErrorDetails {
            message: error
                .message
                .unwrap_or_else(|| status_message(response.status)),
            code: error.code,
            status: error.status.unwrap_or(response.status),
        };
    }
    let body = response.body.trim();
    ErrorDetails {
        message: if body.is_empty() {
            status_message(response.status)
        } else {
            body.to_string()
        },
        code: None,
        status: response.status,
    }
}

fn status_message(status: u16) -> String {
    match ureq::http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
    {
        Some(reason) => format!("HTTP {status} {reason}"),
        None => format!("HTTP {status}"),
    }
}
