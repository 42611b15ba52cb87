//! In-process stand-in for the csv2geo geocoding API.
//!
//! Serves `/v1/geocode` and `/v1/reverse` (GET single, POST batch) from a
//! small fixed gazetteer. Behaviour the client must handle is switchable at
//! runtime through `MockState`: forced 429s, artificial latency, and the
//! accepted API key. Every response carries `X-RateLimit-*` headers.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::debug;

/// Key that may read but not run batch jobs.
pub const READONLY_KEY: &str = "readonly";

pub const MAX_BATCH_SIZE: usize = 10_000;

/// Fixed `X-RateLimit-Reset` value (Unix seconds).
pub const RATE_LIMIT_RESET: u64 = 1_760_000_000;

#[derive(Clone, Debug)]
pub struct MockConfig {
    pub api_key: String,
    /// Reported as `X-RateLimit-Limit`; `Remaining` counts down from it.
    pub rate_limit: u64,
    /// `Retry-After` seconds on forced 429s. `None` omits the header.
    pub retry_after: Option<u64>,
    /// Added before every response.
    pub delay: Duration,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            api_key: "test-key".to_string(),
            rate_limit: 1000,
            retry_after: Some(1),
            delay: Duration::ZERO,
        }
    }
}

#[derive(Debug)]
pub struct MockState {
    config: MockConfig,
    throttle: AtomicUsize,
    hits: AtomicUsize,
}

pub type SharedState = Arc<MockState>;

impl MockState {
    pub fn new(config: MockConfig) -> SharedState {
        Arc::new(Self {
            config,
            throttle: AtomicUsize::new(0),
            hits: AtomicUsize::new(0),
        })
    }

    /// Answer the next `n` requests with 429.
    pub fn throttle_next(&self, n: usize) {
        self.throttle.store(n, Ordering::SeqCst);
    }

    /// Requests received so far, including rejected ones.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    fn take_throttle(&self) -> bool {
        self.throttle
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Components {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub house_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Candidate {
    pub formatted_address: String,
    pub location: Location,
    pub accuracy: String,
    pub accuracy_score: f64,
    pub components: Components,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub query: String,
    pub results: Vec<Candidate>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchMeta {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchEnvelope {
    pub results: Vec<Envelope>,
    pub meta: BatchMeta,
}

#[derive(Deserialize)]
pub struct GeocodeParams {
    pub q: Option<String>,
    pub country: Option<String>,
}

#[derive(Deserialize)]
pub struct ReverseParams {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Deserialize)]
pub struct AddressBatch {
    pub addresses: Vec<String>,
}

#[derive(Deserialize)]
pub struct CoordinateBatch {
    pub coordinates: Vec<Location>,
}

// ---------------------------------------------------------------------------
// Gazetteer
// ---------------------------------------------------------------------------

struct Place {
    keys: &'static [&'static str],
    country_code: &'static str,
    house_number: &'static str,
    street: &'static str,
    unit: &'static str,
    city: &'static str,
    state: &'static str,
    postcode: &'static str,
    formatted: &'static str,
    lat: f64,
    lng: f64,
}

const PLACES: &[Place] = &[
    Place {
        keys: &["1600 pennsylvania", "white house"],
        country_code: "US",
        house_number: "1600",
        street: "Pennsylvania Avenue NW",
        unit: "",
        city: "Washington",
        state: "DC",
        postcode: "20500",
        formatted: "1600 Pennsylvania Avenue NW, Washington, DC 20500",
        lat: 38.8977,
        lng: -77.0365,
    },
    Place {
        keys: &["350 fifth", "350 5th", "empire state"],
        country_code: "US",
        house_number: "350",
        street: "5th Avenue",
        unit: "Suite 8600",
        city: "New York",
        state: "NY",
        postcode: "10118",
        formatted: "350 5th Avenue, New York, NY 10118",
        lat: 40.7484,
        lng: -73.9857,
    },
    Place {
        keys: &["golden gate"],
        country_code: "US",
        house_number: "",
        street: "Golden Gate Bridge",
        unit: "",
        city: "San Francisco",
        state: "CA",
        postcode: "94129",
        formatted: "Golden Gate Bridge, San Francisco, CA 94129",
        lat: 37.8199,
        lng: -122.4783,
    },
];

/// Roughly one kilometre in degrees.
const REVERSE_RADIUS_DEG: f64 = 0.01;

impl Place {
    fn candidate(&self, accuracy: &str, score: f64) -> Candidate {
        let some = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Candidate {
            formatted_address: self.formatted.to_string(),
            location: Location {
                lat: self.lat,
                lng: self.lng,
            },
            accuracy: accuracy.to_string(),
            accuracy_score: score,
            components: Components {
                house_number: some(self.house_number),
                street: some(self.street),
                unit: some(self.unit),
                city: some(self.city),
                state: some(self.state),
                postcode: some(self.postcode),
                country: some(self.country_code),
            },
        }
    }
}

pub fn forward(query: &str, country: Option<&str>) -> Envelope {
    let needle = query.to_lowercase();
    let results = PLACES
        .iter()
        .filter(|p| p.keys.iter().any(|k| needle.contains(k)))
        .filter(|p| country.map_or(true, |c| c.is_empty() || c.eq_ignore_ascii_case(p.country_code)))
        .map(|p| p.candidate("rooftop", 1.0))
        .collect();
    Envelope {
        query: query.to_string(),
        results,
    }
}

pub fn reverse(location: Location) -> Envelope {
    let mut nearby: Vec<(f64, &Place)> = PLACES
        .iter()
        .map(|p| ((p.lat - location.lat).hypot(p.lng - location.lng), p))
        .filter(|(d, _)| *d <= REVERSE_RADIUS_DEG)
        .collect();
    nearby.sort_by(|a, b| a.0.total_cmp(&b.0));
    let results = nearby
        .into_iter()
        .map(|(d, p)| {
            let score = 1.0 - d / REVERSE_RADIUS_DEG;
            p.candidate(if d == 0.0 { "rooftop" } else { "interpolated" }, score)
        })
        .collect();
    Envelope {
        query: format!("{},{}", location.lat, location.lng),
        results,
    }
}

fn batch(results: Vec<Envelope>) -> BatchEnvelope {
    let successful = results.iter().filter(|e| !e.results.is_empty()).count();
    BatchEnvelope {
        meta: BatchMeta {
            total: results.len(),
            successful,
            failed: results.len() - successful,
        },
        results,
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn app() -> Router {
    app_with_state(MockState::new(MockConfig::default()))
}

pub fn app_with_state(state: SharedState) -> Router {
    let v1 = Router::new()
        .route("/geocode", get(geocode).post(geocode_batch))
        .route("/reverse", get(reverse_one).post(reverse_batch))
        .with_state(state);
    Router::new().nest("/v1", v1)
}

pub async fn run_with_state(listener: TcpListener, state: SharedState) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(state)).await
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Batch,
}

async fn geocode(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<GeocodeParams>,
) -> Response {
    if let Err(rejection) = admit(&state, &headers, Access::Read).await {
        return rejection;
    }
    let q = params.q.unwrap_or_default();
    if q.trim().is_empty() {
        return error(&state, StatusCode::BAD_REQUEST, "missing_query", "Query parameter 'q' is required");
    }
    if q == "500" {
        return finish(&state, (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response());
    }
    debug!(q = %q, "geocode");
    finish(&state, Json(forward(&q, params.country.as_deref())).into_response())
}

async fn reverse_one(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<ReverseParams>,
) -> Response {
    if let Err(rejection) = admit(&state, &headers, Access::Read).await {
        return rejection;
    }
    debug!(lat = params.lat, lng = params.lng, "reverse");
    let location = Location {
        lat: params.lat,
        lng: params.lng,
    };
    finish(&state, Json(reverse(location)).into_response())
}

async fn geocode_batch(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(input): Json<AddressBatch>,
) -> Response {
    if let Err(rejection) = admit(&state, &headers, Access::Batch).await {
        return rejection;
    }
    if input.addresses.len() > MAX_BATCH_SIZE {
        return error(&state, StatusCode::BAD_REQUEST, "batch_too_large", "Maximum 10,000 addresses per batch request");
    }
    let results = input.addresses.iter().map(|a| forward(a, None)).collect();
    finish(&state, Json(batch(results)).into_response())
}

async fn reverse_batch(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(input): Json<CoordinateBatch>,
) -> Response {
    if let Err(rejection) = admit(&state, &headers, Access::Batch).await {
        return rejection;
    }
    if input.coordinates.len() > MAX_BATCH_SIZE {
        return error(&state, StatusCode::BAD_REQUEST, "batch_too_large", "Maximum 10,000 coordinates per batch request");
    }
    let results = input.coordinates.into_iter().map(reverse).collect();
    finish(&state, Json(batch(results)).into_response())
}

/// Count the hit, apply latency, then check throttling and credentials.
async fn admit(state: &MockState, headers: &HeaderMap, access: Access) -> Result<(), Response> {
    state.hits.fetch_add(1, Ordering::SeqCst);
    if !state.config.delay.is_zero() {
        tokio::time::sleep(state.config.delay).await;
    }

    if state.take_throttle() {
        let mut response = error(state, StatusCode::TOO_MANY_REQUESTS, "rate_limited", "Too many requests");
        if let Some(secs) = state.config.retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        return Err(response);
    }

    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match token {
        Some(key) if key == state.config.api_key => Ok(()),
        Some(READONLY_KEY) if access == Access::Read => Ok(()),
        Some(READONLY_KEY) => Err(error(
            state,
            StatusCode::FORBIDDEN,
            "insufficient_permissions",
            "API key does not have batch permission",
        )),
        _ => Err(error(state, StatusCode::UNAUTHORIZED, "invalid_api_key", "Invalid API key")),
    }
}

fn error(state: &MockState, status: StatusCode, code: &str, message: &str) -> Response {
    let body = json!({
        "error": { "code": code, "message": message, "status": status.as_u16() }
    });
    finish(state, (status, Json(body)).into_response())
}

fn finish(state: &MockState, mut response: Response) -> Response {
    let remaining = state
        .config
        .rate_limit
        .saturating_sub(state.hits() as u64);
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(state.config.rate_limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(RATE_LIMIT_RESET));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_matches_case_insensitively() {
        let envelope = forward("1600 PENNSYLVANIA Ave, Washington DC", None);
        assert_eq!(envelope.results.len(), 1);
        let best = &envelope.results[0];
        assert_eq!(best.formatted_address, "1600 Pennsylvania Avenue NW, Washington, DC 20500");
        assert_eq!(best.components.city.as_deref(), Some("Washington"));
    }

    #[test]
    fn unit_only_where_known() {
        let empire = &forward("350 Fifth Avenue", None).results[0];
        assert_eq!(empire.components.unit.as_deref(), Some("Suite 8600"));
        assert!(forward("golden gate", None).results[0].components.unit.is_none());
    }

    #[test]
    fn forward_country_filter_excludes() {
        assert!(forward("Empire State Building", Some("DE")).results.is_empty());
        assert_eq!(forward("Empire State Building", Some("us")).results.len(), 1);
    }

    #[test]
    fn forward_unknown_is_empty() {
        let envelope = forward("nowhere at all", None);
        assert_eq!(envelope.query, "nowhere at all");
        assert!(envelope.results.is_empty());
    }

    #[test]
    fn reverse_exact_is_rooftop() {
        let envelope = reverse(Location {
            lat: 38.8977,
            lng: -77.0365,
        });
        assert_eq!(envelope.results[0].accuracy, "rooftop");
        assert_eq!(envelope.results[0].location.lat, 38.8977);
    }

    #[test]
    fn reverse_far_away_is_empty() {
        assert!(reverse(Location { lat: 0.0, lng: 0.0 }).results.is_empty());
    }

    #[test]
    fn batch_meta_counts() {
        let envelope = batch(vec![forward("golden gate", None), forward("nope", None)]);
        assert_eq!(envelope.meta.total, 2);
        assert_eq!(envelope.meta.successful, 1);
        assert_eq!(envelope.meta.failed, 1);
    }

    #[test]
    fn candidate_omits_empty_components() {
        let json = serde_json::to_value(&forward("golden gate", None).results[0]).unwrap();
        assert!(json["components"].get("house_number").is_none());
        assert_eq!(json["components"]["city"], "San Francisco");
    }

    #[test]
    fn throttle_counts_down() {
        let state = MockState::new(MockConfig::default());
        state.throttle_next(2);
        assert!(state.take_throttle());
        assert!(state.take_throttle());
        assert!(!state.take_throttle());
    }
}
