//! Domain types for the geocoding API.
//!
//! # Design
//! Result records mirror the JSON envelope closely but are lenient: the API
//! omits fields it has no value for, or sends them as `null`, so every field
//! falls back to a default instead of failing the whole response. `GeocodeResponse` carries the
//! caller's own query rather than the server's echo of it, so batch elements
//! can be matched to their inputs without string comparison.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Geographic coordinates in decimal degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl From<(f64, f64)> for Location {
    fn from((lat, lng): (f64, f64)) -> Self {
        Self { lat, lng }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.lat, self.lng)
    }
}

/// Parsed address parts. Any of them may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressComponents {
    pub house_number: Option<String>,
    pub street: Option<String>,
    pub unit: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub country: Option<String>,
}

/// Match precision tier reported by the API.
///
/// Labels the SDK does not know are kept verbatim in `Other`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Accuracy {
    Rooftop,
    Interpolated,
    Street,
    Postcode,
    Locality,
    Region,
    Country,
    Other(String),
    /// The server sent no label.
    #[default]
    Unknown,
}

impl Accuracy {
    pub fn as_str(&self) -> &str {
        match self {
            Accuracy::Rooftop => "rooftop",
            Accuracy::Interpolated => "interpolated",
            Accuracy::Street => "street",
            Accuracy::Postcode => "postcode",
            Accuracy::Locality => "locality",
            Accuracy::Region => "region",
            Accuracy::Country => "country",
            Accuracy::Other(label) => label.as_str(),
            Accuracy::Unknown => "",
        }
    }
}

impl From<String> for Accuracy {
    fn from(label: String) -> Self {
        match label.as_str() {
            "rooftop" => Accuracy::Rooftop,
            "interpolated" => Accuracy::Interpolated,
            "street" => Accuracy::Street,
            "postcode" => Accuracy::Postcode,
            "locality" => Accuracy::Locality,
            "region" => Accuracy::Region,
            "country" => Accuracy::Country,
            "" => Accuracy::Unknown,
            _ => Accuracy::Other(label),
        }
    }
}

impl From<Accuracy> for String {
    fn from(accuracy: Accuracy) -> Self {
        accuracy.as_str().to_string()
    }
}

impl fmt::Display for Accuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One candidate match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocodeResult {
    #[serde(deserialize_with = "null_as_default")]
    pub formatted_address: String,
    #[serde(deserialize_with = "null_as_default")]
    pub location: Location,
    #[serde(deserialize_with = "null_as_default")]
    pub accuracy: Accuracy,
    /// Confidence in `[0, 1]`.
    #[serde(deserialize_with = "null_as_default")]
    pub accuracy_score: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub components: AddressComponents,
}

impl GeocodeResult {
    pub fn lat(&self) -> f64 {
        self.location.lat
    }

    pub fn lng(&self) -> f64 {
        self.location.lng
    }
}

/// Optional filters for forward geocoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeocodeFilters {
    /// ISO 3166-1 alpha-2 country code.
    pub country: Option<String>,
}

impl GeocodeFilters {
    pub fn country(code: impl Into<String>) -> Self {
        Self {
            country: Some(code.into()),
        }
    }
}

/// What the caller asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum GeocodeQuery {
    Address {
        address: String,
        filters: GeocodeFilters,
    },
    Coordinates(Location),
}

impl fmt::Display for GeocodeQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeocodeQuery::Address { address, .. } => f.write_str(address),
            GeocodeQuery::Coordinates(location) => fmt::Display::fmt(location, f),
        }
    }
}

/// All candidates for one query, best first as ranked by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeResponse {
    pub query: GeocodeQuery,
    pub results: Vec<GeocodeResult>,
}

impl GeocodeResponse {
    /// The top-ranked candidate, or `None` when nothing matched.
    pub fn best(&self) -> Option<&GeocodeResult> {
        self.results.first()
    }

    pub fn into_best(self) -> Option<GeocodeResult> {
        self.results.into_iter().next()
    }
}

/// Counters from the `meta` block of a batch response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

/// One `GeocodeResponse` per batch input, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResponse {
    pub results: Vec<GeocodeResponse>,
    pub summary: BatchSummary,
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseEnvelope {
    #[serde(default, deserialize_with = "null_as_default")]
    pub(crate) results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BatchEnvelope {
    #[serde(default, deserialize_with = "null_as_default")]
    pub(crate) results: Vec<ResponseEnvelope>,
    pub(crate) meta: Option<BatchMeta>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct BatchMeta {
    pub(crate) total: Option<usize>,
    pub(crate) successful: Option<usize>,
    pub(crate) failed: Option<usize>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AddressBatchBody<'a> {
    pub(crate) addresses: &'a [&'a str],
}

#[derive(Debug, Serialize)]
pub(crate) struct CoordinateBatchBody<'a> {
    pub(crate) coordinates: &'a [Location],
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub(crate) error: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ErrorBody {
    pub(crate) code: Option<String>,
    pub(crate) message: Option<String>,
    pub(crate) status: Option<u16>,
}

/// Treat an explicit `null` like a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}
