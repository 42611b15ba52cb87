//! Rate-limit bookkeeping from response headers.

use std::time::Duration;

use crate::http::HttpResponse;

pub const LIMIT_HEADER: &str = "X-RateLimit-Limit";
pub const REMAINING_HEADER: &str = "X-RateLimit-Remaining";
pub const RESET_HEADER: &str = "X-RateLimit-Reset";
pub const RETRY_AFTER_HEADER: &str = "Retry-After";

/// Advice assumed when a 429 carries no usable `Retry-After`.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Longest the client sleeps before a retry, whatever the server advised.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Rate-limit headers from the most recent response, kept verbatim.
///
/// Concurrent calls overwrite each other; the snapshot is not tied to any
/// particular in-flight request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitState {
    pub limit: Option<String>,
    pub remaining: Option<String>,
    pub reset: Option<String>,
}

impl RateLimitState {
    /// Read the three rate-limit headers. Absent headers become `None`.
    pub fn from_response(response: &HttpResponse) -> Self {
        let read = |name: &str| response.header(name).map(str::to_string);
        Self {
            limit: read(LIMIT_HEADER),
            remaining: read(REMAINING_HEADER),
            reset: read(RESET_HEADER),
        }
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit.as_deref().and_then(|v| v.parse().ok())
    }

    pub fn remaining(&self) -> Option<u64> {
        self.remaining.as_deref().and_then(|v| v.parse().ok())
    }

    /// Reset time as Unix seconds, when the header is numeric.
    pub fn reset_at(&self) -> Option<u64> {
        self.reset.as_deref().and_then(|v| v.parse().ok())
    }

    pub fn is_empty(&self) -> bool {
        self.limit.is_none() && self.remaining.is_none() && self.reset.is_none()
    }
}

/// Delay advised by a 429 response: `Retry-After` in seconds, or
/// `DEFAULT_RETRY_AFTER` when the header is missing or not a number.
pub fn retry_after(response: &HttpResponse) -> Duration {
    response
        .header(RETRY_AFTER_HEADER)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(DEFAULT_RETRY_AFTER, Duration::from_secs)
}

/// How long to sleep before resending: the advice, capped at `MAX_RETRY_DELAY`.
pub fn backoff_delay(response: &HttpResponse) -> Duration {
    retry_after(response).min(MAX_RETRY_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(headers: &[(&str, &str)]) -> HttpResponse {
        HttpResponse {
            status: 429,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: String::new(),
        }
    }

    #[test]
    fn reads_all_headers() {
        let state = RateLimitState::from_response(&response(&[
            ("x-ratelimit-limit", "1000"),
            ("X-RateLimit-Remaining", "999"),
            ("X-RATELIMIT-RESET", "1760000000"),
        ]));
        assert_eq!(state.limit.as_deref(), Some("1000"));
        assert_eq!(state.limit(), Some(1000));
        assert_eq!(state.remaining(), Some(999));
        assert_eq!(state.reset_at(), Some(1_760_000_000));
        assert!(!state.is_empty());
    }

    #[test]
    fn missing_headers_are_none() {
        let state = RateLimitState::from_response(&response(&[("X-RateLimit-Limit", "10")]));
        assert_eq!(state.limit(), Some(10));
        assert!(state.remaining.is_none());
        assert!(state.reset.is_none());
        assert!(RateLimitState::from_response(&response(&[])).is_empty());
    }

    #[test]
    fn non_numeric_values_kept_verbatim() {
        let state = RateLimitState::from_response(&response(&[(
            "X-RateLimit-Reset",
            "2026-10-18T00:00:00Z",
        )]));
        assert_eq!(state.reset.as_deref(), Some("2026-10-18T00:00:00Z"));
        assert_eq!(state.reset_at(), None);
    }

    #[test]
    fn values_are_not_trimmed() {
        let state = RateLimitState::from_response(&response(&[("X-RateLimit-Limit", " 10 ")]));
        assert_eq!(state.limit.as_deref(), Some(" 10 "));
        assert_eq!(state.limit(), None);
    }

    #[test]
    fn retry_after_uses_header() {
        assert_eq!(
            retry_after(&response(&[("Retry-After", "2")])),
            Duration::from_secs(2)
        );
        assert_eq!(retry_after(&response(&[("Retry-After", "0")])), Duration::ZERO);
    }

    #[test]
    fn retry_after_defaults_when_missing_or_garbled() {
        assert_eq!(retry_after(&response(&[])), DEFAULT_RETRY_AFTER);
        assert_eq!(
            retry_after(&response(&[("Retry-After", "soon")])),
            DEFAULT_RETRY_AFTER
        );
    }

    #[test]
    fn long_advice_is_reported_in_full_but_sleep_is_capped() {
        let resp = response(&[("Retry-After", "3600")]);
        assert_eq!(retry_after(&resp), Duration::from_secs(3600));
        assert_eq!(backoff_delay(&resp), MAX_RETRY_DELAY);
        assert_eq!(
            backoff_delay(&response(&[("Retry-After", "5")])),
            Duration::from_secs(5)
        );
    }
}
