use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{
    app, app_with_state, BatchEnvelope, Envelope, MockConfig, MockState, READONLY_KEY,
};
use tower::ServiceExt;

const AUTH: &str = "Bearer test-key";

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn get_request(uri: &str, auth: &str) -> Request<String> {
    Request::builder()
        .uri(uri)
        .header(http::header::AUTHORIZATION, auth)
        .body(String::new())
        .unwrap()
}

fn json_request(uri: &str, auth: &str, body: &str) -> Request<String> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(http::header::AUTHORIZATION, auth)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .unwrap()
}

// --- forward ---

#[tokio::test]
async fn geocode_known_address() {
    let resp = app()
        .oneshot(get_request("/v1/geocode?q=1600+Pennsylvania+Ave%2C+Washington+DC", AUTH))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-ratelimit-limit"], "1000");
    assert_eq!(resp.headers()["x-ratelimit-remaining"], "999");
    let envelope: Envelope = body_json(resp).await;
    assert_eq!(envelope.query, "1600 Pennsylvania Ave, Washington DC");
    assert_eq!(envelope.results.len(), 1);
    assert_eq!(envelope.results[0].location.lat, 38.8977);
}

#[tokio::test]
async fn geocode_unknown_address_is_empty() {
    let resp = app()
        .oneshot(get_request("/v1/geocode?q=Nowhere", AUTH))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let envelope: Envelope = body_json(resp).await;
    assert!(envelope.results.is_empty());
}

#[tokio::test]
async fn geocode_missing_query_returns_400_envelope() {
    let resp = app()
        .oneshot(get_request("/v1/geocode", AUTH))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = body_json(resp).await;
    assert_eq!(body["error"]["code"], "missing_query");
    assert_eq!(body["error"]["status"], 400);
}

#[tokio::test]
async fn geocode_server_error_is_plain_text() {
    let resp = app()
        .oneshot(get_request("/v1/geocode?q=500", AUTH))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_bytes(resp).await, "internal error");
}

// --- auth ---

#[tokio::test]
async fn missing_token_returns_401() {
    let resp = app()
        .oneshot(Request::builder().uri("/v1/geocode?q=x").body(String::new()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = body_json(resp).await;
    assert_eq!(body["error"]["code"], "invalid_api_key");
}

#[tokio::test]
async fn readonly_key_cannot_batch() {
    let auth = format!("Bearer {READONLY_KEY}");
    let resp = app()
        .oneshot(get_request("/v1/geocode?q=golden+gate", &auth))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app()
        .oneshot(json_request("/v1/geocode", &auth, r#"{"addresses":["golden gate"]}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

// --- reverse ---

#[tokio::test]
async fn reverse_known_point() {
    let resp = app()
        .oneshot(get_request("/v1/reverse?lat=38.8977&lng=-77.0365", AUTH))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let envelope: Envelope = body_json(resp).await;
    assert_eq!(
        envelope.results[0].formatted_address,
        "1600 Pennsylvania Avenue NW, Washington, DC 20500"
    );
}

#[tokio::test]
async fn reverse_bad_coordinates_returns_400() {
    let resp = app()
        .oneshot(get_request("/v1/reverse?lat=abc&lng=1", AUTH))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// --- batch ---

#[tokio::test]
async fn geocode_batch_preserves_order() {
    let resp = app()
        .oneshot(json_request(
            "/v1/geocode",
            AUTH,
            r#"{"addresses":["golden gate","nowhere","350 Fifth Avenue, New York"]}"#,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let batch: BatchEnvelope = body_json(resp).await;
    let queries: Vec<&str> = batch.results.iter().map(|e| e.query.as_str()).collect();
    assert_eq!(queries, ["golden gate", "nowhere", "350 Fifth Avenue, New York"]);
    assert_eq!(batch.meta.total, 3);
    assert_eq!(batch.meta.successful, 2);
    assert_eq!(batch.meta.failed, 1);
}

#[tokio::test]
async fn reverse_batch_preserves_order() {
    let resp = app()
        .oneshot(json_request(
            "/v1/reverse",
            AUTH,
            r#"{"coordinates":[{"lat":40.7484,"lng":-73.9857},{"lat":38.8977,"lng":-77.0365}]}"#,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let batch: BatchEnvelope = body_json(resp).await;
    assert_eq!(batch.results.len(), 2);
    assert_eq!(batch.results[0].results[0].components.city.as_deref(), Some("New York"));
    assert_eq!(batch.results[1].results[0].components.city.as_deref(), Some("Washington"));
}

#[tokio::test]
async fn batch_malformed_json_returns_422() {
    let resp = app()
        .oneshot(json_request("/v1/geocode", AUTH, r#"{"not_addresses":1}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

// --- throttling ---

#[tokio::test]
async fn throttled_requests_get_429_then_recover() {
    let state = MockState::new(MockConfig {
        retry_after: Some(2),
        ..MockConfig::default()
    });
    state.throttle_next(1);

    let resp = app_with_state(state.clone())
        .oneshot(get_request("/v1/geocode?q=golden+gate", AUTH))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(resp.headers()["retry-after"], "2");
    let body: serde_json::Value = body_json(resp).await;
    assert_eq!(body["error"]["code"], "rate_limited");

    let resp = app_with_state(state.clone())
        .oneshot(get_request("/v1/geocode?q=golden+gate", AUTH))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-ratelimit-remaining"], "998");
    assert_eq!(state.hits(), 2);
}

#[tokio::test]
async fn throttle_without_retry_after_omits_header() {
    let state = MockState::new(MockConfig {
        retry_after: None,
        ..MockConfig::default()
    });
    state.throttle_next(1);

    let resp = app_with_state(state)
        .oneshot(get_request("/v1/reverse?lat=0&lng=0", AUTH))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(resp.headers().get("retry-after").is_none());
}
