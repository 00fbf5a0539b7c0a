mod support;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    response::Response,
};
use common::clock::ManualClock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use support::{lookup, paris_payload};
use tower::ServiceExt;
use weather_service::handlers::AppState;
use weather_service::rate_limit::RateLimiter;
use weather_service::router;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, query_param},
};

fn app(server: &MockServer, clock: Arc<ManualClock>, max_requests: u32) -> Router {
    let state = AppState {
        lookup: Arc::new(lookup(format!("{}/weather", server.uri()), clock.clone())),
        started_at: Instant::now(),
    };
    let limiter = Arc::new(RateLimiter::new(
        Duration::from_secs(60),
        max_requests,
        clock,
    ));
    router(state, limiter, "*")
}

async fn get(app: &Router, uri: &str) -> Response {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn json_body(response: Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn header_str<'a>(response: &'a Response, name: &str) -> &'a str {
    response.headers()[name].to_str().unwrap()
}

#[tokio::test]
async fn cold_start_then_warm_local_hit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("q", "Paris"))
        .respond_with(ResponseTemplate::new(200).set_body_json(paris_payload()))
        .expect(1)
        .mount(&server)
        .await;

    let app = app(&server, Arc::new(ManualClock::new()), 100);

    let cold = get(&app, "/api/weather?city=Paris").await;
    assert_eq!(cold.status(), StatusCode::OK);
    assert_eq!(header_str(&cold, "x-cache-status"), "MISS");
    assert_eq!(header_str(&cold, "x-cache-tier"), "NONE");
    assert_eq!(header_str(&cold, "x-upstream-attempts"), "1");
    assert_eq!(header_str(&cold, "retry-count"), "0");
    let body = json_body(cold).await;
    assert_eq!(body["city"], "Paris");
    assert_eq!(body["temp_c"], 21.5);

    let warm = get(&app, "/api/weather?city=paris").await;
    assert_eq!(warm.status(), StatusCode::OK);
    assert_eq!(header_str(&warm, "x-cache-status"), "HIT");
    assert_eq!(header_str(&warm, "x-cache-tier"), "LOCAL");
    assert_eq!(header_str(&warm, "x-upstream-attempts"), "0");
}

#[tokio::test]
async fn rejects_invalid_city_before_lookup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(paris_payload()))
        .expect(0)
        .mount(&server)
        .await;

    let app = app(&server, Arc::new(ManualClock::new()), 100);

    let missing = get(&app, "/api/weather").await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(missing).await["error"],
        "Missing required query parameter: city"
    );

    let invalid = get(&app, "/api/weather?city=Paris%3B%20DROP").await;
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

    let long = format!("/api/weather?city={}", "a".repeat(81));
    assert_eq!(get(&app, &long).await.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_query_string_gets_json_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(paris_payload()))
        .expect(0)
        .mount(&server)
        .await;

    let app = app(&server, Arc::new(ManualClock::new()), 100);

    let repeated = get(&app, "/api/weather?city=Paris&city=Lyon").await;
    assert_eq!(repeated.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        header_str(&repeated, header::CONTENT_TYPE.as_str()),
        "application/json"
    );
    let error = json_body(repeated).await["error"].as_str().unwrap().to_string();
    assert!(error.starts_with("Invalid query string"), "{error}");
}

#[tokio::test]
async fn upstream_not_found_maps_to_404() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let app = app(&server, Arc::new(ManualClock::new()), 100);
    let response = get(&app, "/api/weather?city=Atlantis").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(header_str(&response, "x-upstream-attempts"), "1");
    assert_eq!(
        json_body(response).await["error"],
        "City not found at upstream provider."
    );
}

#[tokio::test]
async fn open_circuit_bypasses_with_503_and_meta() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(5)
        .mount(&server)
        .await;

    let app = app(&server, Arc::new(ManualClock::new()), 100);
    for _ in 0..5 {
        let response = get(&app, "/api/weather?city=Atlantis").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    let response = get(&app, "/api/weather?city=Atlantis").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(header_str(&response, "x-cache-status"), "BYPASS");
    assert_eq!(header_str(&response, "x-upstream-attempts"), "0");
    assert_eq!(header_str(&response, header::RETRY_AFTER.as_str()), "30");

    let body = json_body(response).await;
    assert_eq!(body["meta"]["circuit_open_for_ms"], 30_000);
}

#[tokio::test]
async fn rate_limit_rejects_excess_requests() {
    let server = MockServer::start().await;
    let app = app(&server, Arc::new(ManualClock::new()), 2);

    let first = get(&app, "/health").await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(header_str(&first, "ratelimit-limit"), "2");
    assert_eq!(header_str(&first, "ratelimit-remaining"), "1");

    assert_eq!(get(&app, "/health").await.status(), StatusCode::OK);

    let limited = get(&app, "/health").await;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header_str(&limited, header::RETRY_AFTER.as_str()), "60");
    assert_eq!(header_str(&limited, "ratelimit-limit"), "2");
    assert_eq!(header_str(&limited, "ratelimit-remaining"), "0");
    assert_eq!(header_str(&limited, "ratelimit-reset"), "60");
    assert_eq!(
        json_body(limited).await["error"],
        "Too many requests. Please try again later."
    );
}

#[tokio::test]
async fn health_and_unknown_routes() {
    let server = MockServer::start().await;
    let app = app(&server, Arc::new(ManualClock::new()), 100);

    let health = get(&app, "/health").await;
    assert_eq!(health.status(), StatusCode::OK);
    let body = json_body(health).await;
    assert_eq!(body["status"], "ok");
    assert!(body["uptime"].is_number());

    let missing = get(&app, "/nope").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(missing).await["error"], "Not Found");

    let root = get(&app, "/").await;
    assert_eq!(root.status(), StatusCode::OK);
}
