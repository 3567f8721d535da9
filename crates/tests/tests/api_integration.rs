use std::env;
use std::sync::Once;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use wayfinder_api::build_app;

static ENV_SETUP: Once = Once::new();

/// Pins the provider chain to unroutable local endpoints so every upstream
/// call fails fast. The suite exercises the degraded paths: the router must
/// stay up and answer structured JSON with no upstream available at all.
fn offline_env() {
    ENV_SETUP.call_once(|| {
        env::remove_var("HF_TOKEN");
        env::remove_var("GROQ_API_KEY");
        env::remove_var("OPENAI_API_KEY");
        env::remove_var("SERPAPI_API_KEY");
        env::set_var("WAYFINDER_LLM_BASE_URL", "http://127.0.0.1:9/v1");
        env::set_var("WAYFINDER_SEARCH_URL", "http://127.0.0.1:9/search.json");
        env::set_var("WAYFINDER_COUNTRIES_URL", "http://127.0.0.1:9/v3.1");
        env::set_var("WAYFINDER_AIRPORTS_URL", "http://127.0.0.1:9/airports.csv");
    });
}

async fn app() -> Router {
    offline_env();
    build_app().await.expect("app should build")
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_capabilities() {
    let app = app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let parsed = body_json(response).await;
    assert_eq!(parsed["status"], "ok");
    assert_eq!(parsed["capabilities"]["llm_provider"], "custom");
    assert_eq!(parsed["capabilities"]["serpapi_configured"], false);
    assert_eq!(parsed["capabilities"]["airports_loaded"], 0);
    assert!(parsed["metrics"].is_object());
}

#[tokio::test]
async fn chat_mints_a_session_and_degrades_to_apology() {
    let app = app().await;

    let response = app
        .oneshot(post_json("/api/chat", json!({ "user_message": "hi there" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let parsed = body_json(response).await;
    assert_eq!(
        parsed["reply"],
        "Sorry, I didn't understand that. Please try again."
    );
    assert_eq!(parsed["done"], false);
    assert!(parsed["variables"].is_object());

    let session_id = parsed["session_id"].as_str().unwrap();
    uuid::Uuid::parse_str(session_id).expect("minted session id should be a uuid");
}

#[tokio::test]
async fn chat_keeps_a_caller_supplied_session_id() {
    let app = app().await;

    let response = app
        .oneshot(post_json(
            "/api/chat",
            json!({ "user_message": "hi", "session_id": "my-session" }),
        ))
        .await
        .unwrap();

    let parsed = body_json(response).await;
    assert_eq!(parsed["session_id"], "my-session");
}

#[tokio::test]
async fn chat_preparses_relative_dates_without_the_model() {
    let app = app().await;

    // The model call fails, but the deterministic date pre-parse still runs
    // and survives into the session variables.
    let response = app
        .oneshot(post_json(
            "/api/chat",
            json!({ "user_message": "leaving tomorrow", "session_id": "date-session" }),
        ))
        .await
        .unwrap();

    let parsed = body_json(response).await;
    let start_date = parsed["variables"]["start_date"].as_str().unwrap();
    assert_eq!(start_date.len(), 10);
    assert!(start_date.chars().take(4).all(|c| c.is_ascii_digit()));
}

#[tokio::test]
async fn reset_acknowledges() {
    let app = app().await;

    let response = app
        .oneshot(post_json("/api/reset", json!({ "session_id": "my-session" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let parsed = body_json(response).await;
    assert_eq!(parsed["message"], "Conversation has been reset.");
}

#[tokio::test]
async fn airports_lookup_reports_a_structured_error() {
    let app = app().await;

    let response = app
        .oneshot(post_json("/api/airports", json!({ "search": "Tokyo" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let parsed = body_json(response).await;
    let error = parsed["error"].as_str().unwrap();
    assert!(error.contains("Could not find coordinates"), "got: {error}");
}

#[tokio::test]
async fn flight_search_resolves_endpoints_before_querying() {
    let app = app().await;

    // Place names are accepted: the handler walks geocoding and the
    // nearest-airport fallback, so with no upstream reachable the failure is
    // the resolution error, not a raw provider error.
    let response = app
        .oneshot(post_json(
            "/api/flight",
            json!({
                "departure_id": "Dallas",
                "arrival_id": "Tokyo",
                "outbound_date": "2025-06-01",
                "return_date": "2025-06-08"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let parsed = body_json(response).await;
    assert_eq!(parsed["error"], "Could not resolve airports.");
}

#[tokio::test]
async fn generate_itinerary_degrades_to_an_error_object() {
    let app = app().await;

    let response = app
        .oneshot(post_json(
            "/api/generate_itinerary",
            json!({
                "destination": "Tokyo",
                "start_date": "2025-06-01",
                "num_days": "5",
                "budget": "$2000",
                "departure_city": "Dallas",
                "trip_type": "leisure"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let parsed = body_json(response).await;
    assert!(parsed["itinerary"]["error"].is_string());
}

#[tokio::test]
async fn unknown_routes_are_not_found() {
    let app = app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/unknown")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
