mod rate_limit;

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{Json, State};
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{body::Body, Router};
use chrono::Local;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;
use wayfinder_agents::{DialogueManager, ItineraryAssembler};
use wayfinder_core::dates::{coerce_num_days, coerce_start_date};
use wayfinder_core::TripDetails;
use wayfinder_lookup::airports::DEFAULT_AIRPORTS_URL;
use wayfinder_lookup::{
    resolve_chat_model, resolve_place, search_flights, AirportDirectory, ChatModel, RestCountries,
    SerpApiClient,
};
use wayfinder_observability::AppMetrics;

use crate::rate_limit::IpRateLimiter;

const REQUEST_BODY_LIMIT_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct ApiState {
    pub dialogue: Arc<DialogueManager>,
    pub assembler: Arc<ItineraryAssembler<SerpApiClient, RestCountries>>,
    pub search: SerpApiClient,
    pub countries: RestCountries,
    pub directory: Arc<AirportDirectory>,
    pub metrics: Arc<AppMetrics>,
    pub llm_provider: String,
    pub limiter: IpRateLimiter,
    pub allowed_origins: Arc<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp_utc: String,
    metrics: wayfinder_observability::MetricsSnapshot,
    capabilities: HealthCapabilities,
}

#[derive(Debug, Serialize)]
struct HealthCapabilities {
    llm_provider: String,
    serpapi_configured: bool,
    airports_loaded: usize,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    user_message: String,
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResetRequest {
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ItineraryRequest {
    #[serde(default)]
    destination: String,
    #[serde(default)]
    start_date: String,
    #[serde(default)]
    num_days: String,
    #[serde(default)]
    budget: String,
    #[serde(default)]
    departure_city: String,
    #[serde(default)]
    trip_type: String,
}

#[derive(Debug, Deserialize)]
struct AirportsRequest {
    search: String,
}

#[derive(Debug, Deserialize)]
struct FlightRequest {
    departure_id: String,
    arrival_id: String,
    outbound_date: String,
    return_date: String,
    currency: Option<String>,
}

/// Builds the full application from environment configuration. The only
/// fatal misconfiguration is an empty chat-provider chain; every lookup
/// surface degrades at request time instead.
pub async fn build_app() -> Result<Router> {
    let metrics = AppMetrics::shared();

    let http = Client::builder()
        .connect_timeout(Duration::from_secs(6))
        .timeout(Duration::from_secs(20))
        .build()
        .context("failed to build HTTP client")?;

    let model = resolve_chat_model(http.clone())?;
    let llm_provider = model.name().to_string();
    let model: Arc<dyn ChatModel> = Arc::new(model);

    let mut search = SerpApiClient::new(
        http.clone(),
        env::var("SERPAPI_API_KEY").unwrap_or_default(),
    );
    if let Ok(base_url) = env::var("WAYFINDER_SEARCH_URL") {
        search = search.with_base_url(base_url);
    }

    let mut countries = RestCountries::new(http.clone());
    if let Ok(base_url) = env::var("WAYFINDER_COUNTRIES_URL") {
        countries = countries.with_base_url(base_url);
    }

    let airports_url =
        env::var("WAYFINDER_AIRPORTS_URL").unwrap_or_else(|_| DEFAULT_AIRPORTS_URL.to_string());
    let directory = Arc::new(AirportDirectory::load(&http, &airports_url).await);

    let rate_limit_window = Duration::from_secs(
        env::var("WAYFINDER_RATE_LIMIT_WINDOW_SECONDS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(60),
    );
    let rate_limit_max = env::var("WAYFINDER_RATE_LIMIT_MAX")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(80);

    let dialogue = Arc::new(DialogueManager::new(model.clone(), metrics.clone()));
    let assembler = Arc::new(ItineraryAssembler::new(
        model,
        search.clone(),
        countries.clone(),
        directory.clone(),
        metrics.clone(),
    ));

    let state = ApiState {
        dialogue,
        assembler,
        search,
        countries,
        directory,
        metrics,
        llm_provider,
        limiter: IpRateLimiter::new(rate_limit_window, rate_limit_max),
        allowed_origins: Arc::new(parse_allowed_origins()),
    };

    Ok(build_router(state))
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .route("/api/reset", post(reset))
        .route("/api/generate_itinerary", post(generate_itinerary))
        .route("/api/airports", post(airports))
        .route("/api/flight", post(flight))
        .layer(build_cors_layer(&state.allowed_origins))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            track_requests_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(RequestBodyLimitLayer::new(REQUEST_BODY_LIMIT_BYTES))
        .with_state(state)
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let payload = HealthResponse {
        status: "ok",
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
        metrics: state.metrics.snapshot(),
        capabilities: HealthCapabilities {
            llm_provider: state.llm_provider.clone(),
            serpapi_configured: state.search.is_configured(),
            airports_loaded: state.directory.len(),
        },
    };
    (StatusCode::OK, Json(payload))
}

async fn chat(
    State(state): State<ApiState>,
    Json(request): Json<ChatRequest>,
) -> impl IntoResponse {
    let session_id = request
        .session_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let turn = state
        .dialogue
        .handle_turn(&session_id, &request.user_message)
        .await;

    (
        StatusCode::OK,
        Json(json!({
            "reply": turn.reply,
            "variables": turn.variables,
            "done": turn.done,
            "session_id": session_id,
        })),
    )
}

async fn reset(
    State(state): State<ApiState>,
    Json(request): Json<ResetRequest>,
) -> impl IntoResponse {
    if let Some(session_id) = request.session_id.as_deref() {
        state.dialogue.reset(session_id).await;
    }
    (
        StatusCode::OK,
        Json(json!({ "message": "Conversation has been reset." })),
    )
}

async fn generate_itinerary(
    State(state): State<ApiState>,
    Json(request): Json<ItineraryRequest>,
) -> impl IntoResponse {
    let today = Local::now().date_naive();
    let details = TripDetails {
        destination: request.destination.trim().to_string(),
        start_date: coerce_start_date(&request.start_date, today)
            .format("%Y-%m-%d")
            .to_string(),
        num_days: coerce_num_days(&request.num_days),
        budget: request.budget.trim().to_string(),
        departure_city: request.departure_city.trim().to_string(),
        trip_type: request.trip_type.trim().to_string(),
    };

    match state.assembler.generate(&details).await {
        Ok(itinerary) => (StatusCode::OK, Json(json!({ "itinerary": itinerary }))),
        Err(error) => {
            tracing::warn!(%error, destination = %details.destination, "itinerary generation failed");
            (
                StatusCode::OK,
                Json(json!({ "itinerary": { "error": error.to_string() } })),
            )
        }
    }
}

async fn airports(
    State(state): State<ApiState>,
    Json(request): Json<AirportsRequest>,
) -> impl IntoResponse {
    match resolve_place(
        &state.search,
        &state.countries,
        state.directory.as_ref(),
        &request.search,
    )
    .await
    {
        Ok(resolution) => (StatusCode::OK, Json(json!(resolution))),
        Err(error) => {
            state.metrics.inc_lookup_miss();
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": error.to_string() })),
            )
        }
    }
}

async fn flight(
    State(state): State<ApiState>,
    Json(request): Json<FlightRequest>,
) -> impl IntoResponse {
    let currency = request.currency.unwrap_or_else(|| "USD".to_string());

    match search_flights(
        &state.search,
        &state.countries,
        state.directory.as_ref(),
        &request.departure_id,
        &request.arrival_id,
        &request.outbound_date,
        &request.return_date,
        &currency,
    )
    .await
    {
        Ok(result) => (StatusCode::OK, Json(json!(result))),
        Err(error) => {
            state.metrics.inc_lookup_miss();
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": error.to_string() })),
            )
        }
    }
}

fn parse_allowed_origins() -> Vec<String> {
    let default_origins = [
        "http://localhost:5500",
        "http://127.0.0.1:5500",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
    ];

    env::var("WAYFINDER_ALLOWED_ORIGINS")
        .ok()
        .map(|value| {
            value
                .split(',')
                .map(|origin| origin.trim().trim_end_matches('/').to_string())
                .filter(|origin| !origin.is_empty())
                .collect::<Vec<_>>()
        })
        .unwrap_or_else(|| {
            default_origins
                .iter()
                .map(|origin| origin.to_string())
                .collect()
        })
}

fn build_cors_layer(allowed_origins: &Arc<Vec<String>>) -> CorsLayer {
    let origins = allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();
    let origins = if origins.is_empty() {
        vec![HeaderValue::from_static("http://localhost:5500")]
    } else {
        origins
    };

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

async fn track_requests_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    state.metrics.inc_request();
    next.run(request).await
}

async fn rate_limit_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS || request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let ip = request_ip(&request);
    if !state.limiter.allow(&ip) {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "error": "rate_limited",
                "message": "rate limit exceeded for this IP"
            })),
        )
            .into_response();
    }

    next.run(request).await
}

fn request_ip(request: &Request<Body>) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .split(',')
                .next()
                .unwrap_or("unknown")
                .trim()
                .to_string()
        })
        .unwrap_or_else(|| "local".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ip_takes_first_forwarded_hop() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(request_ip(&request), "203.0.113.7");
    }

    #[test]
    fn request_ip_falls_back_to_local() {
        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(request_ip(&request), "local");
    }
}
