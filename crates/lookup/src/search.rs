use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

const DEFAULT_SEARCH_URL: &str = "https://serpapi.com/search.json";

#[derive(Debug, Clone)]
pub struct FlightQuery {
    pub departure_id: String,
    pub arrival_id: String,
    pub outbound_date: String,
    pub return_date: String,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct HotelQuery {
    pub destination: String,
    pub check_in: String,
    pub check_out: String,
    pub adults: u32,
    pub currency: String,
}

/// Search-engine-results collaborator: place/maps lookup, flight offers,
/// hotel offers. Responses are raw payloads; shape-sniffing happens in the
/// callers, behind typed extractors.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn maps_search(&self, query: &str, search_type: &str) -> Result<Value>;
    async fn flight_search(&self, query: &FlightQuery) -> Result<Value>;
    async fn hotel_search(&self, query: &HotelQuery) -> Result<Value>;
}

#[derive(Debug, Clone)]
pub struct SerpApiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl SerpApiClient {
    pub fn new(http: reqwest::Client, api_key: String) -> Self {
        Self {
            http,
            api_key,
            base_url: DEFAULT_SEARCH_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn get(&self, params: &[(&str, &str)]) -> Result<Value> {
        let response = self
            .http
            .get(&self.base_url)
            .query(params)
            .query(&[("api_key", self.api_key.as_str())])
            .send()
            .await
            .context("search provider request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("search provider status {}: {}", status.as_u16(), body);
        }

        response
            .json()
            .await
            .context("search provider returned non-JSON body")
    }
}

#[async_trait]
impl SearchProvider for SerpApiClient {
    async fn maps_search(&self, query: &str, search_type: &str) -> Result<Value> {
        self.get(&[
            ("engine", "google_maps"),
            ("q", query),
            ("type", search_type),
        ])
        .await
    }

    async fn flight_search(&self, query: &FlightQuery) -> Result<Value> {
        self.get(&[
            ("engine", "google_flights"),
            ("departure_id", &query.departure_id),
            ("arrival_id", &query.arrival_id),
            ("outbound_date", &query.outbound_date),
            ("return_date", &query.return_date),
            ("currency", &query.currency),
            ("hl", "en"),
        ])
        .await
    }

    async fn hotel_search(&self, query: &HotelQuery) -> Result<Value> {
        let adults = query.adults.to_string();
        self.get(&[
            ("engine", "google_hotels"),
            ("q", &query.destination),
            ("check_in_date", &query.check_in),
            ("check_out_date", &query.check_out),
            ("adults", adults.as_str()),
            ("currency", &query.currency),
            ("gl", "us"),
            ("hl", "en"),
        ])
        .await
    }
}
