use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

const DEFAULT_COUNTRIES_URL: &str = "https://restcountries.com/v3.1";

/// Country-metadata collaborator: maps a country name to its capital city so
/// "Japan" geocodes as "Tokyo". Anything that is not a recognized country
/// resolves to `None`.
#[async_trait]
pub trait CountryLookup: Send + Sync {
    async fn capital_for(&self, name: &str) -> Option<String>;
}

#[derive(Debug, Clone)]
pub struct RestCountries {
    http: reqwest::Client,
    base_url: String,
}

impl RestCountries {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: DEFAULT_COUNTRIES_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[async_trait]
impl CountryLookup for RestCountries {
    async fn capital_for(&self, name: &str) -> Option<String> {
        let url = format!("{}/name/{}", self.base_url, name);
        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(error) => {
                debug!(%name, %error, "country lookup request failed");
                return None;
            }
        };

        let payload: Value = response.json().await.ok()?;
        extract_capital(&payload)
    }
}

pub(crate) fn extract_capital(payload: &Value) -> Option<String> {
    payload
        .as_array()?
        .first()?
        .get("capital")?
        .as_array()?
        .first()?
        .as_str()
        .map(ToString::to_string)
}
