use serde::Deserialize;
use tracing::{info, warn};
use wayfinder_core::{Airport, AirportSize};

pub const DEFAULT_AIRPORTS_URL: &str = "https://ourairports.com/data/airports.csv";

/// Known business-jet-only airfields that carry an IATA code anyway.
const PRIVATE_AIRPORT_BLACKLIST: [&str; 3] = ["LBG", "TNF", "JLN"];

const EARTH_RADIUS_KM: f64 = 6371.0088;

pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}

#[derive(Debug, Deserialize)]
struct FeedRow {
    #[serde(rename = "type")]
    airport_type: String,
    name: String,
    latitude_deg: String,
    longitude_deg: String,
    iso_country: String,
    municipality: String,
    iata_code: String,
    scheduled_service: String,
}

/// Static commercial-airport list, loaded once at startup. A failed fetch
/// leaves the directory empty: downstream lookups report not-found instead
/// of the process failing.
#[derive(Debug, Default)]
pub struct AirportDirectory {
    airports: Vec<Airport>,
}

impl AirportDirectory {
    pub async fn load(http: &reqwest::Client, url: &str) -> Self {
        let body = match http.get(url).send().await {
            Ok(response) => match response.text().await {
                Ok(body) => body,
                Err(error) => {
                    warn!(%error, "airport feed body unreadable, starting with empty directory");
                    return Self::default();
                }
            },
            Err(error) => {
                warn!(%error, "airport feed fetch failed, starting with empty directory");
                return Self::default();
            }
        };

        let directory = Self::parse_feed(&body);
        info!(airports = directory.len(), "airport directory loaded");
        directory
    }

    /// Row-by-row, tolerant: any row that fails field extraction is skipped.
    pub fn parse_feed(raw: &str) -> Self {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(raw.as_bytes());

        let airports = reader
            .deserialize::<FeedRow>()
            .filter_map(Result::ok)
            .filter_map(airport_from_row)
            .collect();

        Self { airports }
    }

    pub fn from_airports(airports: Vec<Airport>) -> Self {
        Self { airports }
    }

    pub fn len(&self) -> usize {
        self.airports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.airports.is_empty()
    }

    /// Linear scan with a running minimum; the directory is a few thousand
    /// rows, no spatial index needed.
    pub fn nearest(&self, lat: f64, lon: f64) -> Option<(&Airport, f64)> {
        let mut closest: Option<(&Airport, f64)> = None;
        for airport in &self.airports {
            let distance = haversine_km(lat, lon, airport.lat, airport.lon);
            match closest {
                Some((_, best)) if best <= distance => {}
                _ => closest = Some((airport, distance)),
            }
        }
        closest
    }

    /// The k closest airports, ascending by distance.
    pub fn nearest_k(&self, lat: f64, lon: f64, k: usize) -> Vec<(&Airport, f64)> {
        let mut ranked: Vec<(&Airport, f64)> = self
            .airports
            .iter()
            .map(|airport| {
                (
                    airport,
                    haversine_km(lat, lon, airport.lat, airport.lon),
                )
            })
            .collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
        ranked.truncate(k);
        ranked
    }
}

fn airport_from_row(row: FeedRow) -> Option<Airport> {
    let iata = row.iata_code.trim();
    if iata.len() != 3 || iata == "\\N" {
        return None;
    }
    if PRIVATE_AIRPORT_BLACKLIST.contains(&iata) {
        return None;
    }

    let size = AirportSize::parse(&row.airport_type)?;
    if size == AirportSize::Small && !scheduled(&row.scheduled_service) {
        return None;
    }

    Some(Airport {
        name: row.name,
        city: row.municipality,
        country: row.iso_country,
        iata: iata.to_string(),
        lat: row.latitude_deg.trim().parse().ok()?,
        lon: row.longitude_deg.trim().parse().ok()?,
        size,
    })
}

fn scheduled(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "yes" | "true" | "1")
}
