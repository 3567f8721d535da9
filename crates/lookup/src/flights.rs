use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};
use wayfinder_core::{
    Coordinates, EndpointCoordinates, FlightLeg, FlightOption, FlightRouteSummary,
    FlightSearchResult,
};

use crate::airports::AirportDirectory;
use crate::countries::CountryLookup;
use crate::geocode::resolve_coordinates;
use crate::search::{FlightQuery, SearchProvider};

/// Candidate airports tried per endpoint during fallback.
const NEARBY_CANDIDATES: usize = 5;
/// Offers kept in the normalized summary.
const SUMMARY_OFFERS: usize = 3;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("Could not find coordinates for '{0}'")]
    CoordinatesNotFound(String),
    #[error("No commercial airport found near this location")]
    NoAirportNearby,
    #[error("Could not resolve airports.")]
    UnresolvedAirports,
    #[error("No flights found for any nearby airport combinations.")]
    NoFlights,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaceResolution {
    pub place: String,
    pub place_coordinates: Coordinates,
    pub nearest_international_airport: String,
    pub airport_code: String,
    pub airport_coordinates: Coordinates,
    pub distance_km: f64,
}

/// Place name to its nearest commercial airport, with the capital
/// substitution applied first so country names resolve sensibly.
pub async fn resolve_place<S, C>(
    search: &S,
    countries: &C,
    directory: &AirportDirectory,
    place: &str,
) -> Result<PlaceResolution, LookupError>
where
    S: SearchProvider + ?Sized,
    C: CountryLookup + ?Sized,
{
    let effective = match countries.capital_for(place).await {
        Some(capital) => capital,
        None => place.to_string(),
    };

    let (lat, lon) = crate::geocode::geocode(search, &effective)
        .await
        .ok_or_else(|| LookupError::CoordinatesNotFound(effective.clone()))?;

    let (airport, distance) = directory
        .nearest(lat, lon)
        .ok_or(LookupError::NoAirportNearby)?;

    Ok(PlaceResolution {
        place: effective,
        place_coordinates: Coordinates { lat, lon },
        nearest_international_airport: airport.name.clone(),
        airport_code: airport.iata.clone(),
        airport_coordinates: Coordinates {
            lat: airport.lat,
            lon: airport.lon,
        },
        distance_km: (distance * 100.0).round() / 100.0,
    })
}

/// Flight search with nearest-airport fallback: geocode both endpoints, rank
/// the five closest commercial airports to each, and walk the Cartesian
/// product nearest-first until a response carries offers. Only after all 25
/// combinations come back empty does the search report no flights.
pub async fn search_flights<S, C>(
    search: &S,
    countries: &C,
    directory: &AirportDirectory,
    departure_place: &str,
    arrival_place: &str,
    outbound_date: &str,
    return_date: &str,
    currency: &str,
) -> Result<FlightSearchResult, LookupError>
where
    S: SearchProvider + ?Sized,
    C: CountryLookup + ?Sized,
{
    let departure = resolve_place(search, countries, directory, departure_place)
        .await
        .map_err(|_| LookupError::UnresolvedAirports)?;
    let arrival = resolve_place(search, countries, directory, arrival_place)
        .await
        .map_err(|_| LookupError::UnresolvedAirports)?;

    let departure_candidates = directory.nearest_k(
        departure.place_coordinates.lat,
        departure.place_coordinates.lon,
        NEARBY_CANDIDATES,
    );
    let arrival_candidates = directory.nearest_k(
        arrival.place_coordinates.lat,
        arrival.place_coordinates.lon,
        NEARBY_CANDIDATES,
    );

    let mut found: Option<(Value, String, String)> = None;

    'outer: for (departure_airport, _) in &departure_candidates {
        for (arrival_airport, _) in &arrival_candidates {
            let query = FlightQuery {
                departure_id: departure_airport.iata.clone(),
                arrival_id: arrival_airport.iata.clone(),
                outbound_date: outbound_date.to_string(),
                return_date: return_date.to_string(),
                currency: currency.to_string(),
            };

            debug!(
                departure = %query.departure_id,
                arrival = %query.arrival_id,
                "trying airport pair"
            );

            match search.flight_search(&query).await {
                Ok(payload) if has_offers(&payload) => {
                    found = Some((payload, query.departure_id, query.arrival_id));
                    break 'outer;
                }
                Ok(_) => {}
                Err(error) => {
                    debug!(%error, "flight query failed, trying next pair");
                }
            }
        }
    }

    let (payload, departure_code, arrival_code) = found.ok_or(LookupError::NoFlights)?;

    let flights = summarize_offers(&payload, currency, &departure_code, &arrival_code);
    info!(
        route = %format!("{departure_code} -> {arrival_code}"),
        offers = flights.len(),
        "flight search succeeded"
    );

    Ok(FlightSearchResult {
        search_metadata: section(&payload, "search_metadata"),
        search_parameters: section(&payload, "search_parameters"),
        price_insights: section(&payload, "price_insights"),
        airports: payload
            .get("airports")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new())),
        best_flights: payload
            .get("best_flights")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new())),
        other_flights: payload
            .get("other_flights")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new())),
        summary: FlightRouteSummary {
            route: format!("{departure_code} \u{2192} {arrival_code}"),
            flights_found: flights.len(),
            flights,
        },
        coordinates: EndpointCoordinates {
            departure_place: Some(departure.place_coordinates),
            departure_airport: Some(departure.airport_coordinates),
            arrival_place: Some(arrival.place_coordinates),
            arrival_airport: Some(arrival.airport_coordinates),
        },
    })
}

pub fn has_offers(payload: &Value) -> bool {
    ["best_flights", "other_flights"].iter().any(|key| {
        payload
            .get(*key)
            .and_then(Value::as_array)
            .is_some_and(|offers| !offers.is_empty())
    })
}

fn section(payload: &Value, key: &str) -> Value {
    payload
        .get(key)
        .cloned()
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()))
}

/// Top offers (best first, then other) normalized into ranked summaries.
pub fn summarize_offers(
    payload: &Value,
    currency: &str,
    fallback_departure: &str,
    fallback_arrival: &str,
) -> Vec<FlightOption> {
    let best = payload
        .get("best_flights")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let other = payload
        .get("other_flights")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    best.iter()
        .chain(other.iter())
        .take(SUMMARY_OFFERS)
        .enumerate()
        .map(|(index, offer)| summarize_offer(offer, index + 1, currency, fallback_departure, fallback_arrival))
        .collect()
}

fn summarize_offer(
    offer: &Value,
    rank: usize,
    currency: &str,
    fallback_departure: &str,
    fallback_arrival: &str,
) -> FlightOption {
    let legs_raw = offer
        .get("flights")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let route = match (legs_raw.first(), legs_raw.last()) {
        (Some(first), Some(last)) => {
            let src_name = airport_field(first, "departure_airport", "name");
            let src_code = airport_field(first, "departure_airport", "id");
            let dst_name = airport_field(last, "arrival_airport", "name");
            let dst_code = airport_field(last, "arrival_airport", "id");
            format!("{src_name} ({src_code}) \u{2192} {dst_name} ({dst_code})")
        }
        _ => format!("Unknown ({fallback_departure}) \u{2192} Unknown ({fallback_arrival})"),
    };

    let mut layovers: Vec<String> = offer
        .get("layovers")
        .and_then(Value::as_array)
        .map(|stops| {
            stops
                .iter()
                .map(|stop| {
                    format!(
                        "{} ({} min)",
                        stop.get("name").and_then(Value::as_str).unwrap_or("Unknown"),
                        stop.get("duration").and_then(Value::as_i64).unwrap_or(0)
                    )
                })
                .collect()
        })
        .unwrap_or_default();
    if layovers.is_empty() {
        layovers.push("None".to_string());
    }

    let legs = legs_raw
        .iter()
        .map(|leg| FlightLeg {
            airline: string_field(leg, "airline"),
            flight_number: string_field(leg, "flight_number"),
            departure: airport_field(leg, "departure_airport", "name"),
            arrival: airport_field(leg, "arrival_airport", "name"),
            duration_min: leg.get("duration").and_then(Value::as_i64),
            airplane: string_field(leg, "airplane"),
            travel_class: string_field(leg, "travel_class"),
            legroom: string_field(leg, "legroom"),
            airline_logo: string_field(leg, "airline_logo"),
        })
        .collect();

    let price = match offer.get("price") {
        Some(Value::Number(amount)) => format!("{amount} {currency}"),
        Some(Value::String(amount)) => format!("{amount} {currency}"),
        _ => format!("N/A {currency}"),
    };

    FlightOption {
        rank,
        route,
        flight_type: offer
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("N/A")
            .to_string(),
        price,
        total_duration_min: offer.get("total_duration").and_then(Value::as_i64),
        layovers,
        legs,
        airline_logo: string_field(offer, "airline_logo"),
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

fn airport_field(leg: &Value, airport_key: &str, field: &str) -> String {
    leg.get(airport_key)
        .and_then(|airport| airport.get(field))
        .and_then(Value::as_str)
        .unwrap_or("Unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use wayfinder_core::{Airport, AirportSize};

    use crate::search::HotelQuery;

    fn airport(iata: &str, lat: f64, lon: f64) -> Airport {
        Airport {
            name: format!("{iata} International Airport"),
            city: iata.to_string(),
            country: "XX".to_string(),
            iata: iata.to_string(),
            lat,
            lon,
            size: AirportSize::Large,
        }
    }

    fn offer_payload() -> Value {
        json!({
            "search_metadata": { "id": "abc" },
            "best_flights": [
                {
                    "type": "Round trip",
                    "price": 420,
                    "total_duration": 615,
                    "airline_logo": "https://logos.example/multi.png",
                    "layovers": [ { "name": "Doha Hamad International", "duration": 95 } ],
                    "flights": [
                        {
                            "airline": "Qatar Airways",
                            "flight_number": "QR 12",
                            "duration": 380,
                            "airplane": "Boeing 777",
                            "travel_class": "Economy",
                            "legroom": "31 in",
                            "departure_airport": { "name": "Dallas Fort Worth", "id": "DFW" },
                            "arrival_airport": { "name": "Doha Hamad International", "id": "DOH" }
                        },
                        {
                            "airline": "Qatar Airways",
                            "flight_number": "QR 960",
                            "duration": 235,
                            "departure_airport": { "name": "Doha Hamad International", "id": "DOH" },
                            "arrival_airport": { "name": "Ngurah Rai International", "id": "DPS" }
                        }
                    ]
                }
            ],
            "other_flights": []
        })
    }

    #[test]
    fn offers_are_ranked_and_normalized() {
        let flights = summarize_offers(&offer_payload(), "USD", "DFW", "DPS");
        assert_eq!(flights.len(), 1);

        let first = &flights[0];
        assert_eq!(first.rank, 1);
        assert_eq!(
            first.route,
            "Dallas Fort Worth (DFW) \u{2192} Ngurah Rai International (DPS)"
        );
        assert_eq!(first.price, "420 USD");
        assert_eq!(first.total_duration_min, Some(615));
        assert_eq!(first.layovers, vec!["Doha Hamad International (95 min)"]);
        assert_eq!(first.legs.len(), 2);
        assert_eq!(first.legs[1].flight_number.as_deref(), Some("QR 960"));
    }

    #[test]
    fn direct_flight_reports_no_layovers() {
        let payload = json!({
            "best_flights": [ { "price": "99", "flights": [] } ]
        });
        let flights = summarize_offers(&payload, "EUR", "AAA", "BBB");
        assert_eq!(flights[0].layovers, vec!["None"]);
        assert_eq!(flights[0].route, "Unknown (AAA) \u{2192} Unknown (BBB)");
        assert_eq!(flights[0].price, "99 EUR");
    }

    #[test]
    fn offers_detection() {
        assert!(has_offers(&offer_payload()));
        assert!(!has_offers(&json!({ "best_flights": [], "other_flights": [] })));
        assert!(!has_offers(&json!({})));
        assert!(has_offers(&json!({ "other_flights": [ {} ] })));
    }

    struct PairScriptedSearch {
        place_coords: Vec<(String, (f64, f64))>,
        succeed_on: Option<(String, String)>,
        attempts: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl SearchProvider for PairScriptedSearch {
        async fn maps_search(&self, query: &str, _search_type: &str) -> Result<Value> {
            Ok(self
                .place_coords
                .iter()
                .find(|(place, _)| place == query)
                .map(|(_, (lat, lon))| {
                    json!({
                        "place_results": {
                            "gps_coordinates": { "latitude": lat, "longitude": lon }
                        }
                    })
                })
                .unwrap_or_else(|| json!({})))
        }

        async fn flight_search(&self, query: &FlightQuery) -> Result<Value> {
            let pair = (query.departure_id.clone(), query.arrival_id.clone());
            self.attempts.lock().push(pair.clone());
            if self.succeed_on.as_ref() == Some(&pair) {
                Ok(offer_payload())
            } else {
                Ok(json!({ "best_flights": [], "other_flights": [] }))
            }
        }

        async fn hotel_search(&self, _query: &HotelQuery) -> Result<Value> {
            Ok(json!({}))
        }
    }

    struct NoCountries;

    #[async_trait]
    impl CountryLookup for NoCountries {
        async fn capital_for(&self, _name: &str) -> Option<String> {
            None
        }
    }

    fn small_directory() -> AirportDirectory {
        AirportDirectory::from_airports(vec![
            airport("AAA", 10.0, 10.0),
            airport("AAB", 10.5, 10.5),
            airport("BBA", 50.0, 50.0),
            airport("BBB", 50.5, 50.5),
        ])
    }

    #[tokio::test]
    async fn fallback_walks_pairs_nearest_first() {
        let search = PairScriptedSearch {
            place_coords: vec![
                ("depville".to_string(), (10.0, 10.0)),
                ("arrtown".to_string(), (50.0, 50.0)),
            ],
            succeed_on: Some(("AAB".to_string(), "BBA".to_string())),
            attempts: Mutex::new(Vec::new()),
        };

        let result = search_flights(
            &search,
            &NoCountries,
            &small_directory(),
            "Depville",
            "Arrtown",
            "2025-06-01",
            "2025-06-05",
            "USD",
        )
        .await
        .unwrap();

        assert_eq!(result.summary.route, "AAB \u{2192} BBA");
        assert_eq!(result.summary.flights_found, 1);

        // Both endpoints carry place and airport coordinates.
        let coords = result.coordinates;
        assert_eq!(coords.departure_place.map(|c| (c.lat, c.lon)), Some((10.0, 10.0)));
        assert_eq!(coords.arrival_place.map(|c| (c.lat, c.lon)), Some((50.0, 50.0)));
        assert!(coords.departure_airport.is_some());
        assert!(coords.arrival_airport.is_some());

        // Nearest-first: all arrival candidates for AAA before moving on.
        let attempts = search.attempts.lock();
        assert_eq!(
            attempts.as_slice(),
            [
                ("AAA".to_string(), "BBA".to_string()),
                ("AAA".to_string(), "BBB".to_string()),
                ("AAA".to_string(), "AAB".to_string()),
                ("AAA".to_string(), "AAA".to_string()),
                ("AAB".to_string(), "BBA".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn exhausting_all_pairs_is_the_no_flights_error() {
        let search = PairScriptedSearch {
            place_coords: vec![
                ("depville".to_string(), (10.0, 10.0)),
                ("arrtown".to_string(), (50.0, 50.0)),
            ],
            succeed_on: None,
            attempts: Mutex::new(Vec::new()),
        };

        let error = search_flights(
            &search,
            &NoCountries,
            &small_directory(),
            "Depville",
            "Arrtown",
            "2025-06-01",
            "2025-06-05",
            "USD",
        )
        .await
        .unwrap_err();

        assert_eq!(
            error.to_string(),
            "No flights found for any nearby airport combinations."
        );
        // 4 candidates per endpoint in this directory.
        assert_eq!(search.attempts.lock().len(), 16);
    }

    #[tokio::test]
    async fn unresolvable_endpoint_fails_early() {
        let search = PairScriptedSearch {
            place_coords: Vec::new(),
            succeed_on: None,
            attempts: Mutex::new(Vec::new()),
        };

        let error = search_flights(
            &search,
            &NoCountries,
            &small_directory(),
            "Depville",
            "Arrtown",
            "2025-06-01",
            "2025-06-05",
            "USD",
        )
        .await
        .unwrap_err();

        assert_eq!(error.to_string(), "Could not resolve airports.");
        assert!(search.attempts.lock().is_empty());
    }

    #[tokio::test]
    async fn resolve_place_reports_nearest_airport() {
        let search = PairScriptedSearch {
            place_coords: vec![("depville".to_string(), (10.1, 10.1))],
            succeed_on: None,
            attempts: Mutex::new(Vec::new()),
        };

        let resolution = resolve_place(&search, &NoCountries, &small_directory(), "Depville")
            .await
            .unwrap();
        assert_eq!(resolution.airport_code, "AAA");
        assert_eq!(resolution.place, "Depville");
        assert!(resolution.distance_km > 0.0);
    }

    #[tokio::test]
    async fn empty_directory_reports_no_airport() {
        let search = PairScriptedSearch {
            place_coords: vec![("depville".to_string(), (10.1, 10.1))],
            succeed_on: None,
            attempts: Mutex::new(Vec::new()),
        };
        let directory = AirportDirectory::default();

        let error = resolve_place(&search, &NoCountries, &directory, "Depville")
            .await
            .unwrap_err();
        assert!(matches!(error, LookupError::NoAirportNearby));
    }
}
