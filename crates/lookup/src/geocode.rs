use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::countries::CountryLookup;
use crate::search::SearchProvider;

/// Country suffixes retried when a bare place name fails to geocode.
const FALLBACK_COUNTRIES: [&str; 6] = ["nepal", "india", "usa", "uk", "china", "japan"];

static THUMBNAIL_COORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@(-?\d+\.\d+),(-?\d+\.\d+)").expect("static pattern"));

/// Free-text place name to coordinates. Country names are swapped for their
/// capital city before any maps query goes out.
pub async fn resolve_coordinates<S, C>(search: &S, countries: &C, place: &str) -> Option<(f64, f64)>
where
    S: SearchProvider + ?Sized,
    C: CountryLookup + ?Sized,
{
    let effective = match countries.capital_for(place).await {
        Some(capital) => {
            debug!(%place, %capital, "country name replaced with capital");
            capital
        }
        None => place.to_string(),
    };
    geocode(search, &effective).await
}

/// The query chain: maps `type=place`, then `type=search`, then `type=search`
/// with each fallback country suffix, stopping at the first payload that
/// yields coordinates.
pub async fn geocode<S>(search: &S, place: &str) -> Option<(f64, f64)>
where
    S: SearchProvider + ?Sized,
{
    let query = place.to_lowercase();

    for search_type in ["place", "search"] {
        if let Some(gps) = try_query(search, &query, search_type).await {
            return Some(gps);
        }
    }

    for country in FALLBACK_COUNTRIES {
        let suffixed = format!("{query}, {country}");
        if let Some(gps) = try_query(search, &suffixed, "search").await {
            return Some(gps);
        }
    }

    None
}

async fn try_query<S>(search: &S, query: &str, search_type: &str) -> Option<(f64, f64)>
where
    S: SearchProvider + ?Sized,
{
    match search.maps_search(query, search_type).await {
        Ok(payload) => extract_gps(&payload),
        Err(error) => {
            debug!(%query, %search_type, %error, "maps query failed");
            None
        }
    }
}

/// Coordinates appear in several result shapes; each extractor handles one,
/// tried in order of reliability.
pub fn extract_gps(payload: &Value) -> Option<(f64, f64)> {
    const EXTRACTORS: [fn(&Value) -> Option<(f64, f64)>; 5] = [
        place_card,
        knowledge_panel,
        local_results,
        inline_map,
        thumbnail_url,
    ];

    EXTRACTORS
        .iter()
        .find_map(|extractor| extractor(payload))
}

fn gps_pair(value: &Value) -> Option<(f64, f64)> {
    let gps = value.get("gps_coordinates")?;
    Some((gps.get("latitude")?.as_f64()?, gps.get("longitude")?.as_f64()?))
}

fn place_card(payload: &Value) -> Option<(f64, f64)> {
    gps_pair(payload.get("place_results")?)
}

fn knowledge_panel(payload: &Value) -> Option<(f64, f64)> {
    gps_pair(payload.get("knowledge_graph")?)
}

fn local_results(payload: &Value) -> Option<(f64, f64)> {
    payload
        .get("local_results")?
        .as_array()?
        .iter()
        .find_map(gps_pair)
}

fn inline_map(payload: &Value) -> Option<(f64, f64)> {
    gps_pair(payload.get("inline_map")?)
}

/// Last resort: thumbnail image URLs embed an `@lat,lon` fragment.
fn thumbnail_url(payload: &Value) -> Option<(f64, f64)> {
    let thumb = payload.get("thumbnail")?.as_str()?;
    let captures = THUMBNAIL_COORDS.captures(thumb)?;
    Some((
        captures.get(1)?.as_str().parse().ok()?,
        captures.get(2)?.as_str().parse().ok()?,
    ))
}
