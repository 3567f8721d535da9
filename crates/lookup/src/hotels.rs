use serde_json::Value;
use tracing::warn;
use wayfinder_core::{HotelImage, HotelSummary};

use crate::search::{HotelQuery, SearchProvider};

/// Listings kept from the provider response.
const TOP_HOTELS: usize = 5;

/// Top hotel offers for a destination and date range. Every failure mode
/// (provider error, unexpected payload) degrades to an empty list.
pub async fn search_hotels<S>(
    search: &S,
    destination: &str,
    check_in: &str,
    check_out: &str,
    adults: u32,
    currency: &str,
) -> Vec<HotelSummary>
where
    S: SearchProvider + ?Sized,
{
    let query = HotelQuery {
        destination: destination.to_string(),
        check_in: check_in.to_string(),
        check_out: check_out.to_string(),
        adults,
        currency: currency.to_string(),
    };

    match search.hotel_search(&query).await {
        Ok(payload) => normalize_hotels(&payload),
        Err(error) => {
            warn!(%destination, %error, "hotel search failed");
            Vec::new()
        }
    }
}

/// Sponsored listings (`ads`) are preferred over organic `properties` when
/// both exist; price and star class each fall back through two source
/// fields.
pub fn normalize_hotels(payload: &Value) -> Vec<HotelSummary> {
    let listings = ["ads", "properties"]
        .iter()
        .filter_map(|key| payload.get(*key).and_then(Value::as_array))
        .find(|entries| !entries.is_empty());

    let Some(listings) = listings else {
        return Vec::new();
    };

    listings.iter().take(TOP_HOTELS).map(hotel_summary).collect()
}

fn hotel_summary(hotel: &Value) -> HotelSummary {
    let images = hotel
        .get("images")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .map(|image| HotelImage {
                    thumbnail: text(image.get("thumbnail")),
                    original_image: text(image.get("original_image")),
                })
                .collect()
        })
        .unwrap_or_default();

    HotelSummary {
        name: text(hotel.get("name")),
        description: text(hotel.get("description")),
        price_per_night: text(hotel.get("price")).or_else(|| {
            text(hotel.get("rate_per_night").and_then(|rate| rate.get("lowest")))
        }),
        link: text(hotel.get("link")),
        hotel_class: display(hotel.get("extracted_hotel_class"))
            .or_else(|| display(hotel.get("hotel_class"))),
        images,
    }
}

fn text(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(ToString::to_string)
}

/// Star-class fields arrive as either numbers or strings.
fn display(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(text)) => Some(text.clone()),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sponsored_listings_win_over_organic() {
        let payload = json!({
            "ads": [ { "name": "Sponsored Stay", "price": "$120" } ],
            "properties": [ { "name": "Organic Stay" } ]
        });
        let hotels = normalize_hotels(&payload);
        assert_eq!(hotels.len(), 1);
        assert_eq!(hotels[0].name.as_deref(), Some("Sponsored Stay"));
        assert_eq!(hotels[0].price_per_night.as_deref(), Some("$120"));
    }

    #[test]
    fn empty_ads_fall_back_to_properties() {
        let payload = json!({
            "ads": [],
            "properties": [
                {
                    "name": "Seaside Resort",
                    "rate_per_night": { "lowest": "$88" },
                    "extracted_hotel_class": 4,
                    "images": [
                        { "thumbnail": "t1.jpg", "original_image": "o1.jpg" },
                        { "thumbnail": "t2.jpg" }
                    ]
                }
            ]
        });

        let hotels = normalize_hotels(&payload);
        assert_eq!(hotels.len(), 1);
        let hotel = &hotels[0];
        assert_eq!(hotel.price_per_night.as_deref(), Some("$88"));
        assert_eq!(hotel.hotel_class.as_deref(), Some("4"));
        assert_eq!(hotel.images.len(), 2);
        assert_eq!(hotel.images[1].original_image, None);
    }

    #[test]
    fn hotel_class_falls_back_to_string_field() {
        let payload = json!({
            "properties": [ { "name": "Inn", "hotel_class": "3-star hotel" } ]
        });
        let hotels = normalize_hotels(&payload);
        assert_eq!(hotels[0].hotel_class.as_deref(), Some("3-star hotel"));
    }

    #[test]
    fn at_most_five_listings_survive() {
        let listings: Vec<Value> = (0..8).map(|i| json!({ "name": format!("H{i}") })).collect();
        let payload = json!({ "properties": listings });
        assert_eq!(normalize_hotels(&payload).len(), 5);
    }

    #[test]
    fn unexpected_payload_is_empty_not_fatal() {
        assert!(normalize_hotels(&json!({})).is_empty());
        assert!(normalize_hotels(&json!({ "error": "quota exceeded" })).is_empty());
    }
}
