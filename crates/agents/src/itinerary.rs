use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{instrument, warn};
use wayfinder_core::dates::format_human;
use wayfinder_core::{
    FirstFlight, FlightRouteSummary, HotelSummary, Itinerary, ItineraryDay, TripDetails,
};
use wayfinder_lookup::{
    search_flights, search_hotels, AirportDirectory, ChatModel, CountryLookup, SearchProvider,
};
use wayfinder_observability::AppMetrics;

const ITINERARY_MAX_TOKENS: u32 = 1800;
const MAX_HOTELS: usize = 4;
const MAX_HOTEL_IMAGES: usize = 3;

static DAY_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:##\s*Day\s*\d+:|\*\*Day\s*\d+:|Day\s*\d+:)").expect("valid day header regex"));

/// Builds the full itinerary for a completed conversation: location lookup,
/// hotels, flights with nearest-airport fallback, then a day-by-day plan
/// drafted by the model against that context.
pub struct ItineraryAssembler<S, C> {
    model: Arc<dyn ChatModel>,
    search: S,
    countries: C,
    directory: Arc<AirportDirectory>,
    metrics: Arc<AppMetrics>,
}

impl<S, C> ItineraryAssembler<S, C>
where
    S: SearchProvider,
    C: CountryLookup,
{
    pub fn new(
        model: Arc<dyn ChatModel>,
        search: S,
        countries: C,
        directory: Arc<AirportDirectory>,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        Self {
            model,
            search,
            countries,
            directory,
            metrics,
        }
    }

    #[instrument(skip(self, details), fields(destination = %details.destination))]
    pub async fn generate(&self, details: &TripDetails) -> Result<Itinerary> {
        let start = NaiveDate::parse_from_str(&details.start_date, "%Y-%m-%d")
            .with_context(|| format!("invalid start date '{}'", details.start_date))?;
        let nights = details.num_days.max(1) as i64;
        let end = start + Duration::days(nights - 1);
        let dates = format!("{} - {}", format_human(start), format_human(end));

        let location = match self
            .search
            .maps_search(&details.destination, "search")
            .await
        {
            Ok(payload) => payload,
            Err(error) => {
                warn!(%error, "location lookup failed");
                json!({})
            }
        };

        let check_in = start.format("%Y-%m-%d").to_string();
        let check_out = end.format("%Y-%m-%d").to_string();
        let mut hotels = search_hotels(
            &self.search,
            &details.destination,
            &check_in,
            &check_out,
            2,
            "USD",
        )
        .await;

        let (flights, first_flight) = match search_flights(
            &self.search,
            &self.countries,
            self.directory.as_ref(),
            &details.departure_city,
            &details.destination,
            &check_in,
            &check_out,
            "USD",
        )
        .await
        {
            Ok(result) => {
                let first = first_flight(&result.summary);
                (serde_json::to_value(&result)?, first)
            }
            Err(error) => {
                warn!(%error, "flight search failed");
                self.metrics.inc_lookup_miss();
                (json!({ "error": error.to_string() }), None)
            }
        };

        let prompt = build_prompt(details, &dates, &hotels, first_flight.as_ref());

        self.metrics.inc_llm_call();
        let draft = match self
            .model
            .complete(
                Some("You are a helpful and structured travel itinerary planner."),
                &prompt,
                ITINERARY_MAX_TOKENS,
            )
            .await
        {
            Ok(draft) => draft,
            Err(error) => {
                self.metrics.inc_llm_failure();
                return Err(error);
            }
        };

        let days = split_days(&draft);

        hotels.truncate(MAX_HOTELS);
        for hotel in &mut hotels {
            hotel.images.truncate(MAX_HOTEL_IMAGES);
        }

        Ok(Itinerary {
            destination: details.destination.clone(),
            departure_city: details.departure_city.clone(),
            trip_type: details.trip_type.clone(),
            budget: details.budget.clone(),
            dates,
            hotels,
            days,
            location,
            flights,
            first_flight,
        })
    }
}

/// Top-ranked offer trimmed down for prompt grounding. Airlines are
/// deduplicated in leg order.
fn first_flight(summary: &FlightRouteSummary) -> Option<FirstFlight> {
    let offer = summary.flights.first()?;
    let first_leg = offer.legs.first()?;
    let last_leg = offer.legs.last()?;

    let mut airlines: Vec<String> = Vec::new();
    for leg in &offer.legs {
        if let Some(airline) = &leg.airline {
            if !airlines.contains(airline) {
                airlines.push(airline.clone());
            }
        }
    }

    Some(FirstFlight {
        departure_airport: first_leg.departure.clone(),
        arrival_airport: last_leg.arrival.clone(),
        duration_min: offer.total_duration_min,
        cheapest_price: offer.price.clone(),
        airlines,
    })
}

fn hotel_context(hotels: &[HotelSummary]) -> String {
    if hotels.is_empty() {
        return "No hotel data available.".to_string();
    }

    hotels
        .iter()
        .enumerate()
        .map(|(index, hotel)| {
            format!(
                "{}. {} \u{2014} {} per night \u{2014} {}\u{2605}",
                index + 1,
                hotel.name.as_deref().unwrap_or("Unknown hotel"),
                hotel.price_per_night.as_deref().unwrap_or("N/A"),
                hotel.hotel_class.as_deref().unwrap_or("N/A"),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn flight_context(first_flight: Option<&FirstFlight>) -> String {
    match first_flight {
        Some(flight) => format!(
            "Best available flight: {} to {}, {} min, {} with {}.",
            flight.departure_airport,
            flight.arrival_airport,
            flight
                .duration_min
                .map(|minutes| minutes.to_string())
                .unwrap_or_else(|| "N/A".to_string()),
            flight.cheapest_price,
            flight.airlines.join(", "),
        ),
        None => "No flight data available.".to_string(),
    }
}

fn build_prompt(
    details: &TripDetails,
    dates: &str,
    hotels: &[HotelSummary],
    first_flight: Option<&FirstFlight>,
) -> String {
    format!(
        r#"Create a {num_days}-day travel itinerary for a trip to {destination}, departing from {departure_city}.
Trip dates: {dates}.
Trip type: {trip_type}. Budget: {budget}.

Here are real hotel options found for these dates:
{hotel_context}

{flight_context}

STRICT FORMAT REQUIREMENTS:
- Start each day with a header exactly like: ## Day 1: <short title>
- Under each day include Morning, Afternoon and Evening activities.
- Include a Hotel Recommendation drawn from the real options above.
- Include a Restaurant Suggestion for each day.
- Include a Travel Tip for each day.
- After the last day, include a budget breakdown by percentage, a total cost estimate, and a short note on how to save money.
- Keep activities realistic for the destination and season.
- Do not invent hotels that are not in the list above unless the list is empty.
"#,
        num_days = details.num_days,
        destination = details.destination,
        departure_city = details.departure_city,
        dates = dates,
        trip_type = details.trip_type,
        budget = details.budget,
        hotel_context = hotel_context(hotels),
        flight_context = flight_context(first_flight),
    )
}

/// Splits the model draft on day headers. Text before the first header is
/// preamble and gets dropped; each kept entry carries the header text
/// stripped of markdown markers as its title.
fn split_days(draft: &str) -> Vec<ItineraryDay> {
    let matches: Vec<_> = DAY_HEADER.find_iter(draft).collect();
    if matches.is_empty() {
        return Vec::new();
    }

    let mut days = Vec::with_capacity(matches.len());
    for (index, found) in matches.iter().enumerate() {
        let title = found
            .as_str()
            .trim_start_matches(['#', '*', ' '])
            .trim_end_matches(':')
            .trim()
            .to_string();

        let body_start = found.end();
        let body_end = matches
            .get(index + 1)
            .map(|next| next.start())
            .unwrap_or(draft.len());
        let description = draft[body_start..body_end].trim().to_string();

        days.push(ItineraryDay {
            day: title,
            description,
        });
    }
    days
}
