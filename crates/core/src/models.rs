use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AirportSize {
    Large,
    Medium,
    Small,
}

impl AirportSize {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "large_airport" => Some(Self::Large),
            "medium_airport" => Some(Self::Medium),
            "small_airport" => Some(Self::Small),
            _ => None,
        }
    }

    pub fn as_feed_code(self) -> &'static str {
        match self {
            Self::Large => "large_airport",
            Self::Medium => "medium_airport",
            Self::Small => "small_airport",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Airport {
    pub name: String,
    pub city: String,
    pub country: String,
    pub iata: String,
    pub lat: f64,
    pub lon: f64,
    pub size: AirportSize,
}

/// The six slots the dialogue manager fills, in canonical ask order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotField {
    Destination,
    StartDate,
    NumDays,
    Budget,
    DepartureCity,
    TripType,
}

impl SlotField {
    pub const ALL: [SlotField; 6] = [
        SlotField::Destination,
        SlotField::StartDate,
        SlotField::NumDays,
        SlotField::Budget,
        SlotField::DepartureCity,
        SlotField::TripType,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "destination" => Some(Self::Destination),
            "start_date" => Some(Self::StartDate),
            "num_days" => Some(Self::NumDays),
            "budget" => Some(Self::Budget),
            "departure_city" => Some(Self::DepartureCity),
            "trip_type" => Some(Self::TripType),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Destination => "destination",
            Self::StartDate => "start_date",
            Self::NumDays => "num_days",
            Self::Budget => "budget",
            Self::DepartureCity => "departure_city",
            Self::TripType => "trip_type",
        }
    }

    /// Human wording used when asking for the slot ("departure city").
    pub fn label(self) -> String {
        self.as_str().replace('_', " ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub user_text: String,
    pub assistant_text: String,
}

/// Per-session slot-filling state. A slot counts as filled once it holds a
/// non-empty string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationState {
    pub destination: String,
    pub start_date: String,
    pub num_days: String,
    pub budget: String,
    pub departure_city: String,
    pub trip_type: String,
    #[serde(skip)]
    pub last_asked_field: Option<SlotField>,
    #[serde(skip)]
    pub context: Vec<TranscriptTurn>,
}

impl ConversationState {
    pub fn get(&self, field: SlotField) -> &str {
        match field {
            SlotField::Destination => &self.destination,
            SlotField::StartDate => &self.start_date,
            SlotField::NumDays => &self.num_days,
            SlotField::Budget => &self.budget,
            SlotField::DepartureCity => &self.departure_city,
            SlotField::TripType => &self.trip_type,
        }
    }

    pub fn set(&mut self, field: SlotField, value: String) {
        let slot = match field {
            SlotField::Destination => &mut self.destination,
            SlotField::StartDate => &mut self.start_date,
            SlotField::NumDays => &mut self.num_days,
            SlotField::Budget => &mut self.budget,
            SlotField::DepartureCity => &mut self.departure_city,
            SlotField::TripType => &mut self.trip_type,
        };
        *slot = value;
    }

    pub fn is_filled(&self, field: SlotField) -> bool {
        !self.get(field).trim().is_empty()
    }

    pub fn missing_fields(&self) -> Vec<SlotField> {
        SlotField::ALL
            .into_iter()
            .filter(|field| !self.is_filled(*field))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Slot values as a json object, the shape embedded in prompts and
    /// returned as `variables` on every chat turn.
    pub fn as_value(&self) -> Value {
        serde_json::json!({
            "destination": self.destination,
            "start_date": self.start_date,
            "num_days": self.num_days,
            "budget": self.budget,
            "departure_city": self.departure_city,
            "trip_type": self.trip_type,
        })
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// All six slots, resolved. Input to the itinerary assembler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripDetails {
    pub destination: String,
    pub start_date: String,
    pub num_days: u32,
    pub budget: String,
    pub departure_city: String,
    pub trip_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotelImage {
    pub thumbnail: Option<String>,
    pub original_image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotelSummary {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price_per_night: Option<String>,
    pub link: Option<String>,
    pub hotel_class: Option<String>,
    pub images: Vec<HotelImage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightLeg {
    pub airline: Option<String>,
    pub flight_number: Option<String>,
    pub departure: String,
    pub arrival: String,
    pub duration_min: Option<i64>,
    pub airplane: Option<String>,
    pub travel_class: Option<String>,
    pub legroom: Option<String>,
    pub airline_logo: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightOption {
    pub rank: usize,
    pub route: String,
    #[serde(rename = "type")]
    pub flight_type: String,
    pub price: String,
    pub total_duration_min: Option<i64>,
    pub layovers: Vec<String>,
    pub legs: Vec<FlightLeg>,
    pub airline_logo: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightRouteSummary {
    pub route: String,
    pub flights_found: usize,
    pub flights: Vec<FlightOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointCoordinates {
    pub departure_place: Option<Coordinates>,
    pub departure_airport: Option<Coordinates>,
    pub arrival_place: Option<Coordinates>,
    pub arrival_airport: Option<Coordinates>,
}

/// Full flight-search response: the provider payload sections are carried
/// through untouched next to the normalized summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightSearchResult {
    pub search_metadata: Value,
    pub search_parameters: Value,
    pub price_insights: Value,
    pub airports: Value,
    pub best_flights: Value,
    pub other_flights: Value,
    pub summary: FlightRouteSummary,
    pub coordinates: EndpointCoordinates,
}

/// First-ranked offer, trimmed for prompt grounding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirstFlight {
    pub departure_airport: String,
    pub arrival_airport: String,
    pub duration_min: Option<i64>,
    pub cheapest_price: String,
    pub airlines: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItineraryDay {
    pub day: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Itinerary {
    pub destination: String,
    pub departure_city: String,
    pub trip_type: String,
    pub budget: String,
    pub dates: String,
    pub hotels: Vec<HotelSummary>,
    pub days: Vec<ItineraryDay>,
    pub location: Value,
    pub flights: Value,
    pub first_flight: Option<FirstFlight>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub reply: String,
    pub variables: Value,
    pub done: bool,
}
