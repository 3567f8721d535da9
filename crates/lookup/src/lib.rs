pub mod airports;
pub mod countries;
pub mod flights;
pub mod geocode;
pub mod hotels;
pub mod llm;
pub mod search;

pub use airports::AirportDirectory;
pub use countries::{CountryLookup, RestCountries};
pub use flights::{resolve_place, search_flights, LookupError, PlaceResolution};
pub use geocode::resolve_coordinates;
pub use hotels::search_hotels;
pub use llm::{resolve_chat_model, ChatModel, OpenAiCompatModel};
pub use search::{FlightQuery, HotelQuery, SearchProvider, SerpApiClient};
