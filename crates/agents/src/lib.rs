pub mod dialogue;
pub mod itinerary;

pub use dialogue::DialogueManager;
pub use itinerary::ItineraryAssembler;
