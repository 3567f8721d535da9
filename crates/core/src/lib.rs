pub mod dates;
pub mod json;
pub mod models;

pub use json::{extract_json_object, ExtractError};
pub use models::*;
