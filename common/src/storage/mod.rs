pub mod json;
pub mod types;
