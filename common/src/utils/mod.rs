//! Utility functions and helpers.

pub mod display;
pub mod figure;
pub mod geo;
pub mod id_generator;
pub mod number_format;
pub mod parallel;
pub mod sql_validator;
pub mod url_encoding;

// Re-export commonly used types
pub use figure::{DiffFlag, Figure};
pub use id_generator::run_id;
pub use sql_validator::SqlValidator;
