//! Shared data models for all crates.

pub mod connection;
pub mod location;
pub mod query;

// Re-export commonly used types
pub use connection::{ConnectionConfig, DbType};
pub use location::{Coordinates, NamedLocation, NearestLocation};
pub use query::{ColumnInfo, QueryParam, QueryRequest, QueryResult};
