//! Shared building blocks for the ops toolbox crates.
//!
//! Provides the error taxonomy, environment-driven configuration, shared
//! models, the key-value store abstraction and small utility helpers.

pub mod config;
pub mod errors;
pub mod kv_store;
pub mod models;
pub mod utils;
