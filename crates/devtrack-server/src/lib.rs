//! devtrack-server - the server half of devtrack.
//!
//! Accepts write-behind batches from clients, serves collection, activity
//! and dashboard reads through a shared cache, and keeps daily activity
//! summaries in SQLite.

pub mod activity;
pub mod cache;
pub mod config;
pub mod dashboard;
pub mod routes;
pub mod store;

pub use config::{CacheBackendConfig, ServerConfig};
pub use routes::{create_router, AppState};
