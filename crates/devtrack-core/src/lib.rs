//! devtrack-core - shared client library for the devtrack progress tracker.
//!
//! Provides the wire models, the REST client, the local snapshot cache and
//! the write-behind sync machinery (`MutationQueue` + `FlushScheduler`)
//! that the `Tracker` combines into optimistic client state.

pub mod api;
pub mod cache;
pub mod config;
pub mod models;
pub mod sync;
pub mod tracker;

pub use api::{ApiClient, ApiError};
pub use cache::SnapshotCache;
pub use config::Config;
pub use tracker::{CollectionSource, RefreshResult, Remote, Tracker, ValidationError};
