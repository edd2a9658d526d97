//! HTTP surface.
//!
//! Every response except `/health` is a `{ success, data | error }`
//! envelope. Handlers read through the cache and invalidate after writes.

pub mod auth;
pub mod error;
pub mod handlers;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::activity::ActivityAggregator;
use crate::cache::{CacheClient, CacheInvalidator};
use crate::store::Store;

pub use auth::AuthUser;
pub use error::ServerError;

/// Shared state for all handlers. Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub cache: CacheClient,
    pub invalidator: CacheInvalidator,
    pub activity: ActivityAggregator,
}

impl AppState {
    pub fn new(store: Store, cache: CacheClient) -> Self {
        Self {
            invalidator: CacheInvalidator::new(cache.clone()),
            activity: ActivityAggregator::new(store.clone(), cache.clone()),
            store,
            cache,
        }
    }
}

/// Create the router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/cache-health", get(handlers::cache_health))
        // Collections
        .route(
            "/resources/:kind",
            get(handlers::list_resources).post(handlers::create_resource),
        )
        .route("/resources/:kind/batch", post(handlers::batch_update))
        .route("/resources/:kind/:id", delete(handlers::delete_resource))
        // Activity
        .route("/activity", post(handlers::log_activity))
        .route("/activity/heatmap", get(handlers::heatmap))
        .route("/activity/stats", get(handlers::stats))
        // Overview
        .route("/dashboard", get(handlers::get_dashboard))
        .route("/data", delete(handlers::clear_data))
        .with_state(state)
}
