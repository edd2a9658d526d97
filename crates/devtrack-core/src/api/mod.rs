//! REST API client module for the devtrack server.
//!
//! This module provides the `ApiClient` for reading collections, creating
//! records, sending write-behind batches and logging activity.
//!
//! Requests carry the caller's identity in the `X-User-Id` header, which an
//! upstream gateway normally sets after authenticating the session, plus an
//! optional bearer token for that gateway.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
