//! Local caching module for offline-first reads.
//!
//! This module provides the `SnapshotCache` for storing the last known copy
//! of each collection on the client. Snapshots are JSON envelopes of the form
//! `{ "data": ..., "timestamp": <epoch ms> }` and are considered stale after
//! five minutes. Stale snapshots are still served; callers refresh them in
//! the background.

pub mod snapshot;

pub use snapshot::{Loaded, Snapshot, SnapshotCache};
