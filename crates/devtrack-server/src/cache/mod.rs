//! Server-side read-through cache.
//!
//! - `CacheStore`: backend contract, implemented by `RestStore` (Upstash
//!   REST protocol over HTTPS), `RedisStore` (persistent connection) and
//!   `MemoryStore` (in-process)
//! - `CacheClient`: the adapter handlers use; absorbs backend failures
//! - `CacheClient::get_cached`: read-through with TTL
//! - `CacheInvalidator`: key and pattern invalidation after writes
//! - `keys`: key builders and TTLs

pub mod backend;
pub mod client;
pub mod pattern;
pub mod invalidator;
pub mod keys;
pub mod memory;
pub mod read_through;
pub mod redis_store;
pub mod rest_store;

pub use backend::{CacheError, CacheStore};
pub use client::CacheClient;
pub use invalidator::CacheInvalidator;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use rest_store::RestStore;
