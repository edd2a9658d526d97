//! The cache adapter handed to request handlers.
//!
//! Wraps the backend chosen at startup together with an availability flag.
//! Any backend error marks the cache unavailable; from then on every call is
//! a no-op and reads fall through to the durable store until the health
//! probe sees the backend answer again. Callers never observe cache errors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use devtrack_core::models::{CacheHealth, CacheStatus};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::backend::{CacheError, CacheStore};
use super::memory::MemoryStore;
use super::redis_store::RedisStore;
use super::rest_store::RestStore;
use crate::config::CacheBackendConfig;

struct ClientInner {
    backend: Option<Arc<dyn CacheStore>>,
    available: AtomicBool,
}

/// Clone is cheap; clones share the backend and the availability flag.
#[derive(Clone)]
pub struct CacheClient {
    inner: Arc<ClientInner>,
}

impl CacheClient {
    pub fn new(backend: Option<Arc<dyn CacheStore>>) -> Self {
        let available = backend.is_some();
        Self {
            inner: Arc::new(ClientInner {
                backend,
                available: AtomicBool::new(available),
            }),
        }
    }

    /// No backend: every read goes to the durable store.
    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn with_store(store: Arc<dyn CacheStore>) -> Self {
        Self::new(Some(store))
    }

    /// Build the configured backend and probe it once.
    ///
    /// Constructing a backend does no network I/O, so startup never waits on
    /// an unreachable cache. A backend that fails the first probe is kept but
    /// starts unavailable; the health probe brings it back.
    pub async fn from_config(config: &CacheBackendConfig) -> Self {
        let backend: Result<Option<Arc<dyn CacheStore>>, CacheError> = match config {
            CacheBackendConfig::Rest { url, token } => RestStore::new(url.as_str(), token.as_str())
                .map(|store| Some(Arc::new(store) as Arc<dyn CacheStore>)),
            CacheBackendConfig::Redis { url } => Ok(Some(Arc::new(RedisStore::new(url)) as Arc<dyn CacheStore>)),
            CacheBackendConfig::Memory => Ok(Some(Arc::new(MemoryStore::new()) as Arc<dyn CacheStore>)),
            CacheBackendConfig::None => Ok(None),
        };

        let client = match backend {
            Ok(Some(store)) => {
                info!(backend = store.name(), "Cache backend configured");
                Self::with_store(store)
            }
            Ok(None) => {
                info!("No cache backend configured, reads go straight to storage");
                return Self::disabled();
            }
            Err(e) => {
                warn!(error = %e, "Cache backend could not be built, caching disabled");
                return Self::disabled();
            }
        };

        if client.probe().await.is_err() {
            warn!(
                backend = client.backend_name().unwrap_or("unknown"),
                "Cache backend unreachable at startup, serving from storage until it recovers"
            );
        }
        client
    }

    pub fn backend_name(&self) -> Option<&'static str> {
        self.inner.backend.as_ref().map(|b| b.name())
    }

    pub fn is_configured(&self) -> bool {
        self.inner.backend.is_some()
    }

    pub fn is_available(&self) -> bool {
        self.is_configured() && self.inner.available.load(Ordering::SeqCst)
    }

    fn active(&self) -> Option<&Arc<dyn CacheStore>> {
        self.inner
            .backend
            .as_ref()
            .filter(|_| self.inner.available.load(Ordering::SeqCst))
    }

    fn mark_unavailable(&self, operation: &str, error: &CacheError) {
        if self.inner.available.swap(false, Ordering::SeqCst) {
            warn!(operation, error = %error, "Cache backend failed, bypassing cache");
        } else {
            debug!(operation, error = %error, "Cache backend still failing");
        }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let backend = self.active()?;
        match backend.get(key).await {
            Ok(value) => value,
            Err(e) => {
                self.mark_unavailable("get", &e);
                None
            }
        }
    }

    /// Returns whether the value was written.
    pub async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> bool {
        let Some(backend) = self.active() else {
            return false;
        };
        match backend.set_with_ttl(key, value, ttl_secs).await {
            Ok(()) => true,
            Err(e) => {
                self.mark_unavailable("set", &e);
                false
            }
        }
    }

    pub async fn delete(&self, key: &str) -> usize {
        let Some(backend) = self.active() else {
            return 0;
        };
        match backend.delete(key).await {
            Ok(n) => n,
            Err(e) => {
                self.mark_unavailable("delete", &e);
                0
            }
        }
    }

    pub async fn delete_pattern(&self, pattern: &str) -> usize {
        let Some(backend) = self.active() else {
            return 0;
        };
        match backend.delete_pattern(pattern).await {
            Ok(n) => n,
            Err(e) => {
                self.mark_unavailable("delete_pattern", &e);
                0
            }
        }
    }

    /// Run the backend health check and update the availability flag.
    pub async fn probe(&self) -> Result<(), CacheError> {
        let Some(backend) = self.inner.backend.as_ref() else {
            return Ok(());
        };
        match backend.health_check().await {
            Ok(()) => {
                if !self.inner.available.swap(true, Ordering::SeqCst) {
                    info!(backend = backend.name(), "Cache backend recovered");
                }
                Ok(())
            }
            Err(e) => {
                self.mark_unavailable("health_check", &e);
                Err(e)
            }
        }
    }

    /// Periodically probe an unavailable backend so caching resumes once it
    /// recovers. Returns `None` when no backend is configured.
    pub fn spawn_health_probe(&self, every: Duration) -> Option<JoinHandle<()>> {
        if !self.is_configured() {
            return None;
        }
        let client = self.clone();

        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;
                if !client.inner.available.load(Ordering::SeqCst) {
                    let _ = client.probe().await;
                }
            }
        }))
    }

    /// Body of `GET /cache-health`.
    pub async fn health(&self) -> CacheHealth {
        let Some(name) = self.backend_name() else {
            return CacheHealth::not_configured();
        };
        match self.probe().await {
            Ok(()) => CacheHealth {
                status: CacheStatus::Connected,
                test: Some("passed".to_string()),
                backend: Some(name.to_string()),
            },
            Err(_) => CacheHealth {
                status: CacheStatus::Error,
                test: None,
                backend: Some(name.to_string()),
            },
        }
    }
}
