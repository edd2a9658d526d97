use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

/// Snapshots older than this are reported stale (5 minutes).
pub const SNAPSHOT_STALE_MS: i64 = 300_000;

/// On-disk envelope for one cached value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot<T> {
    pub data: T,
    /// Milliseconds since the Unix epoch at save time
    pub timestamp: i64,
}

impl<T> Snapshot<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn age_ms(&self) -> i64 {
        Utc::now().timestamp_millis() - self.timestamp
    }

    pub fn age_minutes(&self) -> i64 {
        self.age_ms() / 60_000
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew (negative ages)
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            let remaining_mins = minutes % 60;
            if remaining_mins >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            let remaining_hours = (minutes % 1440) / 60;
            if remaining_hours >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }

    pub fn is_stale_after(&self, ttl_ms: i64) -> bool {
        self.age_ms() > ttl_ms
    }
}

/// Result of a snapshot load. Stale data is still returned.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
    pub data: T,
    pub is_stale: bool,
    pub timestamp: i64,
}

pub struct SnapshotCache {
    cache_dir: PathBuf,
    ttl_ms: i64,
}

impl SnapshotCache {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create cache dir {}", cache_dir.display()))?;
        Ok(Self {
            cache_dir,
            ttl_ms: SNAPSHOT_STALE_MS,
        })
    }

    pub fn with_ttl_ms(mut self, ttl_ms: i64) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    /// Keys look like `skills:user42`; keep file names portable.
    fn cache_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", file_stem(key)))
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Option<Snapshot<T>> {
        let path = self.cache_path(key);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                debug!(cache = key, error = %e, "Failed to read snapshot, treating as miss");
                return None;
            }
        };

        match serde_json::from_str(&contents) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                debug!(cache = key, error = %e, "Corrupt snapshot, treating as miss");
                None
            }
        }
    }

    /// Load a snapshot. Missing and malformed files both read as `None`.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<Loaded<T>> {
        self.read(key).map(|snapshot: Snapshot<T>| Loaded {
            is_stale: snapshot.is_stale_after(self.ttl_ms),
            timestamp: snapshot.timestamp,
            data: snapshot.data,
        })
    }

    /// Overwrite the snapshot for `key` unconditionally.
    pub fn save<T: Serialize>(&self, key: &str, data: &T) -> Result<()> {
        let snapshot = Snapshot::new(data);
        let path = self.cache_path(key);
        let contents = serde_json::to_string(&snapshot)?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write snapshot: {}", key))?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.cache_path(key)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    // ===== Cache Age Information =====

    /// Human readable age of a snapshot, e.g. "5m ago"
    pub fn age(&self, key: &str) -> Option<String> {
        self.read::<serde_json::Value>(key).map(|s| s.age_display())
    }

    /// True if any of `keys` is missing or stale
    pub fn any_stale(&self, keys: &[String]) -> bool {
        keys.iter().any(|key| match self.read::<serde_json::Value>(key) {
            Some(snapshot) => snapshot.is_stale_after(self.ttl_ms),
            None => true,
        })
    }
}

/// File name for a cache key. ASCII letters, digits and `-` pass through;
/// every other byte becomes `_XX` hex, so distinct keys never share a file.
fn file_stem(key: &str) -> String {
    let mut stem = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            stem.push(byte as char);
        } else {
            stem.push_str(&format!("_{:02x}", byte));
        }
    }
    stem
}

// ============================================================================
// Tests
// ============================================================================
