//! SQLite durable storage.
//!
//! Every operation opens its own connection on a blocking thread, so
//! concurrent requests contend only on SQLite's own locks:
//! - `journal_mode = WAL` so readers never block the writer
//! - `busy_timeout = 5s` so a writer waiting on `BEGIN IMMEDIATE` is retried
//!   by SQLite instead of failing with `SQLITE_BUSY`

pub mod activity;
pub mod migrations;
pub mod resources;
pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use devtrack_core::models::ResourceKind;
use rusqlite::Connection;
use thiserror::Error;
use tracing::info;

/// Busy timeout for every connection.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: ResourceKind, id: String },

    #[error("{0}")]
    InvalidDocument(String),

    #[error("stored document is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("could not prepare database directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Handle to the database file. Clone is cheap.
#[derive(Debug, Clone)]
pub struct Store {
    path: Arc<PathBuf>,
}

impl Store {
    /// Create the database if needed and bring its schema up to date.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut conn = Connection::open(path)?;
        configure_connection(&conn)?;
        let version = migrations::migrate(&mut conn)?;
        info!(path = %path.display(), schema_version = version, "Opened database");

        Ok(Self {
            path: Arc::new(path.to_path_buf()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(self.path.as_path())?;
        configure_connection(&conn)?;
        Ok(conn)
    }

    /// Run `f` on a fresh connection on the blocking pool.
    pub(crate) async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = store.connect()?;
            f(&mut conn)
        })
        .await?
    }

    /// Delete everything a user owns. Returns the number of rows removed.
    pub async fn clear_user(&self, user_id: &str) -> Result<usize, StoreError> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let resources = tx.execute("DELETE FROM resources WHERE user_id = ?1", [&user_id])?;
            let summaries = tx.execute(
                "DELETE FROM activity_summaries WHERE user_id = ?1",
                [&user_id],
            )?;
            tx.commit()?;
            Ok(resources + summaries)
        })
        .await
    }
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Store;
    use tempfile::TempDir;

    pub fn temp_store() -> (TempDir, Store) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let store = Store::open(&dir.path().join("devtrack.sqlite3")).expect("open store");
        (dir, store)
    }
}
