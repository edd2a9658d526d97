//! Tracked records (skills, projects, resources) stored as JSON documents.

use chrono::{SecondsFormat, Utc};
use devtrack_core::models::{BatchError, BatchResult, BatchUpdate, ResourceKind};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{Store, StoreError};

/// Updates applied per transaction.
pub const BATCH_CHUNK_SIZE: usize = 500;

/// Fields a batch update may not overwrite
const PROTECTED_FIELDS: &[&str] = &["id", "createdAt"];

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl Store {
    /// All records of one kind for a user, oldest first.
    pub async fn list(&self, kind: ResourceKind, user_id: &str) -> Result<Vec<Value>, StoreError> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT doc FROM resources
                 WHERE kind = ?1 AND user_id = ?2
                 ORDER BY created_at, id",
            )?;
            let docs = stmt
                .query_map(params![kind.as_str(), user_id], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            docs.iter()
                .map(|doc| serde_json::from_str(doc).map_err(StoreError::from))
                .collect()
        })
        .await
    }

    /// Insert a new record. Uses the body's `id` when present, otherwise
    /// generates one. Returns the stored document.
    pub async fn create(
        &self,
        kind: ResourceKind,
        user_id: &str,
        data: Value,
    ) -> Result<Value, StoreError> {
        let Value::Object(mut doc) = data else {
            return Err(StoreError::InvalidDocument(
                "record must be a JSON object".to_string(),
            ));
        };

        let id = match doc.get("id") {
            Some(Value::String(id)) if !id.trim().is_empty() => id.clone(),
            Some(Value::String(_)) | None | Some(Value::Null) => uuid::Uuid::new_v4().to_string(),
            Some(_) => {
                return Err(StoreError::InvalidDocument(
                    "id must be a string".to_string(),
                ))
            }
        };
        let now = now_rfc3339();
        doc.insert("id".to_string(), Value::String(id.clone()));
        doc.insert("createdAt".to_string(), Value::String(now.clone()));
        doc.insert("updatedAt".to_string(), Value::String(now.clone()));
        let doc = Value::Object(doc);

        let user_id = user_id.to_string();
        self.run(move |conn| {
            let body = serde_json::to_string(&doc)?;
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO resources (kind, user_id, id, doc, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![kind.as_str(), user_id, id, body, now],
            )?;
            if inserted == 0 {
                return Err(StoreError::InvalidDocument(format!(
                    "{} '{}' already exists",
                    kind, id
                )));
            }
            Ok(doc)
        })
        .await
    }

    /// Returns false if the record did not exist.
    pub async fn delete(
        &self,
        kind: ResourceKind,
        user_id: &str,
        id: &str,
    ) -> Result<bool, StoreError> {
        let (user_id, id) = (user_id.to_string(), id.to_string());
        self.run(move |conn| {
            let removed = conn.execute(
                "DELETE FROM resources WHERE kind = ?1 AND user_id = ?2 AND id = ?3",
                params![kind.as_str(), user_id, id],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    /// Merge each update's fields into the stored record.
    ///
    /// Updates are applied in chunks of `BATCH_CHUNK_SIZE`, one transaction
    /// per chunk. Unknown ids and malformed updates are reported per id. A
    /// chunk whose transaction fails reports every id in it and does not
    /// stop the remaining chunks.
    pub async fn apply_batch(
        &self,
        kind: ResourceKind,
        user_id: &str,
        updates: Vec<BatchUpdate>,
    ) -> Result<BatchResult, StoreError> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            let mut result = BatchResult::default();

            for (index, chunk) in updates.chunks(BATCH_CHUNK_SIZE).enumerate() {
                match apply_chunk(conn, kind, &user_id, chunk) {
                    Ok((updated, errors)) => {
                        result.updated += updated;
                        result.errors.extend(errors);
                    }
                    Err(e) => {
                        warn!(%kind, chunk = index, size = chunk.len(), error = %e, "Batch chunk failed");
                        result.errors.extend(chunk.iter().map(|u| BatchError {
                            id: u.id.clone(),
                            error: format!("transaction failed: {}", e),
                        }));
                    }
                }
            }

            debug!(%kind, updated = result.updated, errors = result.errors.len(), "Applied batch");
            Ok(result)
        })
        .await
    }
}

fn apply_chunk(
    conn: &mut Connection,
    kind: ResourceKind,
    user_id: &str,
    chunk: &[BatchUpdate],
) -> rusqlite::Result<(usize, Vec<BatchError>)> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut updated = 0;
    let mut errors = Vec::new();
    let now = now_rfc3339();

    {
        let mut select =
            tx.prepare("SELECT doc FROM resources WHERE kind = ?1 AND user_id = ?2 AND id = ?3")?;
        let mut update = tx.prepare(
            "UPDATE resources SET doc = ?4, updated_at = ?5
             WHERE kind = ?1 AND user_id = ?2 AND id = ?3",
        )?;

        for item in chunk {
            let reject = |error: &str| BatchError {
                id: item.id.clone(),
                error: error.to_string(),
            };

            let Value::Object(fields) = &item.data else {
                errors.push(reject("data must be an object"));
                continue;
            };

            let stored: Option<String> = select
                .query_row(params![kind.as_str(), user_id, item.id], |row| row.get(0))
                .optional()?;
            let Some(stored) = stored else {
                errors.push(reject("not found"));
                continue;
            };
            let Ok(Value::Object(mut doc)) = serde_json::from_str::<Value>(&stored) else {
                errors.push(reject("stored record is corrupt"));
                continue;
            };

            merge_fields(&mut doc, fields, &now);
            let body = Value::Object(doc).to_string();
            update.execute(params![kind.as_str(), user_id, item.id, body, now])?;
            updated += 1;
        }
    }

    tx.commit()?;
    Ok((updated, errors))
}

fn merge_fields(doc: &mut Map<String, Value>, fields: &Map<String, Value>, now: &str) {
    for (field, value) in fields {
        if PROTECTED_FIELDS.contains(&field.as_str()) {
            continue;
        }
        doc.insert(field.clone(), value.clone());
    }
    doc.insert("updatedAt".to_string(), Value::String(now.to_string()));
}
