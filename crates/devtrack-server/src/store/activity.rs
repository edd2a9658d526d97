//! Daily activity summaries, one row per user per day.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use devtrack_core::models::{ActivitySummary, LastActivity};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use super::{Store, StoreError};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// One event to fold into a day's summary
#[derive(Debug, Clone)]
pub struct ActivityEvent {
    pub user_id: String,
    pub date: NaiveDate,
    pub activity_type: String,
    pub description: String,
    pub at: DateTime<Utc>,
}

impl Store {
    /// Increment the `(user, date)` summary inside a `BEGIN IMMEDIATE`
    /// transaction and return it as committed.
    ///
    /// Concurrent writers queue on SQLite's write lock; the busy timeout
    /// covers the wait.
    pub async fn record_activity(&self, event: ActivityEvent) -> Result<ActivitySummary, StoreError> {
        self.run(move |conn| increment_summary(conn, &event)).await
    }

    /// Summaries with `from <= date <= to`, oldest first.
    pub async fn summaries_between(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ActivitySummary>, StoreError> {
        self.query_summaries(user_id, Some((from, to))).await
    }

    pub async fn all_summaries(&self, user_id: &str) -> Result<Vec<ActivitySummary>, StoreError> {
        self.query_summaries(user_id, None).await
    }

    async fn query_summaries(
        &self,
        user_id: &str,
        range: Option<(NaiveDate, NaiveDate)>,
    ) -> Result<Vec<ActivitySummary>, StoreError> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            let rows = match range {
                Some((from, to)) => {
                    let mut stmt = conn.prepare(
                        "SELECT date, count, types, last_activity FROM activity_summaries
                         WHERE user_id = ?1 AND date >= ?2 AND date <= ?3
                         ORDER BY date",
                    )?;
                    let rows = stmt
                        .query_map(
                            params![
                                user_id,
                                from.format(DATE_FORMAT).to_string(),
                                to.format(DATE_FORMAT).to_string()
                            ],
                            read_row,
                        )?
                        .collect::<Result<Vec<_>, _>>()?;
                    rows
                }
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT date, count, types, last_activity FROM activity_summaries
                         WHERE user_id = ?1
                         ORDER BY date",
                    )?;
                    let rows = stmt
                        .query_map(params![user_id], read_row)?
                        .collect::<Result<Vec<_>, _>>()?;
                    rows
                }
            };
            rows.into_iter().map(decode).collect()
        })
        .await
    }
}

type RawSummary = (String, u32, String, Option<String>);

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawSummary> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn decode((date, count, types, last): RawSummary) -> Result<ActivitySummary, StoreError> {
    let date = NaiveDate::parse_from_str(&date, DATE_FORMAT)
        .map_err(|e| StoreError::InvalidDocument(format!("bad summary date '{}': {}", date, e)))?;
    let types: BTreeMap<String, u32> = serde_json::from_str(&types)?;
    let last_activity: Option<LastActivity> = match last {
        Some(raw) => Some(serde_json::from_str(&raw)?),
        None => None,
    };
    Ok(ActivitySummary {
        date,
        count,
        types,
        last_activity,
    })
}

fn increment_summary(conn: &mut Connection, event: &ActivityEvent) -> Result<ActivitySummary, StoreError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let date = event.date.format(DATE_FORMAT).to_string();

    let existing = tx
        .query_row(
            "SELECT date, count, types, last_activity FROM activity_summaries
             WHERE user_id = ?1 AND date = ?2",
            params![event.user_id, date],
            read_row,
        )
        .optional()?;

    let mut summary = match existing {
        Some(raw) => decode(raw)?,
        None => ActivitySummary::empty(event.date),
    };
    summary.record(&event.activity_type, &event.description, event.at);

    tx.execute(
        "INSERT INTO activity_summaries (user_id, date, count, types, last_activity)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(user_id, date) DO UPDATE SET
             count = excluded.count,
             types = excluded.types,
             last_activity = excluded.last_activity",
        params![
            event.user_id,
            date,
            summary.count,
            serde_json::to_string(&summary.types)?,
            summary
                .last_activity
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        ],
    )?;
    tx.commit()?;

    Ok(summary)
}
