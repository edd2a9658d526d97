//! Canonical SQL schema for the durable store.

/// Migration v1: tracked records and daily activity summaries.
pub const MIGRATION_V1_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS resources (
    kind TEXT NOT NULL,
    user_id TEXT NOT NULL,
    id TEXT NOT NULL,
    doc TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (kind, user_id, id)
);

CREATE TABLE IF NOT EXISTS activity_summaries (
    user_id TEXT NOT NULL,
    date TEXT NOT NULL,
    count INTEGER NOT NULL CHECK (count >= 0),
    types TEXT NOT NULL,
    last_activity TEXT,
    PRIMARY KEY (user_id, date)
);
"#;

/// Migration v2: list ordering and per-user bulk clear.
pub const MIGRATION_V2_SQL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_resources_user_kind_created
    ON resources(user_id, kind, created_at);
"#;
