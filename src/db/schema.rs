//! SQL DDL for the memory database.
//!
//! The shared tables (`schema_meta`, `collections`) are created when the
//! database is opened. Each collection then owns two tables created by
//! [`collection_ddl`]: `<name>` for the entry rows and `<name>_vec` (vec0) for
//! the vectors. All DDL uses `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

use crate::memory::types::DistanceMetric;

/// Shared tables present in every memory database.
const SCHEMA_SQL: &str = r#"
-- One row per collection; fixes its dimension and metric
CREATE TABLE IF NOT EXISTS collections (
    name TEXT PRIMARY KEY,
    dimension INTEGER NOT NULL CHECK(dimension > 0),
    metric TEXT NOT NULL CHECK(metric IN ('cosine','l2')),
    created_at TEXT NOT NULL
);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Tables that collection names may not shadow.
pub const RESERVED_TABLES: &[&str] = &["collections", "schema_meta"];

/// Initialize the shared tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}

/// Name of the vec0 table that holds a collection's vectors.
pub fn vec_table(collection: &str) -> String {
    format!("{collection}_vec")
}

/// DDL for one collection. `name` must already be validated as an identifier.
pub fn collection_ddl(name: &str, dimension: usize, metric: DistanceMetric) -> String {
    let vec_name = vec_table(name);
    format!(
        r#"
CREATE TABLE IF NOT EXISTS "{name}" (
    id TEXT PRIMARY KEY CHECK(length(id) > 0),
    created_at TEXT NOT NULL,
    prompt TEXT NOT NULL,
    response TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    token_count INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS "idx_{name}_created" ON "{name}"(created_at);

CREATE VIRTUAL TABLE IF NOT EXISTS "{vec_name}" USING vec0(
    id TEXT PRIMARY KEY,
    embedding FLOAT[{dimension}] distance_metric={metric}
);
"#,
        metric = metric.as_str(),
    )
}
