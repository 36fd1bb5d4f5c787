//! Forward-only schema migration framework.
//!
//! Tracks the schema version in `schema_meta` and runs sequential migrations
//! to bring the database up to [`CURRENT_SCHEMA_VERSION`].

use rusqlite::Connection;

/// The schema version that the current binary expects.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Get the current schema version from the database.
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'schema_version'",
        [],
        |row| {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().unwrap_or(0))
        },
    )
}

/// Update the stored schema version.
fn update_schema_version(conn: &Connection, version: u32) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE schema_meta SET value = ?1 WHERE key = 'schema_version'",
        [version.to_string()],
    )?;
    Ok(())
}

/// Record the embedding model used to fill a collection.
pub fn set_embedding_model(conn: &Connection, collection: &str, model: &str) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE collections SET embedding_model = ?1 WHERE name = ?2",
        [model, collection],
    )?;
    Ok(())
}

/// Run any pending forward-only migrations. Each migration runs in a transaction.
pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    let mut version = get_schema_version(conn)?;
    tracing::debug!(schema_version = version, target = CURRENT_SCHEMA_VERSION, "checking migrations");

    while version < CURRENT_SCHEMA_VERSION {
        let next = version + 1;
        tracing::info!(from = version, to = next, "running migration");

        let tx = conn.unchecked_transaction()?;
        match next {
            2 => migrate_v1_to_v2(&tx)?,
            _ => {
                tracing::error!(version = next, "unknown migration target");
                break;
            }
        }
        update_schema_version(&tx, next)?;
        tx.commit()?;
        version = next;
    }

    Ok(())
}

/// Migration v1 → v2: track which embedding model filled each collection.
fn migrate_v1_to_v2(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute("ALTER TABLE collections ADD COLUMN embedding_model TEXT", [])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::OptionalExtension;

    fn test_db() -> Connection {
        crate::db::load_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        crate::db::schema::init_schema(&conn).unwrap();
        conn
    }

    fn stored_model(conn: &Connection, name: &str) -> Option<String> {
        conn.query_row(
            "SELECT embedding_model FROM collections WHERE name = ?1",
            [name],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()
        .unwrap()
        .flatten()
    }

    fn insert_collection(conn: &Connection, name: &str) {
        conn.execute(
            "INSERT INTO collections (name, dimension, metric, created_at) VALUES (?1, 4, 'cosine', '2026-01-01T00:00:00Z')",
            [name],
        )
        .unwrap();
    }

    #[test]
    fn get_schema_version_returns_1_on_fresh_db() {
        let conn = test_db();
        assert_eq!(get_schema_version(&conn).unwrap(), 1);
    }

    #[test]
    fn run_migrations_upgrades_to_current() {
        let conn = test_db();
        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn migrations_are_idempotent() {
        let conn = test_db();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap(); // second call should not error
        assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn migration_keeps_existing_collections() {
        let conn = test_db();
        insert_collection(&conn, "interactions");

        run_migrations(&conn).unwrap();

        assert!(stored_model(&conn, "interactions").is_none());
    }

    #[test]
    fn set_embedding_model_records_model() {
        let conn = test_db();
        run_migrations(&conn).unwrap();
        insert_collection(&conn, "interactions");

        set_embedding_model(&conn, "interactions", "all-MiniLM-L6-v2").unwrap();
        assert_eq!(
            stored_model(&conn, "interactions"),
            Some("all-MiniLM-L6-v2".to_string())
        );
        assert!(stored_model(&conn, "missing").is_none());
    }
}
