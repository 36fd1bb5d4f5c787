//! Append-only vector-indexed collection of [`MemoryEntry`] records.
//!
//! A collection is a pair of tables in the memory database: `<name>` holds the
//! entry rows and `<name>_vec` (sqlite-vec `vec0`) holds the embeddings. Rows
//! and vectors are always written in one transaction, so readers never see
//! one without the other. Only append and KNN search are supported.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::schema::{self, RESERVED_TABLES};
use crate::error::{Error, Result};
use crate::memory::types::{CollectionInfo, DistanceMetric, MemoryEntry, SearchHit};
use crate::memory::{embedding_from_bytes, embedding_to_bytes};

/// Largest `k` a sqlite-vec `vec0` KNN query accepts.
const KNN_LIMIT: usize = 4096;

/// Check that `name` is usable as a collection (table) name.
pub fn validate_collection_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid_start || !valid_rest {
        return Err(Error::config(format!(
            "invalid collection name `{name}`: use letters, digits and underscores, not starting with a digit"
        )));
    }
    if name.to_ascii_lowercase().starts_with("sqlite_") || RESERVED_TABLES.contains(&name) {
        return Err(Error::config(format!("collection name `{name}` is reserved")));
    }
    Ok(())
}

/// Handle on one collection inside a memory database.
pub struct MemoryStore {
    conn: Mutex<Connection>,
    collection: String,
    dimension: usize,
    metric: DistanceMetric,
}

impl MemoryStore {
    /// Open the database at `path` (`:memory:` allowed). The collection itself is
    /// created lazily by [`MemoryStore::ensure_collection`].
    pub fn open(
        path: impl AsRef<Path>,
        collection: &str,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<Self> {
        let conn = crate::db::open_database(path)
            .map_err(|e| Error::StoreWrite(format!("{e:#}")))?;
        Self::from_connection(conn, collection, dimension, metric)
    }

    /// Wrap an already initialized connection (see [`crate::db::open_database`]).
    pub fn from_connection(
        conn: Connection,
        collection: &str,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<Self> {
        validate_collection_name(collection)?;
        if dimension == 0 {
            return Err(Error::config("embedding dimension must be positive"));
        }
        Ok(Self {
            conn: Mutex::new(conn),
            collection: collection.to_string(),
            dimension,
            metric,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::StoreWrite(format!("db lock poisoned: {e}")))
    }

    /// Create the collection if absent. Idempotent.
    ///
    /// The DDL and the `collections` row commit together and no bootstrap row
    /// is ever inserted, so a concurrent reader sees either no collection or an
    /// empty one. An existing collection must match the configured dimension
    /// and metric.
    pub fn ensure_collection(&self, embedding_model: Option<&str>) -> Result<()> {
        let write_err = |e: rusqlite::Error| Error::StoreWrite(e.to_string());
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(write_err)?;

        let existing: Option<(i64, String, Option<String>)> = tx
            .query_row(
                "SELECT dimension, metric, embedding_model FROM collections WHERE name = ?1",
                params![self.collection],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(write_err)?;

        match existing {
            Some((dimension, metric, stored_model)) => {
                if dimension as usize != self.dimension {
                    return Err(Error::StoreWrite(format!(
                        "collection `{}` has dimension {dimension}, embedder produces {}",
                        self.collection, self.dimension
                    )));
                }
                if metric != self.metric.as_str() {
                    return Err(Error::StoreWrite(format!(
                        "collection `{}` was created with metric {metric}, configured {}",
                        self.collection, self.metric
                    )));
                }
                match (stored_model.as_deref(), embedding_model) {
                    (Some(stored), Some(configured)) if stored != configured => {
                        tracing::warn!(
                            collection = %self.collection,
                            stored = %stored,
                            configured = %configured,
                            "embedding model changed, similarity against older entries may degrade"
                        );
                    }
                    (None, Some(configured)) => {
                        crate::db::migrations::set_embedding_model(&tx, &self.collection, configured)
                            .map_err(write_err)?;
                    }
                    _ => {}
                }
            }
            None => {
                tx.execute_batch(&schema::collection_ddl(
                    &self.collection,
                    self.dimension,
                    self.metric,
                ))
                .map_err(write_err)?;
                tx.execute(
                    "INSERT INTO collections (name, dimension, metric, created_at, embedding_model) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        self.collection,
                        self.dimension as i64,
                        self.metric.as_str(),
                        now_rfc3339(),
                        embedding_model,
                    ],
                )
                .map_err(write_err)?;
                tracing::info!(
                    collection = %self.collection,
                    dimension = self.dimension,
                    metric = %self.metric,
                    "collection created"
                );
            }
        }

        tx.commit().map_err(write_err)?;
        Ok(())
    }

    /// Durably append one entry: row and vector in a single transaction.
    pub fn add(&self, entry: &MemoryEntry) -> Result<()> {
        if entry.id.is_empty() {
            return Err(Error::StoreWrite("entry id must not be empty".into()));
        }
        if entry.embedding.len() != self.dimension {
            return Err(Error::StoreWrite(format!(
                "embedding dimension mismatch: got {}, collection `{}` expects {}",
                entry.embedding.len(),
                self.collection,
                self.dimension
            )));
        }

        let write_err = |e: rusqlite::Error| Error::StoreWrite(e.to_string());
        let tags_json = serde_json::to_string(&entry.tags)
            .map_err(|e| Error::StoreWrite(format!("failed to encode tags: {e}")))?;

        let mut conn = self.lock()?;
        if !collection_exists(&conn, &self.collection).map_err(write_err)? {
            return Err(Error::StoreWrite(format!(
                "collection `{}` does not exist",
                self.collection
            )));
        }

        let tx = conn.transaction().map_err(write_err)?;
        tx.execute(
            &format!(
                "INSERT INTO \"{}\" (id, created_at, prompt, response, tags, token_count) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                self.collection
            ),
            params![
                entry.id,
                entry.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
                entry.prompt,
                entry.response,
                tags_json,
                entry.token_count as i64,
            ],
        )
        .map_err(write_err)?;
        tx.execute(
            &format!(
                "INSERT INTO \"{}\" (id, embedding) VALUES (?1, ?2)",
                schema::vec_table(&self.collection)
            ),
            params![entry.id, embedding_to_bytes(&entry.embedding)],
        )
        .map_err(write_err)?;
        tx.commit().map_err(write_err)?;

        tracing::debug!(id = %entry.id, collection = %self.collection, "entry appended");
        Ok(())
    }

    /// Up to `k` entries nearest to `vector`, ascending by distance.
    ///
    /// Returns fewer than `k` when the collection is smaller, and an empty
    /// vector when it is empty. Any positive `k` is accepted.
    pub fn search(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        self.search_with_knn_limit(vector, k, KNN_LIMIT)
    }

    /// `k` is clamped to the collection size. Requests still above
    /// `knn_limit` fall back to a full scan ordered by the distance function.
    fn search_with_knn_limit(
        &self,
        vector: &[f32],
        k: usize,
        knn_limit: usize,
    ) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Err(Error::StoreQuery("k must be a positive integer".into()));
        }
        if vector.len() != self.dimension {
            return Err(Error::StoreQuery(format!(
                "query dimension mismatch: got {}, collection `{}` expects {}",
                vector.len(),
                self.collection,
                self.dimension
            )));
        }

        let query_err = |e: rusqlite::Error| Error::StoreQuery(e.to_string());
        let conn = self.lock()?;
        if !collection_exists(&conn, &self.collection).map_err(query_err)? {
            return Err(Error::StoreQuery(format!(
                "collection `{}` does not exist",
                self.collection
            )));
        }

        let count = count_entries(&conn, &self.collection).map_err(query_err)?;
        let limit = k.min(usize::try_from(count).unwrap_or(usize::MAX));
        if limit == 0 {
            return Ok(Vec::new());
        }

        let vec = schema::vec_table(&self.collection);
        let name = &self.collection;
        let (strategy, sql) = if limit <= knn_limit {
            (
                "knn",
                format!(
                    "WITH knn AS (
                         SELECT id, embedding, distance FROM \"{vec}\"
                         WHERE embedding MATCH ?1 AND k = ?2
                     )
                     SELECT m.id, m.created_at, m.prompt, m.response, m.tags, m.token_count,
                            knn.embedding, knn.distance
                     FROM knn JOIN \"{name}\" m ON m.id = knn.id
                     ORDER BY knn.distance"
                ),
            )
        } else {
            (
                "scan",
                format!(
                    "SELECT m.id, m.created_at, m.prompt, m.response, m.tags, m.token_count,
                            v.embedding, {distance}(v.embedding, ?1) AS distance
                     FROM \"{vec}\" v JOIN \"{name}\" m ON m.id = v.id
                     ORDER BY distance
                     LIMIT ?2",
                    distance = distance_function(self.metric),
                ),
            )
        };

        let mut stmt = conn.prepare(&sql).map_err(query_err)?;
        let hits = stmt
            .query_map(params![embedding_to_bytes(vector), limit as i64], |row| {
                let blob: Vec<u8> = row.get(6)?;
                Ok(SearchHit {
                    entry: MemoryEntry {
                        id: row.get(0)?,
                        timestamp: parse_timestamp(1, &row.get::<_, String>(1)?)?,
                        prompt: row.get(2)?,
                        response: row.get(3)?,
                        tags: parse_tags(4, &row.get::<_, String>(4)?)?,
                        token_count: row.get::<_, i64>(5)? as u64,
                        embedding: embedding_from_bytes(&blob),
                    },
                    distance: row.get(7)?,
                })
            })
            .map_err(query_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(query_err)?;

        tracing::debug!(
            collection = %self.collection,
            k,
            strategy,
            returned = hits.len(),
            "search"
        );
        Ok(hits)
    }

    /// Number of entries in the collection; 0 if it does not exist yet.
    pub fn len(&self) -> Result<u64> {
        let query_err = |e: rusqlite::Error| Error::StoreQuery(e.to_string());
        let conn = self.lock()?;
        if !collection_exists(&conn, &self.collection).map_err(query_err)? {
            return Ok(0);
        }
        count_entries(&conn, &self.collection).map_err(query_err)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Metadata for this store's collection, or `None` if it was never created.
    pub fn info(&self) -> Result<Option<CollectionInfo>> {
        Ok(self
            .list_collections()?
            .into_iter()
            .find(|c| c.name == self.collection))
    }

    /// Every collection recorded in this database.
    pub fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let conn = self.lock()?;
        list_collections(&conn)
    }

    /// Close the underlying connection, surfacing any error from SQLite.
    pub fn close(self) -> Result<()> {
        let conn = self
            .conn
            .into_inner()
            .map_err(|e| Error::StoreWrite(format!("db lock poisoned: {e}")))?;
        conn.close()
            .map_err(|(_, e)| Error::StoreWrite(format!("failed to close database: {e}")))
    }
}

/// Every collection recorded in the database behind `conn`.
///
/// Needs no embedder, so reporting commands can use it before a model is
/// available.
pub fn list_collections(conn: &Connection) -> Result<Vec<CollectionInfo>> {
    let query_err = |e: rusqlite::Error| Error::StoreQuery(e.to_string());
    let mut stmt = conn
        .prepare(
            "SELECT name, dimension, metric, embedding_model, created_at \
             FROM collections ORDER BY name",
        )
        .map_err(query_err)?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)? as usize,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })
        .map_err(query_err)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(query_err)?;

    rows.into_iter()
        .map(|(name, dimension, metric, embedding_model, created_at)| {
            let entry_count = count_entries(conn, &name).map_err(query_err)?;
            let metric = metric.parse::<DistanceMetric>().map_err(Error::StoreQuery)?;
            Ok(CollectionInfo {
                name,
                dimension,
                metric,
                embedding_model,
                created_at,
                entry_count,
            })
        })
        .collect()
}

/// sqlite-vec scalar function matching a vec0 `distance_metric`.
fn distance_function(metric: DistanceMetric) -> &'static str {
    match metric {
        DistanceMetric::Cosine => "vec_distance_cosine",
        DistanceMetric::L2 => "vec_distance_l2",
    }
}

fn collection_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM collections WHERE name = ?1",
        params![name],
        |row| row.get(0),
    )
}

fn count_entries(conn: &Connection, name: &str) -> rusqlite::Result<u64> {
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM \"{name}\""), [], |row| {
        row.get(0)
    })?;
    Ok(count as u64)
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_tags(idx: usize, value: &str) -> rusqlite::Result<BTreeSet<String>> {
    serde_json::from_str(value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
