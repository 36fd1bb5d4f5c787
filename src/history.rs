//! Append-only audit log of REPL turns, kept in its own SQLite file.
//!
//! Independent of the memory store: it records every turn even when
//! remembering fails, and is never read back into prompts.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::error::{Error, Result};

const HISTORY_SQL: &str = "
CREATE TABLE IF NOT EXISTS history (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    ts       TEXT NOT NULL,
    prompt   TEXT NOT NULL,
    response TEXT NOT NULL,
    tags     TEXT NOT NULL DEFAULT '[]',
    tokens   INTEGER NOT NULL DEFAULT 0
);
";

fn history_err(e: impl std::fmt::Display) -> Error {
    Error::History(e.to_string())
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HistoryRecord {
    pub seq: i64,
    pub timestamp: DateTime<Utc>,
    pub prompt: String,
    pub response: String,
    pub tags: Vec<String>,
    pub token_count: u64,
}

/// Shareable across threads; every call takes the connection lock.
pub struct HistoryLog {
    conn: Mutex<Connection>,
}

impl HistoryLog {
    /// Open (creating if needed) the history database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = if path == Path::new(crate::db::IN_MEMORY) {
            Connection::open_in_memory().map_err(history_err)?
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    history_err(format!("failed to create {}: {e}", parent.display()))
                })?;
            }
            let conn = Connection::open(path)
                .map_err(|e| history_err(format!("failed to open {}: {e}", path.display())))?;
            let _mode: String = conn
                .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
                .map_err(history_err)?;
            conn
        };
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(history_err)?;
        conn.execute_batch(HISTORY_SQL).map_err(history_err)?;

        tracing::debug!(path = %path.display(), "history log open");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| history_err(format!("history lock poisoned: {e}")))
    }

    /// Append one turn. Returns its sequence number.
    pub fn append(
        &self,
        prompt: &str,
        response: &str,
        tags: &[String],
        token_count: u64,
    ) -> Result<i64> {
        let tags = serde_json::to_string(tags).map_err(history_err)?;
        let ts = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO history (ts, prompt, response, tags, tokens) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![ts, prompt, response, tags, token_count as i64],
        )
        .map_err(history_err)?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent `limit` records, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<HistoryRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, ts, prompt, response, tags, tokens
                 FROM history ORDER BY id DESC LIMIT ?1",
            )
            .map_err(history_err)?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            })
            .map_err(history_err)?;

        let mut records = Vec::new();
        for row in rows {
            let (seq, ts, prompt, response, tags, tokens) = row.map_err(history_err)?;
            records.push(HistoryRecord {
                seq,
                timestamp: parse_ts(&ts)?,
                prompt,
                response,
                tags: serde_json::from_str(&tags).map_err(history_err)?,
                token_count: tokens.max(0) as u64,
            });
        }
        Ok(records)
    }

    pub fn count(&self) -> Result<u64> {
        let n: i64 = self
            .lock()?
            .query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))
            .map_err(history_err)?;
        Ok(n as u64)
    }

    pub fn close(self) -> Result<()> {
        let conn = self
            .conn
            .into_inner()
            .map_err(|e| history_err(format!("history lock poisoned: {e}")))?;
        conn.close().map_err(|(_, e)| history_err(e))
    }
}

/// Accepts RFC 3339 and the bare epoch seconds older logs were written with.
fn parse_ts(ts: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return Ok(dt.with_timezone(&Utc));
    }
    ts.parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| history_err(format!("unreadable timestamp: {ts}")))
}
