//! SQLite storage for completed workflow runs

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One answered query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub id: String,
    /// Routing decision ("academic" or "coding")
    pub label: String,
    pub query: String,
    pub response: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// SQLite database wrapper (thread-safe via Arc<Mutex>)
#[derive(Clone)]
pub struct HistoryDb {
    conn: Arc<Mutex<Connection>>,
}

impl HistoryDb {
    /// Open (or create) the database at `path` and ensure the schema exists
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create history directory {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path.as_ref()).context("Failed to open SQLite database")?;
        info!("Opened history database at {:?}", path.as_ref());
        Self::init(conn)
    }

    /// In-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS interactions (
                id TEXT PRIMARY KEY,
                label TEXT NOT NULL,
                query TEXT NOT NULL,
                response TEXT NOT NULL,
                model TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_interactions_created ON interactions(created_at)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_interactions_label ON interactions(label)",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
        conn.lock().unwrap_or_else(|poisoned| {
            warn!("Database mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Append a completed run, returning its id
    pub async fn record(&self, label: &str, query: &str, response: &str, model: &str) -> Result<String> {
        let conn = Arc::clone(&self.conn);
        let label = label.to_owned();
        let query = query.to_owned();
        let response = response.to_owned();
        let model = model.to_owned();

        tokio::task::spawn_blocking(move || {
            let id = Uuid::new_v4().to_string();
            let now = Utc::now();
            let conn = Self::lock(&conn);

            conn.execute(
                "INSERT INTO interactions (id, label, query, response, model, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![&id, &label, &query, &response, &model, timestamp(now)],
            )?;

            debug!("Recorded {} interaction {}", label, id);
            Ok(id)
        })
        .await
        .context("spawn_blocking task panicked")?
    }

    /// Most recent interactions, newest first
    pub async fn recent(&self, limit: usize) -> Result<Vec<Interaction>> {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let conn = Self::lock(&conn);
            let mut stmt = conn.prepare(
                "SELECT id, label, query, response, model, created_at
                 FROM interactions
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?1",
            )?;
            let interactions = stmt
                .query_map(params![limit as i64], Self::row_to_interaction)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(interactions)
        })
        .await
        .context("spawn_blocking task panicked")?
    }

    /// Total number of stored interactions
    pub async fn count(&self) -> Result<usize> {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || {
            let conn = Self::lock(&conn);
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM interactions", [], |row| row.get(0))?;
            Ok(n as usize)
        })
        .await
        .context("spawn_blocking task panicked")?
    }

    /// Delete interactions older than `retain_days`
    pub async fn prune_older_than(&self, retain_days: u32) -> Result<usize> {
        let conn = Arc::clone(&self.conn);
        let cutoff = Utc::now() - Duration::days(i64::from(retain_days));

        tokio::task::spawn_blocking(move || {
            let conn = Self::lock(&conn);
            let deleted = conn.execute(
                "DELETE FROM interactions WHERE created_at < ?1",
                params![timestamp(cutoff)],
            )?;
            if deleted > 0 {
                info!("Pruned {} old interactions", deleted);
            }
            Ok(deleted)
        })
        .await
        .context("spawn_blocking task panicked")?
    }

    fn row_to_interaction(row: &rusqlite::Row) -> rusqlite::Result<Interaction> {
        Ok(Interaction {
            id: row.get(0)?,
            label: row.get(1)?,
            query: row.get(2)?,
            response: row.get(3)?,
            model: row.get(4)?,
            created_at: row
                .get::<_, String>(5)?
                .parse()
                .unwrap_or_else(|_| Utc::now()),
        })
    }

    #[cfg(test)]
    fn insert_at(&self, label: &str, created_at: DateTime<Utc>) -> Result<()> {
        let conn = Self::lock(&self.conn);
        conn.execute(
            "INSERT INTO interactions (id, label, query, response, model, created_at)
             VALUES (?1, ?2, 'q', 'r', 'm', ?3)",
            params![Uuid::new_v4().to_string(), label, timestamp(created_at)],
        )?;
        Ok(())
    }
}
